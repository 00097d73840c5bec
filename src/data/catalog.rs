use std::collections::{BTreeMap, BTreeSet};

use super::model::ResponseFunction;

// ---------------------------------------------------------------------------
// ResponseCatalog – name → response function
// ---------------------------------------------------------------------------

/// Read-only source of tabulated response functions.
pub trait ResponseCatalog {
    fn lookup(&self, name: &str) -> Option<&ResponseFunction>;

    fn keys(&self) -> BTreeSet<String>;
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryCatalog {
    entries: BTreeMap<String, ResponseFunction>,
}

impl InMemoryCatalog {
    pub fn new(entries: BTreeMap<String, ResponseFunction>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, name: impl Into<String>, response: ResponseFunction) {
        self.entries.insert(name.into(), response);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, ResponseFunction> {
        &self.entries
    }
}

impl ResponseCatalog for InMemoryCatalog {
    fn lookup(&self, name: &str) -> Option<&ResponseFunction> {
        self.entries.get(name)
    }

    fn keys(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }
}

impl FromIterator<(String, ResponseFunction)> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = (String, ResponseFunction)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
