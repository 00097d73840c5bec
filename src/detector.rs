use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::DataSource;

// ---------------------------------------------------------------------------
// DetectorId – one measurement channel
// ---------------------------------------------------------------------------

/// Identity of one detector channel: a gold activation foil channel or a
/// Bonner sphere of the given diameter (inches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectorId {
    Foil(u8),
    Sphere(u8),
}

impl DetectorId {
    /// Name of this detector's response function in the catalog.
    pub fn catalog_key(&self) -> String {
        match self {
            DetectorId::Foil(channel) => format!("ft_au{channel}"),
            DetectorId::Sphere(size) => format!("bs{size}-1"),
        }
    }

    pub fn is_foil(&self) -> bool {
        matches!(self, DetectorId::Foil(_))
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.catalog_key())
    }
}

// ---------------------------------------------------------------------------
// DetectorLayout – the full, fixed detector ordering
// ---------------------------------------------------------------------------

/// The complete set of detectors, always enumerated foil channels first
/// and sphere sizes second. Both assemblers derive their row order from
/// a [`DetectorSet`] selected out of this layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorLayout {
    /// Number of foil channels (`ft_au0` .. `ft_au{n-1}`).
    pub foil_channels: u8,
    /// Sphere diameters in inches, in measurement order.
    pub sphere_sizes: Vec<u8>,
}

impl Default for DetectorLayout {
    fn default() -> Self {
        Self {
            foil_channels: 9,
            sphere_sizes: vec![0, 2, 3, 5, 8, 10, 12],
        }
    }
}

impl DetectorLayout {
    pub fn foils(&self) -> impl Iterator<Item = DetectorId> + '_ {
        (0..self.foil_channels).map(DetectorId::Foil)
    }

    pub fn spheres(&self) -> impl Iterator<Item = DetectorId> + '_ {
        self.sphere_sizes.iter().copied().map(DetectorId::Sphere)
    }

    /// Every detector, foil-then-sphere.
    pub fn all(&self) -> Vec<DetectorId> {
        self.foils().chain(self.spheres()).collect()
    }

    pub fn len(&self) -> usize {
        self.foil_channels as usize + self.sphere_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select the detectors used by a data source.
    pub fn select(&self, source: DataSource) -> DetectorSet {
        let n_foil = self.foil_channels as usize;
        let range = match source {
            DataSource::Foil => 0..n_foil,
            DataSource::Sphere => n_foil..self.len(),
            DataSource::Combined => 0..self.len(),
        };
        let ids = self.all()[range.clone()].to_vec();
        DetectorSet { source, ids, range }
    }
}

// ---------------------------------------------------------------------------
// DetectorSet – the ordering shared by one run
// ---------------------------------------------------------------------------

/// The ordered detectors of one run. Built once and handed to both the
/// response and the measurement assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSet {
    source: DataSource,
    ids: Vec<DetectorId>,
    range: Range<usize>,
}

impl DetectorSet {
    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn ids(&self) -> &[DetectorId] {
        &self.ids
    }

    /// Position of this selection inside the full foil-then-sphere layout.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn catalog_keys(&self) -> Vec<String> {
        self.ids.iter().map(DetectorId::catalog_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_match_response_names() {
        assert_eq!(DetectorId::Foil(0).catalog_key(), "ft_au0");
        assert_eq!(DetectorId::Foil(8).catalog_key(), "ft_au8");
        assert_eq!(DetectorId::Sphere(0).catalog_key(), "bs0-1");
        assert_eq!(DetectorId::Sphere(12).to_string(), "bs12-1");
    }

    #[test]
    fn default_layout_has_sixteen_detectors_foil_first() {
        let layout = DetectorLayout::default();
        let all = layout.all();
        assert_eq!(all.len(), 16);
        assert!(all[..9].iter().all(DetectorId::is_foil));
        assert!(all[9..].iter().all(|d| !d.is_foil()));
        assert_eq!(all[9], DetectorId::Sphere(0));
        assert_eq!(all[15], DetectorId::Sphere(12));
    }

    #[test]
    fn selection_ranges_partition_the_layout() {
        let layout = DetectorLayout::default();
        let foil = layout.select(DataSource::Foil);
        let sphere = layout.select(DataSource::Sphere);
        let combined = layout.select(DataSource::Combined);

        assert_eq!(foil.source(), DataSource::Foil);
        assert_eq!(combined.source(), DataSource::Combined);
        assert_eq!(foil.range(), 0..9);
        assert_eq!(sphere.range(), 9..16);
        assert_eq!(combined.range(), 0..16);

        let joined: Vec<DetectorId> = foil.ids().iter().chain(sphere.ids()).copied().collect();
        assert_eq!(joined, combined.ids());
    }
}
