use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::RawSpectrum;
use crate::error::{ReadingFault, Result};
use crate::fit::{FitObserver, FitReport, SpectrumFitter};

// ---------------------------------------------------------------------------
// Foil experiment
// ---------------------------------------------------------------------------

/// Processed activation-foil results.
pub trait FoilExperiment {
    /// Per-atom saturation activities in foil channel order, as measured
    /// at the foil experiment's nominal power.
    fn saturation_activities(&self) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedFoilData {
    pub activities: Vec<f64>,
}

impl FoilExperiment for TabulatedFoilData {
    fn saturation_activities(&self) -> Result<Vec<f64>> {
        Ok(self.activities.clone())
    }
}

// ---------------------------------------------------------------------------
// Sphere experiment
// ---------------------------------------------------------------------------

pub type SphereReading = std::result::Result<FitReport, ReadingFault>;

/// Bonner-sphere measurements turned into calibrated rates by fitting.
pub trait SphereExperiment {
    /// One reading per requested size, in the order given.
    fn calibrated_rates(
        &self,
        sizes: &[u8],
        fitter: &SpectrumFitter,
        observer: &mut dyn FitObserver,
    ) -> Vec<SphereReading>;
}

/// Raw spectra keyed by sphere diameter (inches).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SphereSpectra {
    spectra: BTreeMap<u8, RawSpectrum>,
}

impl SphereSpectra {
    pub fn new(spectra: BTreeMap<u8, RawSpectrum>) -> Self {
        Self { spectra }
    }

    pub fn insert(&mut self, size: u8, spectrum: RawSpectrum) {
        self.spectra.insert(size, spectrum);
    }

    pub fn get(&self, size: u8) -> Option<&RawSpectrum> {
        self.spectra.get(&size)
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &RawSpectrum)> {
        self.spectra.iter().map(|(size, s)| (*size, s))
    }
}

impl SphereExperiment for SphereSpectra {
    fn calibrated_rates(
        &self,
        sizes: &[u8],
        fitter: &SpectrumFitter,
        observer: &mut dyn FitObserver,
    ) -> Vec<SphereReading> {
        sizes
            .iter()
            .map(|&size| {
                let detector = format!("bs{size}-1");
                let spectrum = self.spectra.get(&size).ok_or(ReadingFault::Missing)?;
                let report = fitter.fit(&detector, spectrum, observer)?;
                Ok(report)
            })
            .collect()
    }
}
