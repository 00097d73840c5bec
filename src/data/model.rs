use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::detector::DetectorId;
use crate::error::{Result, UnfoldError};

// ---------------------------------------------------------------------------
// RawSpectrum – one pulse-height spectrum from a sphere detector
// ---------------------------------------------------------------------------

/// Channel counts plus the acquisition live time (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpectrum {
    pub counts: Vec<u64>,
    pub live_time: f64,
}

impl RawSpectrum {
    pub fn new(counts: Vec<u64>, live_time: f64) -> Result<Self> {
        if !live_time.is_finite() || live_time <= 0.0 {
            return Err(UnfoldError::InputValidation(format!(
                "live time must be positive, got {live_time}"
            )));
        }
        Ok(Self { counts, live_time })
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ResponseFunction – a catalog entry
// ---------------------------------------------------------------------------

/// Per-bin sensitivity of one detector plus the energy bin edges
/// (`edges.len() == values.len() + 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunction {
    pub values: Vec<f64>,
    pub edges: Vec<f64>,
}

impl ResponseFunction {
    pub fn new(values: Vec<f64>, edges: Vec<f64>) -> Self {
        Self { values, edges }
    }

    pub fn n_bins(&self) -> usize {
        self.values.len()
    }

    /// Check the binning and sign invariants of this entry.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.edges.len() != self.values.len() + 1 {
            return Err(UnfoldError::Configuration(format!(
                "response '{name}' has {} values but {} bin edges",
                self.values.len(),
                self.edges.len()
            )));
        }
        validate_edges(&self.edges).map_err(|reason| {
            UnfoldError::Configuration(format!("response '{name}': {reason}"))
        })?;
        if let Some(v) = self.values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(UnfoldError::Configuration(format!(
                "response '{name}' has a negative or non-finite value {v}"
            )));
        }
        Ok(())
    }
}

/// Bin edges must be finite and strictly increasing.
pub fn validate_edges(edges: &[f64]) -> std::result::Result<(), String> {
    if edges.len() < 2 {
        return Err(format!("need at least two bin edges, got {}", edges.len()));
    }
    if let Some(e) = edges.iter().find(|e| !e.is_finite()) {
        return Err(format!("non-finite bin edge {e}"));
    }
    if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
        return Err(format!(
            "bin edges not strictly increasing at index {}: {} -> {}",
            i + 1,
            edges[i],
            edges[i + 1]
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ResponseMatrix – rows = detectors, columns = energy bins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMatrix {
    /// Row identities, in row order.
    pub detectors: Vec<DetectorId>,
    pub matrix: Array2<f64>,
    /// Shared energy bin edges, `matrix.ncols() + 1` long.
    pub edges: Vec<f64>,
}

impl ResponseMatrix {
    pub fn n_detectors(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_bins(&self) -> usize {
        self.matrix.ncols()
    }

    /// Fold a spectrum through the matrix: the modeled detector responses.
    pub fn fold(&self, spectrum: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if spectrum.len() != self.n_bins() {
            return Err(UnfoldError::shape(
                "folding",
                format!("{} bins", self.n_bins()),
                format!("{} bins", spectrum.len()),
            ));
        }
        Ok(self.matrix.dot(&spectrum))
    }
}

// ---------------------------------------------------------------------------
// DefaultSpectrum – the prior guess
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSpectrum {
    pub values: Array1<f64>,
}

impl DefaultSpectrum {
    /// Wrap a prior; every entry must be finite and non-negative.
    pub fn new(values: Array1<f64>) -> Result<Self> {
        if let Some(v) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(UnfoldError::Configuration(format!(
                "default spectrum has a negative or non-finite entry {v}"
            )));
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MeasurementVector – normalized detector readings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementVector {
    /// Entry identities, in entry order.
    pub detectors: Vec<DetectorId>,
    pub values: Array1<f64>,
}

impl MeasurementVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpectrumSolution – the unfolded result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSolution {
    pub edges: Vec<f64>,
    pub values: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn raw_spectrum_rejects_non_positive_live_time() {
        assert!(RawSpectrum::new(vec![1, 2, 3], 0.0).is_err());
        assert!(RawSpectrum::new(vec![1, 2, 3], f64::NAN).is_err());
        assert_eq!(RawSpectrum::new(vec![1, 2, 3], 10.0).unwrap().len(), 3);
    }

    #[test]
    fn response_function_checks_edge_count_and_order() {
        let ok = ResponseFunction::new(vec![1.0, 2.0], vec![0.0, 1.0, 2.0]);
        assert!(ok.validate("ok").is_ok());

        let short = ResponseFunction::new(vec![1.0, 2.0], vec![0.0, 1.0]);
        assert!(short.validate("short").is_err());

        let unordered = ResponseFunction::new(vec![1.0, 2.0], vec![0.0, 2.0, 2.0]);
        let msg = unordered.validate("unordered").unwrap_err().to_string();
        assert!(msg.contains("strictly increasing"));

        let negative = ResponseFunction::new(vec![1.0, -2.0], vec![0.0, 1.0, 2.0]);
        assert!(negative.validate("negative").is_err());
    }

    #[test]
    fn fold_is_matrix_vector_product() {
        let r = ResponseMatrix {
            detectors: vec![DetectorId::Foil(0), DetectorId::Foil(1)],
            matrix: array![[1.0, 2.0, 0.0], [0.0, 1.0, 3.0]],
            edges: vec![0.0, 1.0, 2.0, 3.0],
        };
        let folded = r.fold(array![1.0, 1.0, 2.0].view()).unwrap();
        assert_eq!(folded, array![3.0, 7.0]);
        assert!(r.fold(array![1.0, 1.0].view()).is_err());
    }

    #[test]
    fn default_spectrum_must_be_non_negative() {
        assert!(DefaultSpectrum::new(array![0.0, 1.0]).is_ok());
        assert!(DefaultSpectrum::new(array![1.0, -1e-9]).is_err());
    }
}
