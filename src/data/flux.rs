use std::collections::BTreeMap;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UnfoldError};

// ---------------------------------------------------------------------------
// FluxLookup – simulated flux tensors
// ---------------------------------------------------------------------------

/// Source of simulated flux, indexed
/// `[particle, angular group, energy group, quantity]`.
pub trait FluxLookup {
    fn flux(&self, particle: &str, power_kw: f64) -> Result<Array4<f64>>;
}

/// Flux tensors tallied at one reference power and scaled linearly to
/// the requested power.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedFlux {
    reference_power_kw: f64,
    tensors: BTreeMap<String, Array4<f64>>,
}

impl TabulatedFlux {
    pub fn new(reference_power_kw: f64, tensors: BTreeMap<String, Array4<f64>>) -> Result<Self> {
        if !reference_power_kw.is_finite() || reference_power_kw <= 0.0 {
            return Err(UnfoldError::Configuration(format!(
                "flux reference power must be positive, got {reference_power_kw}"
            )));
        }
        Ok(Self {
            reference_power_kw,
            tensors,
        })
    }

    pub fn reference_power_kw(&self) -> f64 {
        self.reference_power_kw
    }

    pub fn particles(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}

impl FluxLookup for TabulatedFlux {
    fn flux(&self, particle: &str, power_kw: f64) -> Result<Array4<f64>> {
        let tensor = self.tensors.get(particle).ok_or_else(|| {
            UnfoldError::Configuration(format!("no flux tallied for particle '{particle}'"))
        })?;
        Ok(tensor * (power_kw / self.reference_power_kw))
    }
}

// ---------------------------------------------------------------------------
// FluxTable – serialized form
// ---------------------------------------------------------------------------

/// Row-major tensor data with its 4-D shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: [usize; 4],
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxTable {
    pub reference_power_kw: f64,
    pub particles: BTreeMap<String, TensorData>,
}

impl TryFrom<FluxTable> for TabulatedFlux {
    type Error = UnfoldError;

    fn try_from(table: FluxTable) -> Result<Self> {
        let mut tensors = BTreeMap::new();
        for (particle, tensor) in table.particles {
            let expected: usize = tensor.shape.iter().product();
            let actual = tensor.data.len();
            let array = Array4::from_shape_vec(tensor.shape, tensor.data)
                .map_err(|_| UnfoldError::shape("flux tensor", expected, actual))?;
            tensors.insert(particle, array);
        }
        TabulatedFlux::new(table.reference_power_kw, tensors)
    }
}

impl From<&TabulatedFlux> for FluxTable {
    fn from(flux: &TabulatedFlux) -> Self {
        let particles = flux
            .tensors
            .iter()
            .map(|(name, t)| {
                let dim = t.dim();
                (
                    name.clone(),
                    TensorData {
                        shape: [dim.0, dim.1, dim.2, dim.3],
                        data: t.iter().copied().collect(),
                    },
                )
            })
            .collect();
        FluxTable {
            reference_power_kw: flux.reference_power_kw,
            particles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FluxTable {
        let mut particles = BTreeMap::new();
        particles.insert(
            "n".to_string(),
            TensorData {
                shape: [1, 2, 3, 1],
                data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            },
        );
        FluxTable {
            reference_power_kw: 100.0,
            particles,
        }
    }

    #[test]
    fn flux_scales_linearly_with_power() {
        let flux = TabulatedFlux::try_from(table()).unwrap();
        assert_eq!(flux.reference_power_kw(), 100.0);
        assert_eq!(flux.particles().collect::<Vec<_>>(), ["n"]);
        let at_ref = flux.flux("n", 100.0).unwrap();
        let doubled = flux.flux("n", 200.0).unwrap();
        assert_eq!(at_ref[[0, 1, 2, 0]], 6.0);
        assert_eq!(doubled[[0, 1, 2, 0]], 12.0);
    }

    #[test]
    fn unknown_particle_is_an_error() {
        let flux = TabulatedFlux::try_from(table()).unwrap();
        assert!(flux.flux("p", 100.0).is_err());
    }

    #[test]
    fn bad_tensor_length_is_a_shape_mismatch() {
        let mut t = table();
        t.particles.get_mut("n").unwrap().data.pop();
        let err = TabulatedFlux::try_from(t).unwrap_err();
        assert!(matches!(err, UnfoldError::ShapeMismatch { .. }));
    }
}
