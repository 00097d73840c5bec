use ndarray::Array1;

use super::{UnfoldProblem, UnfoldingAlgorithm};

/// GRAVEL: a log-space SAND-II variant weighted by measurement
/// uncertainty.
///
/// `φⱼ ← φⱼ · exp( Σᵢ Wᵢⱼ ln(Nᵢ / Mᵢ) / Σᵢ Wᵢⱼ )` with
/// `Wᵢⱼ = Rᵢⱼ φⱼ / Mᵢ · Nᵢ² / σᵢ²` and `M = R·φ`.
///
/// Detectors with a zero reading, zero modeled response or zero
/// uncertainty carry no weight, as do those whose weight overflows;
/// a bin with no weight is left unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gravel;

impl UnfoldingAlgorithm for Gravel {
    fn name(&self) -> &'static str {
        "Gravel"
    }

    fn update(
        &self,
        problem: &UnfoldProblem<'_>,
        current: &Array1<f64>,
        modeled: &Array1<f64>,
    ) -> Array1<f64> {
        let n = problem.measurements();
        let sigma = problem.sigma();
        let r = problem.response();

        // Per-detector factor Nᵢ² / (σᵢ² Mᵢ) and log ratio, zero weight
        // where undefined or not representable.
        let detector_terms: Vec<(f64, f64)> = (0..n.len())
            .map(|i| {
                if n[i] > 0.0 && modeled[i] > 0.0 && sigma[i] > 0.0 {
                    let snr = n[i] / sigma[i];
                    let weight = snr * snr / modeled[i];
                    let log_ratio = (n[i] / modeled[i]).ln();
                    if weight.is_finite() && log_ratio.is_finite() {
                        return (weight, log_ratio);
                    }
                }
                (0.0, 0.0)
            })
            .collect();

        Array1::from_iter(current.iter().enumerate().map(|(j, &phi)| {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for (i, &(weight, log_ratio)) in detector_terms.iter().enumerate() {
                let w = r[[i, j]] * phi * weight;
                if !w.is_finite() {
                    continue;
                }
                numerator += w * log_ratio;
                denominator += w;
            }
            if denominator > 0.0 {
                phi * (numerator / denominator).exp()
            } else {
                phi
            }
        }))
    }
}
