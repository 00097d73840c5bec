use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::levenberg::LeastSquaresModel;

/// Parameters of the background-plus-peak model
/// `a·exp(−b·x) + c·N(x; e, d)` where `N` is a normalized Gaussian, so
/// `c` is the peak area in counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    /// Background amplitude.
    pub a: f64,
    /// Background decay constant (per channel).
    pub b: f64,
    /// Peak area.
    pub c: f64,
    /// Peak standard deviation (channels).
    pub d: f64,
    /// Peak centroid (channels above the discriminator).
    pub e: f64,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 1.0,
            e: 1000.0,
        }
    }
}

impl PeakParams {
    pub fn to_array(self) -> [f64; 5] {
        [self.a, self.b, self.c, self.d, self.e]
    }

    pub fn from_array(p: [f64; 5]) -> Self {
        Self {
            a: p[0],
            b: p[1],
            c: p[2],
            d: p[3],
            e: p[4],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    pub fn eval(&self, x: f64) -> f64 {
        PeakModel.value(x, &self.to_array())
    }
}

/// Normalized Gaussian density; the sign of `sigma` is ignored.
pub fn gauss(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / ((2.0 * PI).sqrt() * sigma.abs())
}

/// Exponential background plus normalized Gaussian peak.
pub struct PeakModel;

impl LeastSquaresModel<5> for PeakModel {
    fn value(&self, x: f64, p: &[f64; 5]) -> f64 {
        let [a, b, c, d, e] = *p;
        a * (-b * x).exp() + c * gauss(x, e, d)
    }

    fn gradient(&self, x: f64, p: &[f64; 5]) -> [f64; 5] {
        let [a, b, c, d, e] = *p;
        let bg = (-b * x).exp();
        let g = gauss(x, e, d);
        let dx = x - e;
        let d2 = d * d;
        [
            bg,
            -a * x * bg,
            g,
            c * g * (dx * dx / (d2 * d) - 1.0 / d),
            c * g * dx / d2,
        ]
    }
}
