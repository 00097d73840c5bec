//! Synthetic fixtures shared by the unit tests.

use std::collections::BTreeMap;

use ndarray::{Array1, Array4};

use crate::config::ExperimentConstants;
use crate::data::catalog::InMemoryCatalog;
use crate::data::experiment::{SphereSpectra, TabulatedFoilData};
use crate::data::flux::TabulatedFlux;
use crate::data::model::{RawSpectrum, ResponseFunction};
use crate::detector::{DetectorId, DetectorLayout};
use crate::fit::{FitConfig, PeakParams};

pub const N_BINS: usize = 20;
pub const FLUX_REFERENCE_KW: f64 = 1e5;

/// Shape of the synthetic sphere spectra; `c` is replaced per sphere.
pub const SPHERE_PEAK: PeakParams = PeakParams {
    a: 200.0,
    b: 0.004,
    c: 0.0,
    d: 40.0,
    e: 700.0,
};

pub fn edges() -> Vec<f64> {
    (0..=N_BINS)
        .map(|i| 1e-9 * 10f64.powf(i as f64 * 10.0 / N_BINS as f64))
        .collect()
}

/// Fit settings starting close to the synthetic peak shape.
pub fn fit_config() -> FitConfig {
    FitConfig {
        initial_guess: PeakParams {
            a: 160.0,
            b: 0.0044,
            c: 1.0e4,
            d: 37.0,
            e: 695.0,
        },
        ..FitConfig::default()
    }
}

pub fn constants() -> ExperimentConstants {
    ExperimentConstants {
        fit: fit_config(),
        ..ExperimentConstants::default()
    }
}

/// Bell-shaped response centred on `center` (in bins), floored above zero.
fn bump(center: f64, width: f64, height: f64) -> Vec<f64> {
    (0..N_BINS)
        .map(|j| {
            let z = (j as f64 - center) / width;
            height * (-0.5 * z * z).exp() + 1e-3
        })
        .collect()
}

pub fn response_for(id: DetectorId) -> ResponseFunction {
    let values = match id {
        DetectorId::Foil(ch) => bump(ch as f64 * 2.0 + 1.0, 1.5, 2.0),
        DetectorId::Sphere(size) => bump(size as f64 * 1.4 + 2.0, 3.0, 0.5 + size as f64 * 0.05),
    };
    ResponseFunction::new(values, edges())
}

pub fn catalog() -> InMemoryCatalog {
    DetectorLayout::default()
        .all()
        .into_iter()
        .map(|id| (id.catalog_key(), response_for(id)))
        .collect()
}

/// True spectrum per bin at the flux reference power.
pub fn true_spectrum() -> Array1<f64> {
    Array1::from_iter((0..N_BINS).map(|j| 1.0e3 * (1.0 + (j as f64 * 0.6).sin().abs())))
}

/// Tensor `[1 particle, 3 angular, N_BINS + 1 energy, 2 quantities]`.
/// Angular group 0 holds the total, energy group 0 is a placeholder.
pub fn flux() -> TabulatedFlux {
    let truth = true_spectrum();
    let mut tensor = Array4::<f64>::zeros((1, 3, N_BINS + 1, 2));
    tensor[[0, 0, 0, 0]] = 99.0;
    tensor[[0, 1, 0, 0]] = 55.0;
    for j in 0..N_BINS {
        let forward = 0.75 * truth[j];
        let backward = 0.25 * truth[j];
        tensor[[0, 0, j + 1, 0]] = truth[j];
        tensor[[0, 1, j + 1, 0]] = forward;
        tensor[[0, 2, j + 1, 0]] = backward;
        tensor[[0, 1, j + 1, 1]] = 0.01;
        tensor[[0, 2, j + 1, 1]] = 0.01;
    }
    let mut tensors = BTreeMap::new();
    tensors.insert("n".to_string(), tensor);
    TabulatedFlux::new(FLUX_REFERENCE_KW, tensors).unwrap()
}

fn fold(id: DetectorId, spectrum: &Array1<f64>) -> f64 {
    response_for(id)
        .values
        .iter()
        .zip(spectrum.iter())
        .map(|(r, s)| r * s)
        .sum()
}

/// Foil activities consistent with the true spectrum at the foil
/// nominal power.
pub fn foil_data() -> TabulatedFoilData {
    let constants = ExperimentConstants::default();
    let truth = true_spectrum() * (constants.foil_nominal_power_kw / FLUX_REFERENCE_KW);
    TabulatedFoilData {
        activities: constants.layout.foils().map(|id| fold(id, &truth)).collect(),
    }
}

/// A 2048-channel integer spectrum with the given peak area.
pub fn sphere_spectrum(area: f64, live_time: f64) -> RawSpectrum {
    let lld = FitConfig::default().lld;
    let shape = PeakParams {
        c: area,
        ..SPHERE_PEAK
    };
    let counts = (0..2048)
        .map(|ch| {
            if ch < lld {
                5_000
            } else {
                shape.eval((ch - lld) as f64).round() as u64
            }
        })
        .collect();
    RawSpectrum::new(counts, live_time).unwrap()
}

pub const SPHERE_LIVE_TIME: f64 = 1000.0;

/// Sphere spectra whose peak rates are consistent with the true
/// spectrum at the sphere nominal power.
pub fn sphere_spectra() -> SphereSpectra {
    let constants = ExperimentConstants::default();
    let truth = true_spectrum() * (constants.sphere_nominal_power_kw / FLUX_REFERENCE_KW);
    let mut spheres = SphereSpectra::default();
    for id in constants.layout.spheres() {
        if let DetectorId::Sphere(size) = id {
            let rate = fold(id, &truth);
            spheres.insert(size, sphere_spectrum(rate * SPHERE_LIVE_TIME, SPHERE_LIVE_TIME));
        }
    }
    spheres
}

/// Expected sphere rate at the sphere nominal power.
pub fn expected_sphere_rate(size: u8) -> f64 {
    let constants = ExperimentConstants::default();
    let truth = true_spectrum() * (constants.sphere_nominal_power_kw / FLUX_REFERENCE_KW);
    fold(DetectorId::Sphere(size), &truth)
}
