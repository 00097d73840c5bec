use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array1, Array4};

use neutron_unfold::data::catalog::InMemoryCatalog;
use neutron_unfold::data::experiment::{SphereSpectra, TabulatedFoilData};
use neutron_unfold::data::flux::TabulatedFlux;
use neutron_unfold::data::loader::{Dataset, DatasetPaths};
use neutron_unfold::data::model::{RawSpectrum, ResponseFunction};
use neutron_unfold::detector::DetectorId;
use neutron_unfold::fit::PeakParams;
use neutron_unfold::{ExperimentConstants, RunConfig, SolverParams};

/// Write a synthetic dataset and a batch file that unfolds it.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Energy bins between 1e-11 and 20 MeV.
    #[arg(long, default_value_t = 60)]
    bins: usize,
}

const LIVE_TIME: f64 = 600.0;
const CHANNELS: usize = 2048;
const FLUX_REFERENCE_KW: f64 = 1e5;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Counting noise, normal approximation.
    fn counts(&mut self, mean: f64) -> u64 {
        self.gauss(mean, mean.max(0.0).sqrt()).round().max(0.0) as u64
    }
}

fn log_edges(bins: usize) -> Vec<f64> {
    let (lo, hi) = (1e-11f64.log10(), 20f64.log10());
    (0..=bins)
        .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / bins as f64))
        .collect()
}

/// Thermal Maxwellian, 1/E slowing down and a Watt fission tail,
/// integrated per bin by the midpoint rule.
fn reactor_spectrum(edges: &[f64]) -> Array1<f64> {
    let kt = 2.53e-8;
    Array1::from_iter(edges.windows(2).map(|w| {
        let e = (w[0] * w[1]).sqrt();
        let thermal = 5.0e12 * e / (kt * kt) * (-e / kt).exp();
        let epithermal = 2.0e11 / e * (1.0 - (-e / (5.0 * kt)).exp());
        let fission = 1.0e12 * (-e / 0.988).exp() * (2.249 * e).sqrt().sinh();
        (thermal + epithermal + fission) * (w[1] - w[0])
    }))
}

/// Gaussian bump in log-energy.
fn log_bump(edges: &[f64], log_center: f64, log_width: f64) -> Vec<f64> {
    edges
        .windows(2)
        .map(|w| {
            let z = ((w[0] * w[1]).sqrt().log10() - log_center) / log_width;
            (-0.5 * z * z).exp() + 1e-4
        })
        .collect()
}

fn response_for(id: DetectorId, edges: &[f64]) -> Vec<f64> {
    match id {
        // Bare and covered gold foils, shifting from thermal upwards.
        DetectorId::Foil(ch) => log_bump(edges, -8.5 + ch as f64 * 0.9, 0.5),
        // Larger spheres moderate faster neutrons.
        DetectorId::Sphere(size) => {
            let size = size as f64;
            log_bump(edges, -7.5 + size * 0.6, 1.0 + size * 0.1)
        }
    }
}

fn dot(a: &[f64], b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Pulse-height spectrum: noise below the LLD, exponential background
/// and one thermal-capture peak above it.
fn sphere_spectrum(rng: &mut SimpleRng, shape: &PeakParams, lld: usize) -> Result<RawSpectrum> {
    let counts = (0..CHANNELS)
        .map(|ch| {
            let mean = if ch < lld {
                4.0e4 * (-(ch as f64) / 80.0).exp() + shape.a
            } else {
                shape.eval((ch - lld) as f64)
            };
            rng.counts(mean)
        })
        .collect();
    Ok(RawSpectrum::new(counts, LIVE_TIME)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let edges = log_edges(args.bins);
    let truth = reactor_spectrum(&edges);
    let mut constants = ExperimentConstants::default();
    constants.fit.initial_guess = PeakParams {
        a: 100.0,
        b: 0.005,
        c: 1.0e4,
        d: 50.0,
        e: 1000.0,
    };

    // Flux tally [particle, angular, energy, quantity]: angular group 0
    // is the total, energy group 0 a placeholder, quantity 1 the error.
    let mut tensor = Array4::<f64>::zeros((1, 3, args.bins + 1, 2));
    for (j, phi) in truth.iter().enumerate() {
        let forward = phi * (0.6 + rng.gauss(0.0, 0.01));
        tensor[[0, 0, j + 1, 0]] = *phi;
        tensor[[0, 1, j + 1, 0]] = forward;
        tensor[[0, 2, j + 1, 0]] = phi - forward;
        tensor[[0, 1, j + 1, 1]] = 0.02;
        tensor[[0, 2, j + 1, 1]] = 0.02;
    }
    let mut tensors = BTreeMap::new();
    tensors.insert(constants.particle.clone(), tensor);
    let flux = TabulatedFlux::new(FLUX_REFERENCE_KW, tensors)?;

    // The measured spectrum differs from the simulated one by a smooth
    // distortion, so unfolding has something to recover.
    let measured_truth: Array1<f64> = truth
        .iter()
        .zip(edges.windows(2))
        .map(|(phi, w)| phi * (1.0 + 0.3 * ((w[0] * w[1]).sqrt().log10() * 0.8).sin()))
        .collect();

    let mut catalog = InMemoryCatalog::default();
    let foil_scale = constants.foil_nominal_power_kw / FLUX_REFERENCE_KW;
    let mut activities = Vec::new();
    for id in constants.layout.foils() {
        let values = response_for(id, &edges);
        let activity = dot(&values, &measured_truth) * foil_scale;
        activities.push(activity * (1.0 + rng.gauss(0.0, 0.02)));
        catalog.insert(id.catalog_key(), ResponseFunction::new(values, edges.clone()));
    }

    let sphere_scale = constants.sphere_nominal_power_kw / FLUX_REFERENCE_KW;
    let mut spheres = SphereSpectra::default();
    for id in constants.layout.spheres() {
        let DetectorId::Sphere(size) = id else { continue };
        // Normalize each sphere to a plausible count rate.
        let raw = response_for(id, &edges);
        let target_rate = 30.0 + 5.0 * size as f64;
        let norm = target_rate / dot(&raw, &(&truth * sphere_scale));
        let values: Vec<f64> = raw.iter().map(|v| v * norm).collect();

        let rate = dot(&values, &(&measured_truth * sphere_scale));
        let shape = PeakParams {
            a: 200.0,
            b: 0.004,
            c: rate * LIVE_TIME,
            d: 60.0,
            e: 1000.0,
        };
        spheres.insert(size, sphere_spectrum(&mut rng, &shape, constants.fit.lld)?);
        catalog.insert(id.catalog_key(), ResponseFunction::new(values, edges.clone()));
    }

    let dataset = Dataset {
        catalog,
        flux,
        foil: TabulatedFoilData { activities },
        spheres,
    };

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let dataset_path = args.out_dir.join("sample_dataset.json");
    dataset.save(&dataset_path)?;
    log::info!(
        "Synthetic dataset: {} foils, {} spheres, {} bins, seed {}",
        dataset.foil.activities.len(),
        dataset.spheres.len(),
        args.bins,
        args.seed
    );

    let runs = [
        RunConfig::new("all", "combined", 1e5, "Gravel", SolverParams::default()),
        RunConfig::new(
            "foil_mlem",
            "foil",
            1e5,
            "MLEM",
            SolverParams {
                tolerance: 1e-4,
                max_iterations: 1000,
            },
        ),
        RunConfig::new(
            "sphere_gravel",
            "sphere",
            1e5,
            "Gravel",
            SolverParams {
                tolerance: 1e-4,
                max_iterations: 1000,
            },
        ),
    ];
    let batch = serde_json::json!({
        "dataset": DatasetPaths::bundle("sample_dataset.json"),
        "constants": constants,
        "runs": runs,
    });
    let batch_path = args.out_dir.join("sample_batch.json");
    let text = serde_json::to_string_pretty(&batch).context("serializing batch")?;
    std::fs::write(&batch_path, text)
        .with_context(|| format!("writing {}", batch_path.display()))?;

    println!(
        "Wrote {} responses, {} sphere spectra ({} bins) to {} and a batch to {}",
        dataset.catalog.len(),
        dataset.spheres.len(),
        args.bins,
        dataset_path.display(),
        batch_path.display()
    );
    Ok(())
}
