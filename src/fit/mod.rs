/// Spectrum fitter: raw sphere spectrum → calibrated count rate.
///
/// ```text
///   RawSpectrum (counts, live time)
///        │  window [lld, upper_cutoff)
///        ▼
///   ┌────────────┐
///   │ levenberg  │  least squares of a·exp(−b·x) + c·N(x; e, d)
///   └────────────┘
///        │
///        ▼
///   FitReport (params, rate = c / live time)
/// ```
pub mod levenberg;
pub mod model;
pub mod observer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::model::RawSpectrum;
use crate::error::{Result, UnfoldError};

use levenberg::{LmError, LmSettings};
pub use model::{PeakModel, PeakParams};
pub use observer::{CsvObserver, FitObserver, LogObserver, NoopObserver};

// ---------------------------------------------------------------------------
// FitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Lower-level discriminator: first channel included in the fit.
    pub lld: usize,
    /// First channel excluded from the fit.
    pub upper_cutoff: usize,
    /// Starting point; `e` counts channels from the discriminator.
    pub initial_guess: PeakParams,
    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            lld: 400,
            upper_cutoff: 1900,
            initial_guess: PeakParams::default(),
            max_iterations: 500,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lld >= self.upper_cutoff {
            return Err(UnfoldError::Configuration(format!(
                "fit window is empty: lld {} >= upper cutoff {}",
                self.lld, self.upper_cutoff
            )));
        }
        if !self.initial_guess.is_finite() || self.initial_guess.d == 0.0 {
            return Err(UnfoldError::Configuration(format!(
                "invalid fit initial guess {:?}",
                self.initial_guess
            )));
        }
        if self.max_iterations == 0 {
            return Err(UnfoldError::Configuration(
                "fit max_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FitFailure
// ---------------------------------------------------------------------------

/// Why a spectrum could not be turned into a rate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitFailure {
    #[error("fit window [{lld}, {cutoff}) holds {channels} channels, fewer than the 5 parameters")]
    WindowTooSmall {
        lld: usize,
        cutoff: usize,
        channels: usize,
    },
    #[error("live time must be positive, got {0}")]
    BadLiveTime(f64),
    #[error("model is not finite at the initial guess")]
    NonFiniteStart,
    #[error("no improving step after {iterations} iterations (cost {cost:.4e})")]
    Stalled { iterations: usize, cost: f64 },
    #[error("did not converge within {iterations} iterations (cost {cost:.4e})")]
    DidNotConverge { iterations: usize, cost: f64 },
    #[error("fitted parameters are not finite")]
    NonFiniteParams,
    #[error("negative peak area {0:.4e}")]
    NegativeArea(f64),
    #[error("degenerate peak width {0:.4e}")]
    DegenerateWidth(f64),
}

impl From<LmError> for FitFailure {
    fn from(err: LmError) -> Self {
        match err {
            LmError::NonFiniteStart => FitFailure::NonFiniteStart,
            LmError::Stalled { iterations, cost } => FitFailure::Stalled { iterations, cost },
            LmError::MaxIterations { iterations, cost } => {
                FitFailure::DidNotConverge { iterations, cost }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FitReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub params: PeakParams,
    /// Peak area per unit live time.
    pub rate: f64,
    /// Sum of squared residuals over the window.
    pub cost: f64,
    pub iterations: usize,
    pub channels: usize,
}

// ---------------------------------------------------------------------------
// SpectrumFitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFitter {
    config: FitConfig,
}

impl SpectrumFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit one raw spectrum and report its calibrated rate.
    pub fn fit(
        &self,
        detector: &str,
        spectrum: &RawSpectrum,
        observer: &mut dyn FitObserver,
    ) -> std::result::Result<FitReport, FitFailure> {
        let counts: Vec<f64> = spectrum.counts.iter().map(|&c| c as f64).collect();
        self.fit_counts_observed(detector, &counts, spectrum.live_time, observer)
    }

    /// Fit a full spectrum given as real-valued counts.
    pub fn fit_counts(
        &self,
        counts: &[f64],
        live_time: f64,
    ) -> std::result::Result<FitReport, FitFailure> {
        self.fit_counts_observed("spectrum", counts, live_time, &mut NoopObserver)
    }

    fn fit_counts_observed(
        &self,
        detector: &str,
        counts: &[f64],
        live_time: f64,
        observer: &mut dyn FitObserver,
    ) -> std::result::Result<FitReport, FitFailure> {
        if !live_time.is_finite() || live_time <= 0.0 {
            return Err(FitFailure::BadLiveTime(live_time));
        }
        let cutoff = self.config.upper_cutoff.min(counts.len());
        let window = counts.get(self.config.lld..cutoff).unwrap_or(&[]);
        if window.len() < 5 {
            return Err(FitFailure::WindowTooSmall {
                lld: self.config.lld,
                cutoff,
                channels: window.len(),
            });
        }
        let xs: Vec<f64> = (0..window.len()).map(|i| i as f64).collect();

        let settings = LmSettings {
            max_iterations: self.config.max_iterations,
            ..LmSettings::default()
        };
        let solution = levenberg::minimize(
            &PeakModel,
            &xs,
            window,
            self.config.initial_guess.to_array(),
            &settings,
        )?;
        let params = PeakParams::from_array(solution.params);

        let fitted: Vec<f64> = xs.iter().map(|&x| params.eval(x)).collect();
        observer.observe(detector, self.config.lld, window, &fitted);

        if !params.is_finite() {
            return Err(FitFailure::NonFiniteParams);
        }
        if params.c < 0.0 {
            return Err(FitFailure::NegativeArea(params.c));
        }
        if params.d.abs() < f64::EPSILON {
            return Err(FitFailure::DegenerateWidth(params.d));
        }

        log::debug!(
            "{detector}: peak area {:.4e} at channel {:.1} (sigma {:.2}), {} iterations",
            params.c,
            params.e + self.config.lld as f64,
            params.d.abs(),
            solution.iterations
        );

        Ok(FitReport {
            params: PeakParams {
                d: params.d.abs(),
                ..params
            },
            rate: params.c / live_time,
            cost: solution.cost,
            iterations: solution.iterations,
            channels: window.len(),
        })
    }
}
