//! Iterative multiplicative unfolding.
//!
//! Starting from the default spectrum, each iteration folds the current
//! estimate through the response matrix and rescales every energy bin by
//! a factor built from the measured-to-modeled response ratios. The
//! update rule is a swappable [`UnfoldingAlgorithm`]; the iteration loop,
//! stopping rule and input checks are shared.

mod gravel;
mod mlem;

pub use gravel::Gravel;
pub use mlem::Mlem;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::config::{SolverParams, UnfoldMethod};
use crate::error::{Result, UnfoldError};

// ---------------------------------------------------------------------------
// UnfoldProblem – validated solver inputs
// ---------------------------------------------------------------------------

/// Measurements `N`, uncertainties, response matrix `R` and default
/// spectrum, checked for consistent shapes and non-negative entries.
#[derive(Debug, Clone, Copy)]
pub struct UnfoldProblem<'a> {
    measurements: ArrayView1<'a, f64>,
    sigma: ArrayView1<'a, f64>,
    response: ArrayView2<'a, f64>,
    default: ArrayView1<'a, f64>,
}

impl<'a> UnfoldProblem<'a> {
    pub fn new(
        measurements: ArrayView1<'a, f64>,
        sigma: ArrayView1<'a, f64>,
        response: ArrayView2<'a, f64>,
        default: ArrayView1<'a, f64>,
    ) -> Result<Self> {
        let (n_detectors, n_bins) = response.dim();
        if measurements.len() != n_detectors {
            return Err(UnfoldError::shape(
                "solver measurements",
                format!("{n_detectors} entries (response rows)"),
                format!("{} entries", measurements.len()),
            ));
        }
        if sigma.len() != n_detectors {
            return Err(UnfoldError::shape(
                "solver uncertainties",
                format!("{n_detectors} entries (response rows)"),
                format!("{} entries", sigma.len()),
            ));
        }
        if default.len() != n_bins {
            return Err(UnfoldError::shape(
                "solver default spectrum",
                format!("{n_bins} bins (response columns)"),
                format!("{} bins", default.len()),
            ));
        }
        if n_detectors == 0 || n_bins == 0 {
            return Err(UnfoldError::shape(
                "solver response matrix",
                "at least one detector and one bin",
                format!("{n_detectors}x{n_bins}"),
            ));
        }
        check_non_negative("measurements", measurements.iter())?;
        check_non_negative("uncertainties", sigma.iter())?;
        check_non_negative("response matrix", response.iter())?;
        check_non_negative("default spectrum", default.iter())?;
        Ok(Self {
            measurements,
            sigma,
            response,
            default,
        })
    }

    pub fn measurements(&self) -> ArrayView1<'a, f64> {
        self.measurements
    }

    pub fn sigma(&self) -> ArrayView1<'a, f64> {
        self.sigma
    }

    pub fn response(&self) -> ArrayView2<'a, f64> {
        self.response
    }

    pub fn default_spectrum(&self) -> ArrayView1<'a, f64> {
        self.default
    }

    pub fn fold(&self, spectrum: &Array1<f64>) -> Array1<f64> {
        self.response.dot(spectrum)
    }
}

fn check_non_negative<'v>(what: &str, mut values: impl Iterator<Item = &'v f64>) -> Result<()> {
    match values.find(|v| !v.is_finite() || **v < 0.0) {
        Some(v) => Err(UnfoldError::Configuration(format!(
            "{what} must be finite and non-negative, found {v}"
        ))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// UnfoldingAlgorithm
// ---------------------------------------------------------------------------

/// One multiplicative update rule.
pub trait UnfoldingAlgorithm {
    fn name(&self) -> &'static str;

    /// Next estimate from `current`, whose folded responses are `modeled`.
    /// Non-negative inputs must give a non-negative result.
    fn update(
        &self,
        problem: &UnfoldProblem<'_>,
        current: &Array1<f64>,
        modeled: &Array1<f64>,
    ) -> Array1<f64>;
}

pub fn algorithm_for(method: UnfoldMethod) -> Box<dyn UnfoldingAlgorithm> {
    match method {
        UnfoldMethod::Gravel => Box::new(Gravel),
        UnfoldMethod::Mlem => Box::new(Mlem),
    }
}

// ---------------------------------------------------------------------------
// Solver loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct UnfoldOutcome {
    pub spectrum: Array1<f64>,
    pub iterations: usize,
    /// False when the tolerance was not met within `max_iterations`.
    pub converged: bool,
    /// Largest relative per-bin change of the last iteration.
    pub last_change: f64,
    /// `Σ ((N − R·φ) / σ)²` over detectors with non-zero σ.
    pub chi_squared: f64,
}

/// Iterate `algorithm` from the default spectrum. With a zero tolerance
/// exactly `max_iterations` iterations run; otherwise iteration stops
/// once no bin changes by more than the tolerance (relative).
pub fn solve(
    algorithm: &dyn UnfoldingAlgorithm,
    problem: &UnfoldProblem<'_>,
    params: &SolverParams,
) -> Result<UnfoldOutcome> {
    solve_observed(algorithm, problem, params, &mut |_, _| {})
}

/// As [`solve`], calling `observer` with every iterate.
pub fn solve_observed(
    algorithm: &dyn UnfoldingAlgorithm,
    problem: &UnfoldProblem<'_>,
    params: &SolverParams,
    observer: &mut dyn FnMut(usize, &Array1<f64>),
) -> Result<UnfoldOutcome> {
    params.validate()?;

    let mut spectrum = problem.default_spectrum().to_owned();
    let mut converged = false;
    let mut iterations = 0;
    let mut last_change = f64::INFINITY;

    for iteration in 1..=params.max_iterations {
        let modeled = problem.fold(&spectrum);
        let next = algorithm.update(problem, &spectrum, &modeled);
        observer(iteration, &next);

        last_change = relative_change(&spectrum, &next);
        spectrum = next;
        iterations = iteration;

        if !params.fixed_iterations() && last_change <= params.tolerance {
            converged = true;
            break;
        }
    }
    if params.fixed_iterations() {
        converged = true;
    }

    let modeled = problem.fold(&spectrum);
    let chi_squared: f64 = problem
        .measurements
        .iter()
        .zip(modeled.iter())
        .zip(problem.sigma.iter())
        .filter(|(_, s)| **s > 0.0)
        .map(|((n, m), s)| ((n - m) / s).powi(2))
        .sum();

    if converged {
        log::debug!(
            "{} finished after {iterations} iterations (chi2 {chi_squared:.4e})",
            algorithm.name()
        );
    } else {
        log::warn!(
            "{} did not reach tolerance {} within {} iterations (last change {last_change:.3e})",
            algorithm.name(),
            params.tolerance,
            params.max_iterations
        );
    }

    Ok(UnfoldOutcome {
        spectrum,
        iterations,
        converged,
        last_change,
        chi_squared,
    })
}

fn relative_change(previous: &Array1<f64>, next: &Array1<f64>) -> f64 {
    previous
        .iter()
        .zip(next.iter())
        .map(|(p, n)| {
            if !n.is_finite() {
                f64::INFINITY
            } else if *p > 0.0 {
                (n - p).abs() / p
            } else if *n == *p {
                0.0
            } else {
                f64::INFINITY
            }
        })
        .fold(0.0, f64::max)
}
