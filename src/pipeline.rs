use ndarray::Array1;
use serde::Serialize;

use crate::assemble::{check_alignment, MeasurementAssembler, ResponseAssembler};
use crate::config::{DataSource, ExperimentConstants, RunConfig, SolverParams, UnfoldMethod};
use crate::data::catalog::ResponseCatalog;
use crate::data::experiment::{FoilExperiment, SphereExperiment};
use crate::data::flux::FluxLookup;
use crate::data::loader::Dataset;
use crate::data::model::SpectrumSolution;
use crate::error::{Result, UnfoldError};
use crate::fit::{FitObserver, FitReport, LogObserver};
use crate::unfold::{algorithm_for, solve, UnfoldProblem};

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Non-fatal conditions attached to a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum RunWarning {
    /// The tolerance was not met; the last iterate is still reported.
    SolverNonconvergence { iterations: usize, last_change: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SphereFit {
    pub detector: String,
    #[serde(flatten)]
    pub report: FitReport,
}

/// Everything recorded for one named unfolding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfoldReport {
    pub name: String,
    pub method: UnfoldMethod,
    pub data_source: DataSource,
    pub power_level: f64,
    pub params: SolverParams,
    /// Unfolded spectrum and its bin edges.
    pub solution: SpectrumSolution,
    pub default_spectrum: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub chi_squared: f64,
    /// Catalog keys in row order.
    pub detectors: Vec<String>,
    pub measured: Vec<f64>,
    /// `R · solution`.
    pub modeled: Vec<f64>,
    /// `modeled / measured`, absent where nothing was measured.
    pub ratio: Vec<Option<f64>>,
    pub fits: Vec<SphereFit>,
    pub warnings: Vec<RunWarning>,
}

impl UnfoldReport {
    pub fn edges(&self) -> &[f64] {
        &self.solution.edges
    }

    pub fn spectrum(&self) -> &[f64] {
        &self.solution.values
    }
}

/// Outcome of one entry of a batch.
#[derive(Debug)]
pub struct RunResult {
    pub name: String,
    pub outcome: Result<UnfoldReport>,
}

/// Results of a batch, in request order. A failed run never stops the
/// others.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub runs: Vec<RunResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &UnfoldReport> {
        self.runs.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &UnfoldError)> {
        self.runs
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.name.as_str(), e)))
    }

    pub fn get(&self, name: &str) -> Option<&Result<UnfoldReport>> {
        self.runs.iter().find(|r| r.name == name).map(|r| &r.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// The built-in batch: one combined Gravel run at 1e5 kW with a fixed
/// 100 iterations.
pub fn default_batch() -> Vec<RunConfig> {
    vec![RunConfig::new(
        "all",
        "all",
        1e5,
        "Gravel",
        SolverParams {
            tolerance: 0.0,
            max_iterations: 100,
        },
    )]
}

// ---------------------------------------------------------------------------
// Unfolder – one run from configuration to report
// ---------------------------------------------------------------------------

pub struct Unfolder<'a> {
    catalog: &'a dyn ResponseCatalog,
    flux: &'a dyn FluxLookup,
    foil: &'a dyn FoilExperiment,
    spheres: &'a dyn SphereExperiment,
    constants: &'a ExperimentConstants,
}

impl<'a> Unfolder<'a> {
    pub fn new(
        catalog: &'a dyn ResponseCatalog,
        flux: &'a dyn FluxLookup,
        foil: &'a dyn FoilExperiment,
        spheres: &'a dyn SphereExperiment,
        constants: &'a ExperimentConstants,
    ) -> Self {
        Self {
            catalog,
            flux,
            foil,
            spheres,
            constants,
        }
    }

    pub fn from_dataset(dataset: &'a Dataset, constants: &'a ExperimentConstants) -> Self {
        Self::new(
            &dataset.catalog,
            &dataset.flux,
            &dataset.foil,
            &dataset.spheres,
            constants,
        )
    }

    pub fn run(&self, config: &RunConfig) -> Result<UnfoldReport> {
        self.run_observed(config, &mut LogObserver)
    }

    /// Validate, assemble, solve. Configuration and shape problems are
    /// reported before the solver starts.
    pub fn run_observed(
        &self,
        config: &RunConfig,
        observer: &mut dyn FitObserver,
    ) -> Result<UnfoldReport> {
        let run = config.validate()?;
        self.constants.validate()?;

        let detectors = self.constants.layout.select(run.data_source);
        log::info!(
            "Run '{}': {} {} at {} kW, detectors {:?}",
            run.name,
            run.method,
            run.data_source,
            run.power_level,
            detectors.catalog_keys()
        );

        let responses = ResponseAssembler::new(self.catalog, self.flux, self.constants);
        let r = responses.response_matrix(&detectors)?;
        let ds = responses.default_spectrum(run.power_level, r.n_bins())?;

        let assembled = MeasurementAssembler::new(self.constants).assemble(
            &detectors,
            run.power_level,
            self.foil,
            self.spheres,
            observer,
        )?;
        let measured = assembled.vector;
        check_alignment(&r, &measured)?;

        let sigma = Array1::from(run.uncertainty.sigma(&measured.values.to_vec())?);
        let problem = UnfoldProblem::new(
            measured.values.view(),
            sigma.view(),
            r.matrix.view(),
            ds.values.view(),
        )?;
        let outcome = solve(algorithm_for(run.method).as_ref(), &problem, &run.params)?;

        let modeled = r.fold(outcome.spectrum.view())?;
        let ratio: Vec<Option<f64>> = modeled
            .iter()
            .zip(measured.values.iter())
            .map(|(m, n)| (*n > 0.0).then(|| m / n))
            .collect();

        let mut warnings = Vec::new();
        if !outcome.converged {
            warnings.push(RunWarning::SolverNonconvergence {
                iterations: outcome.iterations,
                last_change: outcome.last_change,
            });
        }

        log::info!(
            "Run '{}' done: {} iterations, chi2 {:.4e}{}",
            run.name,
            outcome.iterations,
            outcome.chi_squared,
            if outcome.converged { "" } else { " (not converged)" }
        );

        Ok(UnfoldReport {
            name: run.name,
            method: run.method,
            data_source: run.data_source,
            power_level: run.power_level,
            params: run.params,
            solution: SpectrumSolution {
                edges: r.edges.clone(),
                values: outcome.spectrum.to_vec(),
            },
            default_spectrum: ds.values.to_vec(),
            iterations: outcome.iterations,
            converged: outcome.converged,
            chi_squared: outcome.chi_squared,
            detectors: r.detectors.iter().map(|d| d.catalog_key()).collect(),
            measured: measured.values.to_vec(),
            modeled: modeled.to_vec(),
            ratio,
            fits: assembled
                .fits
                .into_iter()
                .map(|(id, report)| SphereFit {
                    detector: id.catalog_key(),
                    report,
                })
                .collect(),
            warnings,
        })
    }

    pub fn run_batch(&self, configs: &[RunConfig]) -> BatchReport {
        self.run_batch_observed(configs, &mut LogObserver)
    }

    /// Run every configuration, collecting failures instead of stopping.
    pub fn run_batch_observed(
        &self,
        configs: &[RunConfig],
        observer: &mut dyn FitObserver,
    ) -> BatchReport {
        let runs = configs
            .iter()
            .map(|config| {
                let outcome = self.run_observed(config, observer);
                if let Err(e) = &outcome {
                    log::error!("Run '{}' failed: {e}", config.name);
                }
                RunResult {
                    name: config.name.clone(),
                    outcome,
                }
            })
            .collect();
        BatchReport { runs }
    }
}
