use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detector::DetectorLayout;
use crate::error::{Result, UnfoldError};
use crate::fit::FitConfig;

// ---------------------------------------------------------------------------
// DataSource – which experiments feed a run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Activation foil channels only.
    Foil,
    /// Bonner spheres only.
    Sphere,
    /// Foils followed by spheres.
    Combined,
}

impl FromStr for DataSource {
    type Err = UnfoldError;

    /// Accepts `foil`, `sphere`, `combined` and the short names
    /// `ft_au`, `bs`, `all`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "foil" | "ft_au" => Ok(DataSource::Foil),
            "sphere" | "bs" => Ok(DataSource::Sphere),
            "combined" | "all" => Ok(DataSource::Combined),
            other => Err(UnfoldError::InputValidation(format!(
                "data_source must be 'foil', 'sphere' or 'combined', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataSource::Foil => "foil",
            DataSource::Sphere => "sphere",
            DataSource::Combined => "combined",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// UnfoldMethod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfoldMethod {
    Gravel,
    Mlem,
}

impl FromStr for UnfoldMethod {
    type Err = UnfoldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gravel" => Ok(UnfoldMethod::Gravel),
            "mlem" => Ok(UnfoldMethod::Mlem),
            other => Err(UnfoldError::InputValidation(format!(
                "unknown unfolding method '{other}' (expected 'Gravel' or 'MLEM')"
            ))),
        }
    }
}

impl fmt::Display for UnfoldMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnfoldMethod::Gravel => f.write_str("Gravel"),
            UnfoldMethod::Mlem => f.write_str("MLEM"),
        }
    }
}

// ---------------------------------------------------------------------------
// SolverParams
// ---------------------------------------------------------------------------

/// Numeric parameters of the iterative solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Largest relative per-bin change that counts as converged.
    /// Zero runs exactly `max_iterations` iterations.
    #[serde(alias = "tol")]
    pub tolerance: f64,
    #[serde(alias = "max_iter")]
    pub max_iterations: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            max_iterations: 100,
        }
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(UnfoldError::InputValidation(format!(
                "tolerance must be a finite value >= 0, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(UnfoldError::InputValidation(
                "max_iterations must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Whether the solver runs a fixed number of iterations.
    pub fn fixed_iterations(&self) -> bool {
        self.tolerance == 0.0
    }
}

// ---------------------------------------------------------------------------
// UncertaintyModel
// ---------------------------------------------------------------------------

/// How the measurement uncertainty vector is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum UncertaintyModel {
    /// `sigma_i = fraction * N_i` for every detector.
    Fractional { fraction: f64 },
    /// Explicit per-detector standard deviations, in detector order.
    Absolute { sigma: Vec<f64> },
}

impl Default for UncertaintyModel {
    fn default() -> Self {
        UncertaintyModel::Fractional { fraction: 0.05 }
    }
}

impl UncertaintyModel {
    pub fn validate(&self) -> Result<()> {
        match self {
            UncertaintyModel::Fractional { fraction } => {
                if !fraction.is_finite() || *fraction <= 0.0 {
                    return Err(UnfoldError::InputValidation(format!(
                        "uncertainty fraction must be positive, got {fraction}"
                    )));
                }
            }
            UncertaintyModel::Absolute { sigma } => {
                if let Some(bad) = sigma.iter().find(|s| !s.is_finite() || **s <= 0.0) {
                    return Err(UnfoldError::InputValidation(format!(
                        "uncertainties must be positive, got {bad}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Uncertainty vector parallel to `measurements`.
    pub fn sigma(&self, measurements: &[f64]) -> Result<Vec<f64>> {
        match self {
            UncertaintyModel::Fractional { fraction } => {
                Ok(measurements.iter().map(|n| fraction * n).collect())
            }
            UncertaintyModel::Absolute { sigma } => {
                if sigma.len() != measurements.len() {
                    return Err(UnfoldError::shape(
                        "uncertainty vector",
                        measurements.len(),
                        sigma.len(),
                    ));
                }
                Ok(sigma.clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RunConfig – one requested unfolding
// ---------------------------------------------------------------------------

/// One named unfolding as written in a batch file. Strings are kept raw
/// and checked by [`RunConfig::validate`] before any numeric work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub data_source: String,
    /// Reactor power in kW thermal.
    pub power_level: f64,
    pub method: String,
    #[serde(default)]
    pub params: SolverParams,
    #[serde(default)]
    pub uncertainty: UncertaintyModel,
}

/// A [`RunConfig`] whose fields have been parsed and range-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRun {
    pub name: String,
    pub data_source: DataSource,
    pub power_level: f64,
    pub method: UnfoldMethod,
    pub params: SolverParams,
    pub uncertainty: UncertaintyModel,
}

impl RunConfig {
    pub fn new(
        name: impl Into<String>,
        data_source: impl Into<String>,
        power_level: f64,
        method: impl Into<String>,
        params: SolverParams,
    ) -> Self {
        Self {
            name: name.into(),
            data_source: data_source.into(),
            power_level,
            method: method.into(),
            params,
            uncertainty: UncertaintyModel::default(),
        }
    }

    pub fn validate(&self) -> Result<ValidatedRun> {
        let data_source: DataSource = self.data_source.parse()?;
        let method: UnfoldMethod = self.method.parse()?;
        if !self.power_level.is_finite() || self.power_level <= 0.0 {
            return Err(UnfoldError::InputValidation(format!(
                "power_level must be positive, got {}",
                self.power_level
            )));
        }
        self.params.validate()?;
        self.uncertainty.validate()?;
        Ok(ValidatedRun {
            name: self.name.clone(),
            data_source,
            power_level: self.power_level,
            method,
            params: self.params,
            uncertainty: self.uncertainty.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// ExperimentConstants – fixed facts about the experiments
// ---------------------------------------------------------------------------

/// Experiment-wide constants, passed explicitly to each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConstants {
    /// Power (kW thermal) the foil activities were measured at.
    pub foil_nominal_power_kw: f64,
    /// Power (kW thermal) the sphere spectra were measured at.
    pub sphere_nominal_power_kw: f64,
    pub layout: DetectorLayout,
    pub fit: FitConfig,
    /// Particle queried from the flux lookup.
    pub particle: String,
    /// Leading angular groups left out of the default spectrum (group 0
    /// is the cosine-summed total).
    pub skip_angular_groups: usize,
    /// Leading energy groups left out of the default spectrum.
    pub skip_energy_groups: usize,
    /// Index along the quantity axis holding the flux value.
    pub flux_quantity: usize,
}

impl Default for ExperimentConstants {
    fn default() -> Self {
        Self {
            foil_nominal_power_kw: 1e5,
            sphere_nominal_power_kw: 1e3,
            layout: DetectorLayout::default(),
            fit: FitConfig::default(),
            particle: "n".to_string(),
            skip_angular_groups: 1,
            skip_energy_groups: 1,
            flux_quantity: 0,
        }
    }
}

impl ExperimentConstants {
    pub fn validate(&self) -> Result<()> {
        for (what, p) in [
            ("foil nominal power", self.foil_nominal_power_kw),
            ("sphere nominal power", self.sphere_nominal_power_kw),
        ] {
            if !p.is_finite() || p <= 0.0 {
                return Err(UnfoldError::Configuration(format!(
                    "{what} must be positive, got {p}"
                )));
            }
        }
        self.fit.validate()
    }
}
