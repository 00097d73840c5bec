use std::fmt;

use thiserror::Error;

use crate::detector::DetectorId;
use crate::fit::FitFailure;

/// Result type for the unfolding core.
pub type Result<T> = std::result::Result<T, UnfoldError>;

// ---------------------------------------------------------------------------
// ErrorKind – coarse classification used by callers
// ---------------------------------------------------------------------------

/// The three error families a run can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad run configuration, detected before any numeric work.
    InputValidation,
    /// Inconsistent binning, shapes or detector ordering.
    Configuration,
    /// One or more peak fits failed.
    FitDivergence,
}

// ---------------------------------------------------------------------------
// UnfoldError
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum UnfoldError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("no response function named '{0}' in the catalog")]
    MissingResponse(String),

    #[error(
        "bin edges of '{detector}' differ from those of '{reference}': \
         expected {expected:?}, got {actual:?}"
    )]
    BinEdgeMismatch {
        reference: String,
        detector: String,
        expected: Vec<f64>,
        actual: Vec<f64>,
    },

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error(
        "detector ordering disagrees at row {row}: response matrix has '{response}', \
         measurement vector has '{measurement}'"
    )]
    OrderingMismatch {
        row: usize,
        response: String,
        measurement: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{} measurement(s) invalid: {}", .0.len(), join_readings(.0))]
    InvalidMeasurements(Vec<InvalidReading>),
}

impl UnfoldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnfoldError::InputValidation(_) => ErrorKind::InputValidation,
            UnfoldError::InvalidMeasurements(readings) => {
                if readings.iter().any(|r| r.fit_failure().is_some()) {
                    ErrorKind::FitDivergence
                } else {
                    ErrorKind::InputValidation
                }
            }
            UnfoldError::MissingResponse(_)
            | UnfoldError::BinEdgeMismatch { .. }
            | UnfoldError::ShapeMismatch { .. }
            | UnfoldError::OrderingMismatch { .. }
            | UnfoldError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        UnfoldError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadingFault / InvalidReading – one flagged measurement entry
// ---------------------------------------------------------------------------

/// Why a detector produced no usable measurement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingFault {
    #[error("no spectrum recorded")]
    Missing,
    #[error(transparent)]
    Fit(#[from] FitFailure),
    #[error("invalid saturation activity {0}")]
    InvalidActivity(f64),
}

/// A measurement entry that could not be produced, kept so that every
/// failure of a run is reported together.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidReading {
    pub detector: DetectorId,
    pub fault: ReadingFault,
}

impl InvalidReading {
    pub fn fit_failure(&self) -> Option<&FitFailure> {
        match &self.fault {
            ReadingFault::Fit(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for InvalidReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.detector, self.fault)
    }
}

fn join_readings(readings: &[InvalidReading]) -> String {
    readings
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
