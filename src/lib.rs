//! Neutron spectrum unfolding from activation-foil and Bonner-sphere
//! measurements.
//!
//! ```text
//!  RunConfig ──► detector selection ──┬──► ResponseAssembler ──► R, edges, default spectrum
//!                                     └──► MeasurementAssembler ─► N  (sphere peaks fitted)
//!                                                   │
//!                                                   ▼
//!                                  UnfoldingAlgorithm (Gravel | MLEM) ──► UnfoldReport
//! ```

pub mod assemble;
pub mod config;
pub mod data;
pub mod detector;
pub mod error;
pub mod fit;
pub mod pipeline;
pub mod report;
pub mod unfold;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DataSource, ExperimentConstants, RunConfig, SolverParams, UnfoldMethod};
pub use error::{ErrorKind, Result, UnfoldError};
pub use pipeline::{default_batch, BatchReport, UnfoldReport, Unfolder};
