/// Assembly of the three solver inputs.
///
/// ```text
///  ResponseCatalog ─┐                     ┌─ FoilExperiment
///  FluxLookup ──────┤                     ├─ SphereExperiment (+ fitter)
///                   ▼                     ▼
///        ┌────────────────────┐   ┌───────────────────────┐
///        │ ResponseAssembler  │   │ MeasurementAssembler  │
///        └────────────────────┘   └───────────────────────┘
///          R, edges, ds                 N
///                   └──── DetectorSet ───┘   (one shared ordering)
/// ```
pub mod measurement;
pub mod response;

pub use measurement::{AssembledMeasurements, MeasurementAssembler};
pub use response::{energy_profile, ResponseAssembler};

use crate::data::model::{MeasurementVector, ResponseMatrix};
use crate::error::{Result, UnfoldError};

/// Check that the measurement entries correspond one-to-one, in order,
/// with the response matrix rows.
pub fn check_alignment(responses: &ResponseMatrix, measurements: &MeasurementVector) -> Result<()> {
    if responses.detectors.len() != measurements.detectors.len() {
        return Err(UnfoldError::shape(
            "detector alignment",
            format!("{} detectors", responses.detectors.len()),
            format!("{} detectors", measurements.detectors.len()),
        ));
    }
    for (row, (r, n)) in responses
        .detectors
        .iter()
        .zip(&measurements.detectors)
        .enumerate()
    {
        if r != n {
            return Err(UnfoldError::OrderingMismatch {
                row,
                response: r.to_string(),
                measurement: n.to_string(),
            });
        }
    }
    Ok(())
}
