use ndarray::{s, Array1, Array2, Array4, ArrayView1, Axis};

use crate::config::ExperimentConstants;
use crate::data::catalog::ResponseCatalog;
use crate::data::flux::FluxLookup;
use crate::data::model::{DefaultSpectrum, ResponseMatrix};
use crate::detector::DetectorSet;
use crate::error::{Result, UnfoldError};

// ---------------------------------------------------------------------------
// ResponseAssembler – response matrix and default spectrum
// ---------------------------------------------------------------------------

pub struct ResponseAssembler<'a> {
    catalog: &'a dyn ResponseCatalog,
    flux: &'a dyn FluxLookup,
    constants: &'a ExperimentConstants,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(
        catalog: &'a dyn ResponseCatalog,
        flux: &'a dyn FluxLookup,
        constants: &'a ExperimentConstants,
    ) -> Self {
        Self {
            catalog,
            flux,
            constants,
        }
    }

    /// Stack the response functions of `detectors` into a matrix, one row
    /// per detector in set order. Every response must share the bin edges
    /// of the first one.
    pub fn response_matrix(&self, detectors: &DetectorSet) -> Result<ResponseMatrix> {
        let Some(first) = detectors.ids().first() else {
            return Err(UnfoldError::Configuration("no detectors selected".into()));
        };
        let reference_key = first.catalog_key();
        let reference = self.lookup(&reference_key)?;
        let edges = reference.edges.clone();
        let mut matrix = Array2::zeros((detectors.len(), reference.n_bins()));

        for (row, id) in detectors.ids().iter().enumerate() {
            let key = id.catalog_key();
            let response = self.lookup(&key)?;
            if response.edges != edges {
                return Err(UnfoldError::BinEdgeMismatch {
                    reference: reference_key,
                    detector: key,
                    expected: edges,
                    actual: response.edges.clone(),
                });
            }
            matrix
                .row_mut(row)
                .assign(&ArrayView1::from(response.values.as_slice()));
        }

        log::debug!(
            "Response matrix {}x{} ({}) for {:?}",
            matrix.nrows(),
            matrix.ncols(),
            detectors.source(),
            detectors.catalog_keys()
        );

        Ok(ResponseMatrix {
            detectors: detectors.ids().to_vec(),
            matrix,
            edges,
        })
    }

    /// Energy-dependent default spectrum at `power_kw`, reduced from the
    /// simulated flux tensor. Must have `n_bins` entries.
    pub fn default_spectrum(&self, power_kw: f64, n_bins: usize) -> Result<DefaultSpectrum> {
        let tensor = self.flux.flux(&self.constants.particle, power_kw)?;
        let profile = energy_profile(
            &tensor,
            self.constants.skip_angular_groups,
            self.constants.skip_energy_groups,
            self.constants.flux_quantity,
        )?;
        if profile.len() != n_bins {
            return Err(UnfoldError::shape(
                "default spectrum",
                format!("{n_bins} energy bins"),
                format!("{} energy bins", profile.len()),
            ));
        }
        DefaultSpectrum::new(profile)
    }

    /// Responses predicted by folding the default spectrum at `power_kw`
    /// through the selected response functions.
    pub fn fold_default(&self, detectors: &DetectorSet, power_kw: f64) -> Result<Array1<f64>> {
        let responses = self.response_matrix(detectors)?;
        let ds = self.default_spectrum(power_kw, responses.n_bins())?;
        responses.fold(ds.values.view())
    }

    fn lookup(&self, key: &str) -> Result<&'a crate::data::model::ResponseFunction> {
        let response = self
            .catalog
            .lookup(key)
            .ok_or_else(|| UnfoldError::MissingResponse(key.to_string()))?;
        response.validate(key)?;
        Ok(response)
    }
}

/// Sum a `[particle, angular, energy, quantity]` tensor down to its energy
/// axis, dropping the leading angular and energy groups.
pub fn energy_profile(
    tensor: &Array4<f64>,
    skip_angular: usize,
    skip_energy: usize,
    quantity: usize,
) -> Result<Array1<f64>> {
    let (_, n_angular, n_energy, n_quantity) = tensor.dim();
    if quantity >= n_quantity || skip_angular >= n_angular || skip_energy >= n_energy {
        return Err(UnfoldError::shape(
            "flux tensor",
            format!(
                "more than {skip_angular} angular groups, {skip_energy} energy groups \
                 and {quantity} quantities"
            ),
            format!("{:?}", tensor.dim()),
        ));
    }
    let values = tensor.index_axis(Axis(3), quantity);
    let kept = values.slice(s![.., skip_angular.., skip_energy..]);
    Ok(kept.sum_axis(Axis(0)).sum_axis(Axis(0)))
}
