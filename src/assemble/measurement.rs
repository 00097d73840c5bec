use ndarray::Array1;

use crate::config::ExperimentConstants;
use crate::data::experiment::{FoilExperiment, SphereExperiment};
use crate::data::model::MeasurementVector;
use crate::detector::{DetectorId, DetectorSet};
use crate::error::{InvalidReading, ReadingFault, Result, UnfoldError};
use crate::fit::{FitObserver, FitReport, SpectrumFitter};

// ---------------------------------------------------------------------------
// MeasurementAssembler – normalized detector readings
// ---------------------------------------------------------------------------

/// Measurement vector plus the sphere fits it was built from.
#[derive(Debug, Clone)]
pub struct AssembledMeasurements {
    pub vector: MeasurementVector,
    /// Fit reports of the spheres inside the selection.
    pub fits: Vec<(DetectorId, FitReport)>,
}

pub struct MeasurementAssembler<'a> {
    constants: &'a ExperimentConstants,
    fitter: SpectrumFitter,
}

impl<'a> MeasurementAssembler<'a> {
    pub fn new(constants: &'a ExperimentConstants) -> Self {
        Self {
            constants,
            fitter: SpectrumFitter::new(constants.fit.clone()),
        }
    }

    /// Gather foil activities and sphere rates, scale each to `power_kw`
    /// from its experiment's nominal power, concatenate foil-then-sphere
    /// and keep the entries of `detectors`.
    ///
    /// Every invalid entry inside the selection is reported together.
    pub fn assemble(
        &self,
        detectors: &DetectorSet,
        power_kw: f64,
        foil: &dyn FoilExperiment,
        spheres: &dyn SphereExperiment,
        observer: &mut dyn FitObserver,
    ) -> Result<AssembledMeasurements> {
        let layout = &self.constants.layout;

        let activities = foil.saturation_activities()?;
        if activities.len() != layout.foil_channels as usize {
            return Err(UnfoldError::shape(
                "foil saturation activities",
                layout.foil_channels,
                activities.len(),
            ));
        }
        let foil_scale = power_kw / self.constants.foil_nominal_power_kw;
        let sphere_scale = power_kw / self.constants.sphere_nominal_power_kw;

        let mut entries: Vec<(DetectorId, std::result::Result<f64, ReadingFault>)> =
            Vec::with_capacity(layout.len());
        for (id, activity) in layout.foils().zip(&activities) {
            let value = if activity.is_finite() && *activity >= 0.0 {
                Ok(activity * foil_scale)
            } else {
                Err(ReadingFault::InvalidActivity(*activity))
            };
            entries.push((id, value));
        }

        let readings = spheres.calibrated_rates(&layout.sphere_sizes, &self.fitter, observer);
        if readings.len() != layout.sphere_sizes.len() {
            return Err(UnfoldError::shape(
                "sphere calibrated rates",
                layout.sphere_sizes.len(),
                readings.len(),
            ));
        }
        let mut fits = Vec::new();
        for (id, reading) in layout.spheres().zip(readings) {
            let value = reading.map(|report| {
                let rate = report.rate * sphere_scale;
                fits.push((id, report));
                rate
            });
            entries.push((id, value));
        }

        let selected = &entries[detectors.range()];
        for (row, ((entry_id, _), set_id)) in selected.iter().zip(detectors.ids()).enumerate() {
            if entry_id != set_id {
                return Err(UnfoldError::OrderingMismatch {
                    row,
                    response: set_id.to_string(),
                    measurement: entry_id.to_string(),
                });
            }
        }

        let invalid: Vec<InvalidReading> = selected
            .iter()
            .filter_map(|(id, value)| {
                value.as_ref().err().map(|fault| InvalidReading {
                    detector: *id,
                    fault: fault.clone(),
                })
            })
            .collect();
        if !invalid.is_empty() {
            for reading in &invalid {
                log::error!("Invalid measurement {reading}");
            }
            return Err(UnfoldError::InvalidMeasurements(invalid));
        }

        let values: Array1<f64> = selected
            .iter()
            .filter_map(|(_, value)| value.as_ref().ok().copied())
            .collect();
        fits.retain(|(id, _)| detectors.ids().contains(id));

        Ok(AssembledMeasurements {
            vector: MeasurementVector {
                detectors: detectors.ids().to_vec(),
                values,
            },
            fits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSource;
    use crate::data::experiment::{SphereReading, SphereSpectra, TabulatedFoilData};
    use crate::data::model::RawSpectrum;
    use crate::error::ErrorKind;
    use crate::fit::{FitFailure, NoopObserver};
    use crate::testing;
    use approx::assert_relative_eq;

    fn assemble(source: DataSource, power_kw: f64) -> Result<AssembledMeasurements> {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let set = constants.layout.select(source);
        assembler.assemble(
            &set,
            power_kw,
            &testing::foil_data(),
            &testing::sphere_spectra(),
            &mut NoopObserver,
        )
    }

    #[test]
    fn selection_slices_foil_then_sphere() {
        let foil = assemble(DataSource::Foil, 1e5).unwrap().vector;
        let sphere = assemble(DataSource::Sphere, 1e5).unwrap().vector;
        let combined = assemble(DataSource::Combined, 1e5).unwrap().vector;

        assert_eq!(foil.len(), 9);
        assert_eq!(sphere.len(), 7);
        assert_eq!(combined.len(), 16);
        assert_eq!(combined.values.slice(ndarray::s![..9]), foil.values);
        assert_eq!(combined.values.slice(ndarray::s![9..]), sphere.values);
    }

    #[test]
    fn entries_are_normalized_to_the_requested_power() {
        let foil = testing::foil_data();
        let measured = assemble(DataSource::Foil, 1e5).unwrap().vector;
        // Foils were measured at 1e5 kW: unchanged.
        for (got, want) in measured.values.iter().zip(&foil.activities) {
            assert_relative_eq!(*got, *want, max_relative = 1e-12);
        }

        // Spheres were measured at 1e3 kW: scaled by 100.
        let sphere = assemble(DataSource::Sphere, 1e5).unwrap().vector;
        let expected = testing::expected_sphere_rate(5) * 100.0;
        assert_relative_eq!(sphere.values[3], expected, max_relative = 1e-3);
    }

    #[test]
    fn entries_scale_linearly_with_power() {
        for source in [DataSource::Foil, DataSource::Sphere, DataSource::Combined] {
            let base = assemble(source, 1e5).unwrap().vector;
            let doubled = assemble(source, 2e5).unwrap().vector;
            for (a, b) in base.values.iter().zip(doubled.values.iter()) {
                assert_relative_eq!(b / a, 2.0, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn fits_are_kept_only_for_selected_spheres() {
        assert!(assemble(DataSource::Foil, 1e5).unwrap().fits.is_empty());
        let sphere = assemble(DataSource::Sphere, 1e5).unwrap();
        assert_eq!(sphere.fits.len(), 7);
        assert_eq!(sphere.fits[0].0, DetectorId::Sphere(0));
    }

    #[test]
    fn failed_fits_are_collected_and_fail_the_run() {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let mut spheres = testing::sphere_spectra();
        // Too short to reach the fit window.
        spheres.insert(3, RawSpectrum::new(vec![10; 300], 100.0).unwrap());
        spheres.insert(10, RawSpectrum::new(vec![10; 300], 100.0).unwrap());

        let err = assembler
            .assemble(
                &constants.layout.select(DataSource::Combined),
                1e5,
                &testing::foil_data(),
                &spheres,
                &mut NoopObserver,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitDivergence);
        match err {
            UnfoldError::InvalidMeasurements(invalid) => {
                let detectors: Vec<DetectorId> = invalid.iter().map(|r| r.detector).collect();
                assert_eq!(detectors, [DetectorId::Sphere(3), DetectorId::Sphere(10)]);
                assert!(invalid.iter().all(|r| matches!(
                    r.fit_failure(),
                    Some(FitFailure::WindowTooSmall { channels: 0, .. })
                )));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_spheres_are_collected_as_input_problems() {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let mut spheres = SphereSpectra::default();
        spheres.insert(2, testing::sphere_spectrum(5.0e4, 100.0));

        let err = assembler
            .assemble(
                &constants.layout.select(DataSource::Sphere),
                1e5,
                &testing::foil_data(),
                &spheres,
                &mut NoopObserver,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        match err {
            UnfoldError::InvalidMeasurements(invalid) => {
                let names: Vec<String> = invalid.iter().map(|r| r.detector.to_string()).collect();
                assert_eq!(names, ["bs0-1", "bs3-1", "bs5-1", "bs8-1", "bs10-1", "bs12-1"]);
                assert!(invalid.iter().all(|r| r.fault == ReadingFault::Missing));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn bad_foil_activity_is_not_a_fit_failure() {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let mut foil = testing::foil_data();
        foil.activities[4] = f64::NAN;
        foil.activities[6] = -2.0;

        let err = assembler
            .assemble(
                &constants.layout.select(DataSource::Foil),
                1e5,
                &foil,
                &testing::sphere_spectra(),
                &mut NoopObserver,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        match err {
            UnfoldError::InvalidMeasurements(invalid) => {
                assert_eq!(invalid.len(), 2);
                assert_eq!(invalid[0].detector, DetectorId::Foil(4));
                assert!(matches!(invalid[0].fault, ReadingFault::InvalidActivity(a) if a.is_nan()));
                assert_eq!(invalid[1].fault, ReadingFault::InvalidActivity(-2.0));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn extra_sphere_readings_are_a_shape_mismatch() {
        struct TooMany;
        impl SphereExperiment for TooMany {
            fn calibrated_rates(
                &self,
                sizes: &[u8],
                _fitter: &SpectrumFitter,
                _observer: &mut dyn FitObserver,
            ) -> Vec<SphereReading> {
                vec![Err(ReadingFault::Missing); sizes.len() + 1]
            }
        }

        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let err = assembler
            .assemble(
                &constants.layout.select(DataSource::Foil),
                1e5,
                &testing::foil_data(),
                &TooMany,
                &mut NoopObserver,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            UnfoldError::ShapeMismatch { context: "sphere calibrated rates", .. }
        ));
    }

    #[test]
    fn sphere_failures_do_not_affect_foil_runs() {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let measured = assembler
            .assemble(
                &constants.layout.select(DataSource::Foil),
                1e5,
                &testing::foil_data(),
                &SphereSpectra::default(),
                &mut NoopObserver,
            )
            .unwrap();
        assert_eq!(measured.vector.len(), 9);
    }

    #[test]
    fn wrong_foil_count_is_a_shape_mismatch() {
        let constants = testing::constants();
        let assembler = MeasurementAssembler::new(&constants);
        let foil = TabulatedFoilData {
            activities: vec![1.0; 8],
        };
        let err = assembler
            .assemble(
                &constants.layout.select(DataSource::Foil),
                1e5,
                &foil,
                &testing::sphere_spectra(),
                &mut NoopObserver,
            )
            .unwrap_err();
        assert!(matches!(err, UnfoldError::ShapeMismatch { .. }));
    }
}
