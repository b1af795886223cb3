// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Measure the SRR of a receiver.

use std::path::PathBuf;

use log::info;
use thiserror::Error;

use super::SimulatedHardware;
use crate::{
    calibration::{CalibrationStore, DirectoryStore},
    measure::{run_measurement, MeasureError, MeasurementPlan, MeasurementResults, MeasurementSettings},
    results::{ResultError, ResultSink, TextResultWriter},
    sweep::{LogObserver, ProgressObserver, SweepObserver},
};

/// Parameters needed to do a measurement run.
pub(crate) struct MeasureParams {
    pub(crate) plan: MeasurementPlan,

    pub(crate) settings: MeasurementSettings,

    /// Calibration data, if constants are loaded per LO setting.
    pub(crate) store: Option<DirectoryStore>,

    /// Where the results go.
    pub(crate) output_dir: PathBuf,

    pub(crate) hardware: SimulatedHardware,
}

#[derive(Error, Debug)]
pub(crate) enum MeasureRunError {
    #[error(transparent)]
    Measure(#[from] MeasureError),

    #[error(transparent)]
    Results(#[from] ResultError),
}

impl MeasureParams {
    /// Measure every LO setting and write out the results. LO settings that
    /// failed are in the returned results; their partial samples have been
    /// written out.
    pub(crate) fn run(&self) -> Result<MeasurementResults, MeasureRunError> {
        let MeasureParams {
            plan,
            settings,
            store,
            output_dir,
            hardware,
        } = self;

        let (_receiver, mut ctx) = hardware.connect(
            settings.spectrometer,
            settings.sweep.layout.clone(),
            settings.consts_format,
            plan.is_multi(),
        );

        let mut log_observer = LogObserver;
        let mut progress = ProgressObserver::new();
        let mut observers: [&mut dyn SweepObserver; 2] = [&mut log_observer, &mut progress];
        let results = run_measurement(
            &mut ctx,
            plan,
            settings,
            store.as_ref().map(|s| s as &dyn CalibrationStore),
            &mut observers,
        )?;

        let mut writer = TextResultWriter::new(output_dir, &settings.spectrometer);
        for outcome in &results.outcomes {
            match outcome {
                Ok(m) => writer.measurement(m)?,
                Err(f) => writer.failure(f)?,
            }
        }
        info!("Results are in {}", output_dir.display());

        Ok(results)
    }
}
