// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from measurement runs.

use thiserror::Error;

use crate::{
    calibration::CalibrationError, instrument::InstrumentError, spectrometer::ConfigurationError,
    sweep::SweepAborted,
};

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("A {0} generator is needed for this measurement, but none was given")]
    MissingGenerator(&'static str),

    #[error("Couldn't prepare the hardware: {0}")]
    Prepare(#[source] InstrumentError),

    #[error("Couldn't retune {generator} to {ghz} GHz: {err}")]
    Retune {
        generator: &'static str,
        ghz: f64,
        #[source]
        err: InstrumentError,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Sweep(#[from] SweepAborted),
}
