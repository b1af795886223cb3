// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with calibration constants.

use std::path::PathBuf;

use thiserror::Error;

use crate::instrument::InstrumentError;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Cannot derive the {constant} constant for channel {channel}: |{denominator}| = {value:e} is below the threshold {epsilon:e} ({num_bad} channel(s) affected)")]
    NearZeroDenominator {
        /// Which constant array ("USB" or "LSB").
        constant: &'static str,
        /// The name of the auto-power used as the denominator.
        denominator: &'static str,
        /// The first offending channel.
        channel: usize,
        value: f64,
        epsilon: f64,
        num_bad: usize,
    },

    #[error("The {constant} constant for channel {channel} is not finite ({value}); the calibration data is invalid")]
    NonFinite {
        constant: &'static str,
        channel: usize,
        value: crate::c64,
    },

    #[error("Calibration array '{what}' has {got} channels, but {expected} were expected")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Calibration data has no channels")]
    Empty,

    #[error(transparent)]
    Store(#[from] CalibrationStoreError),

    #[error("Couldn't load constants into the FPGA: {0}")]
    Instrument(#[from] InstrumentError),
}

#[derive(Error, Debug)]
pub enum CalibrationStoreError {
    #[error("No calibration data for session '{0}'")]
    Missing(String),

    #[error("Couldn't decode calibration data in {file}: {err}")]
    Decode { file: PathBuf, err: String },

    #[error("Couldn't encode calibration data for session '{key}': {err}")]
    Encode { key: String, err: String },

    #[error("IO error on {file}: {err}")]
    IO {
        file: PathBuf,
        #[source]
        err: std::io::Error,
    },
}
