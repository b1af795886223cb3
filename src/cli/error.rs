// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all dss-srr-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::{common::ConstsArgsError, measure::MeasureArgsError};
use crate::{
    calibration::{CalibrationError, CalibrationStoreError},
    instrument::InstrumentError,
    measure::MeasureError,
    params::MeasureRunError,
    results::ResultError,
    spectrometer::ConfigurationError,
};

/// The *only* publicly visible error from dss-srr. Variants carry the rendered
/// message of the underlying error and a hint on where to look.
#[derive(Error, Debug)]
pub enum DssError {
    /// An error with the spectrometer, sweep or LO parameters.
    #[error("{0}\n\nCheck the spectrometer and sweep arguments (see --help).")]
    Configuration(String),

    /// An error deriving, quantizing or loading calibration constants.
    #[error("{0}\n\nCheck the calibration data, or try ideal constants.")]
    Calibration(String),

    /// An error with stored calibration data.
    #[error("{0}\n\nCalibration data is stored as <cal-dir>/<key>/caldata.json.")]
    CalibrationStore(String),

    /// An error talking to the hardware.
    #[error("{0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv).")]
    Instrument(String),

    /// An error related to a measurement run.
    #[error("{0}")]
    Measure(String),

    /// An error writing results.
    #[error("{0}")]
    Results(String),

    /// An error related to argument files.
    #[error("{0}\n\nArguments files are toml or json files with the same layout as --save-toml output.")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

// Binary sub-command errors.

impl From<MeasureArgsError> for DssError {
    fn from(e: MeasureArgsError) -> Self {
        let s = e.to_string();
        match e {
            MeasureArgsError::NoLo
            | MeasureArgsError::SingleAndMultiLo
            | MeasureArgsError::OnlyOneOfLo1Lo2
            | MeasureArgsError::BadLo { .. }
            | MeasureArgsError::BadPower { .. }
            | MeasureArgsError::KeepAndReload => Self::Configuration(s),
            MeasureArgsError::NoHardware => Self::Instrument(s),
        }
    }
}

impl From<ConstsArgsError> for DssError {
    fn from(e: ConstsArgsError) -> Self {
        let s = e.to_string();
        match e {
            ConstsArgsError::BadIdealConsts(_)
            | ConstsArgsError::IdealAndMeasured
            | ConstsArgsError::NoCalDir => Self::Calibration(s),
            ConstsArgsError::Store(e) => Self::from(e),
        }
    }
}

impl From<MeasureRunError> for DssError {
    fn from(e: MeasureRunError) -> Self {
        match e {
            MeasureRunError::Measure(e) => Self::from(e),
            MeasureRunError::Results(e) => Self::from(e),
        }
    }
}

// Library code errors.

impl From<ConfigurationError> for DssError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<CalibrationError> for DssError {
    fn from(e: CalibrationError) -> Self {
        match e {
            CalibrationError::Store(e) => Self::from(e),
            CalibrationError::Instrument(e) => Self::from(e),
            CalibrationError::NearZeroDenominator { .. }
            | CalibrationError::NonFinite { .. }
            | CalibrationError::LengthMismatch { .. }
            | CalibrationError::Empty => Self::Calibration(e.to_string()),
        }
    }
}

impl From<CalibrationStoreError> for DssError {
    fn from(e: CalibrationStoreError) -> Self {
        Self::CalibrationStore(e.to_string())
    }
}

impl From<InstrumentError> for DssError {
    fn from(e: InstrumentError) -> Self {
        Self::Instrument(e.to_string())
    }
}

impl From<MeasureError> for DssError {
    fn from(e: MeasureError) -> Self {
        let s = e.to_string();
        match e {
            MeasureError::Configuration(e) => Self::from(e),
            MeasureError::Calibration(e) => Self::from(e),
            MeasureError::Prepare(_) | MeasureError::Retune { .. } => Self::Instrument(s),
            MeasureError::MissingGenerator(_) | MeasureError::Sweep(_) => Self::Measure(s),
        }
    }
}

impl From<ResultError> for DssError {
    fn from(e: ResultError) -> Self {
        Self::Results(e.to_string())
    }
}

impl From<std::io::Error> for DssError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
