// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Calibration and sideband-rejection measurement for FPGA-based digital
sideband-separating (DSS) receivers.
 */

pub mod calibration;
mod cli;
pub mod constants;
pub mod fixed_point;
pub mod instrument;
pub(crate) mod math;
pub mod measure;
pub(crate) mod params;
pub mod results;
pub mod spectrometer;
pub mod srr;
pub mod sweep;

use crossbeam_utils::atomic::AtomicCell;

/// Should progress bars be drawn? This is set by the CLI; library users get no
/// progress bars by default.
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

// Re-exports.
pub use calibration::{
    AutoCrossPowerSet, CalibrationConstants, CalibrationError, ConstantSource,
};
pub use cli::{Dss, DssError};
pub use fixed_point::{FixedPointFormat, QuantizationSaturation, Quantized};
pub use instrument::{Fpga, InstrumentError, SignalGenerator};
pub use measure::{LoSetting, MeasurementPlan, RunContext, SrrMeasurement};
pub use spectrometer::{ConfigurationError, FrequencyGrid, SpectrometerConfig, TestChannels};
pub use srr::SrrCurve;
pub use sweep::{Sideband, SweepAborted, SweepSample};

/// Complex number with double-precision components.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
