// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Derive, quantize and load calibration constants without measuring.

use log::debug;

use super::SimulatedHardware;
use crate::{
    calibration::{CalibrationConstants, CalibrationError, ConstantSource, QuantizedConstants},
    fixed_point::FixedPointFormat,
    instrument::FpgaLayout,
    spectrometer::SpectrometerConfig,
};

pub(crate) struct LoadConstsParams {
    pub(crate) spectrometer: SpectrometerConfig,
    pub(crate) layout: FpgaLayout,
    pub(crate) source: ConstantSource,
    pub(crate) format: FixedPointFormat,
    pub(crate) epsilon: f64,
    pub(crate) warn_saturation: bool,
    pub(crate) hardware: SimulatedHardware,
}

impl LoadConstsParams {
    pub(crate) fn run(&self) -> Result<QuantizedConstants, CalibrationError> {
        let consts = CalibrationConstants::from_source(
            &self.source,
            self.spectrometer.nchannels(),
            self.epsilon,
        )?;

        let (_receiver, mut ctx) =
            self.hardware
                .connect(self.spectrometer, self.layout.clone(), self.format, false);
        let quantized = consts.load(&mut *ctx.fpga, &self.layout, self.format, self.warn_saturation)?;
        for (what, s) in quantized.saturations() {
            debug!(
                "{what}[{}] = {} saturated to {} (word {})",
                s.index, s.value, s.clamped_value, s.clamped_word
            );
        }
        Ok(quantized)
    }
}
