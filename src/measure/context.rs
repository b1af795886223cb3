// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Exclusive ownership of the hardware for the duration of a run.

use log::{debug, warn};

use crate::{
    instrument::{Fpga, FpgaLayout, InstrumentError, SignalGenerator},
    spectrometer::SpectrometerConfig,
};

/// Generator settings applied before anything is measured.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// \[dBm\]
    pub rf_power_dbm: f64,

    /// \[dBm\]
    pub lo1_power_dbm: Option<f64>,

    /// \[dBm\]
    pub lo2_power_dbm: Option<f64>,

    /// The frequency multiplier in front of the RF generator, if any.
    pub rf_multiplier: Option<f64>,

    /// The frequency multiplier in front of the LO1 generator, if any.
    pub lo1_multiplier: Option<f64>,
}

/// The hardware used by a run. Only one of these should exist per set of
/// instruments. Every generator output that was switched on is switched off
/// again when this is dropped, if [`RunContext::outputs_off`] hasn't already
/// done so.
pub struct RunContext {
    pub fpga: Box<dyn Fpga>,
    pub rf: Box<dyn SignalGenerator>,
    pub lo1: Option<Box<dyn SignalGenerator>>,
    pub lo2: Option<Box<dyn SignalGenerator>>,
    outputs_on: bool,
}

impl RunContext {
    pub fn new(fpga: Box<dyn Fpga>, rf: Box<dyn SignalGenerator>) -> RunContext {
        RunContext {
            fpga,
            rf,
            lo1: None,
            lo2: None,
            outputs_on: false,
        }
    }

    /// Add generators for a two-LO receiver.
    pub fn with_lo_generators(
        mut self,
        lo1: Box<dyn SignalGenerator>,
        lo2: Option<Box<dyn SignalGenerator>>,
    ) -> RunContext {
        self.lo1 = Some(lo1);
        self.lo2 = lo2;
        self
    }

    fn generators(&mut self) -> impl Iterator<Item = &mut Box<dyn SignalGenerator>> {
        std::iter::once(&mut self.rf)
            .chain(self.lo1.as_mut())
            .chain(self.lo2.as_mut())
    }

    /// Configure the spectrometer and generators and switch the generator
    /// outputs on:
    ///
    /// - write the accumulation length;
    /// - reset the counters (1 then 0);
    /// - set the generator powers and multipliers;
    /// - switch the outputs on.
    pub fn prepare(
        &mut self,
        spectrometer: &SpectrometerConfig,
        layout: &FpgaLayout,
        settings: &GeneratorSettings,
    ) -> Result<(), InstrumentError> {
        debug!(
            "Setting {} to {} and resetting {}",
            layout.acc_len_reg, spectrometer.acc_len, layout.cnt_rst_reg
        );
        self.fpga
            .write_register(&layout.acc_len_reg, spectrometer.acc_len)?;
        self.fpga.write_register(&layout.cnt_rst_reg, 1)?;
        self.fpga.write_register(&layout.cnt_rst_reg, 0)?;

        self.rf.set_power(settings.rf_power_dbm)?;
        if let Some(m) = settings.rf_multiplier {
            self.rf.set_multiplier(m)?;
        }
        if let Some(lo1) = self.lo1.as_mut() {
            if let Some(p) = settings.lo1_power_dbm {
                lo1.set_power(p)?;
            }
            if let Some(m) = settings.lo1_multiplier {
                lo1.set_multiplier(m)?;
            }
        }
        if let (Some(lo2), Some(p)) = (self.lo2.as_mut(), settings.lo2_power_dbm) {
            lo2.set_power(p)?;
        }

        // From here on, outputs may be on, so they need switching off.
        self.outputs_on = true;
        for generator in self.generators() {
            debug!("Switching on {}", generator.name());
            generator.set_output(true)?;
        }
        for generator in self.generators() {
            generator.operation_complete()?;
        }
        Ok(())
    }

    /// Switch off every generator output. Every generator is tried even if
    /// one fails; the first failure is returned.
    pub fn outputs_off(&mut self) -> Result<(), InstrumentError> {
        let mut first_err = None;
        for generator in self.generators() {
            debug!("Switching off {}", generator.name());
            if let Err(e) = generator.set_output(false) {
                warn!("Couldn't switch off {}: {e}", generator.name());
                first_err.get_or_insert(e);
            }
        }
        self.outputs_on = false;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn outputs_are_on(&self) -> bool {
        self.outputs_on
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.outputs_on {
            // Errors have already been logged.
            let _ = self.outputs_off();
        }
    }
}
