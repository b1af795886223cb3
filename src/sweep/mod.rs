// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Tone sweeps.

A tone sweep steps the RF generator through each test channel of one sideband.
For every test channel the sweep:

1. retunes the generator, and waits for it to confirm that it's done so;
2. waits for the spectrometer to flush out accumulations containing the old
   tone;
3. reads the USB and LSB output spectra (from the same accumulation); and
4. records the powers at the test channel.

Nothing is retried. If the generator or FPGA fails, the sweep stops and the
samples recorded so far are handed back with the error.
 */

mod error;
mod observer;
#[cfg(test)]
mod tests;

pub use error::SweepAborted;
pub use observer::{LogObserver, ProgressObserver, SweepObserver, SweepUpdate};

use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    instrument::{Fpga, FpgaLayout, FreqUnit, InstrumentError, SignalGenerator, Spectra},
    measure::LoSetting,
    spectrometer::{ConfigurationError, FrequencyGrid, SpectrometerConfig, TestChannels},
    srr,
};

/// One of the two RF sidebands around the LO.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum Sideband {
    /// Upper sideband (RF above the LO).
    #[strum(serialize = "USB")]
    #[serde(rename = "usb")]
    Usb,

    /// Lower sideband (RF below the LO).
    #[strum(serialize = "LSB")]
    #[serde(rename = "lsb")]
    Lsb,
}

impl Sideband {
    /// The opposite sideband.
    pub fn other(self) -> Sideband {
        match self {
            Sideband::Usb => Sideband::Lsb,
            Sideband::Lsb => Sideband::Usb,
        }
    }
}

/// The USB and LSB output powers of one channel, read together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPair {
    pub usb: f64,
    pub lsb: f64,
}

impl PowerPair {
    pub fn get(&self, sideband: Sideband) -> f64 {
        match sideband {
            Sideband::Usb => self.usb,
            Sideband::Lsb => self.lsb,
        }
    }
}

/// The powers measured with a tone in one test channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSample {
    pub channel: usize,

    /// The IF of the test channel \[MHz\].
    pub if_mhz: f64,

    /// The frequency of the injected tone \[GHz\].
    pub rf_ghz: f64,

    pub power: PowerPair,
}

impl SweepSample {
    /// The power in the sideband the tone was injected into.
    pub fn signal(&self, tone: Sideband) -> f64 {
        self.power.get(tone)
    }

    /// The power leaking into the other sideband.
    pub fn image(&self, tone: Sideband) -> f64 {
        self.power.get(tone.other())
    }
}

/// Everything about a sweep that doesn't change between LO settings.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub grid: FrequencyGrid,
    pub channels: TestChannels,
    pub settle: Duration,
    pub layout: FpgaLayout,
    pub bram_addr_width: u32,
}

impl SweepConfig {
    /// Validate everything up front. A settle time shorter than the
    /// spectrometer's latency is an error unless `allow_short_settle` is set.
    pub fn new(
        spectrometer: &SpectrometerConfig,
        layout: FpgaLayout,
        channels: TestChannels,
        settle: Duration,
        allow_short_settle: bool,
    ) -> Result<SweepConfig, ConfigurationError> {
        let grid = spectrometer.grid()?;
        // Re-check the channels against this grid.
        let channels = TestChannels::from_list(grid.len(), channels.channels().to_vec())?;
        spectrometer.check_settle_time(settle, allow_short_settle)?;
        if layout.usb_power_brams.len() != spectrometer.num_brams {
            return Err(ConfigurationError::LengthMismatch {
                what: "USB power brams",
                expected: spectrometer.num_brams,
                got: layout.usb_power_brams.len(),
            });
        }
        if layout.lsb_power_brams.len() != spectrometer.num_brams {
            return Err(ConfigurationError::LengthMismatch {
                what: "LSB power brams",
                expected: spectrometer.num_brams,
                got: layout.lsb_power_brams.len(),
            });
        }
        Ok(SweepConfig {
            grid,
            channels,
            settle,
            layout,
            bram_addr_width: spectrometer.bram_addr_width,
        })
    }
}

/// Where a sweep is up to. `index` is the position in the test channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    SettingFrequency { index: usize },
    Settling { index: usize },
    Reading { index: usize },
    Recorded { index: usize },
    Done,
}

/// A single sweep over the test channels with the tone in one sideband.
pub struct ToneSweep<'a> {
    rf: &'a mut dyn SignalGenerator,
    fpga: &'a mut dyn Fpga,
    config: &'a SweepConfig,
    lo: LoSetting,
    tone: Sideband,
    observers: Vec<Box<dyn SweepObserver + 'a>>,

    state: SweepState,
    samples: Vec<SweepSample>,
    srr_db: Vec<f64>,
    /// The sample and spectra read but not yet recorded.
    pending: Option<(SweepSample, Spectra)>,
}

impl<'a> ToneSweep<'a> {
    pub fn new(
        rf: &'a mut dyn SignalGenerator,
        fpga: &'a mut dyn Fpga,
        config: &'a SweepConfig,
        lo: LoSetting,
        tone: Sideband,
    ) -> ToneSweep<'a> {
        ToneSweep {
            rf,
            fpga,
            config,
            lo,
            tone,
            observers: vec![],
            state: SweepState::Idle,
            samples: Vec::with_capacity(config.channels.len()),
            srr_db: Vec::with_capacity(config.channels.len()),
            pending: None,
        }
    }

    /// Have `observer` told about every recorded sample.
    pub fn with_observer<O: SweepObserver + 'a>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn samples(&self) -> &[SweepSample] {
        &self.samples
    }

    fn channel(&self, index: usize) -> usize {
        self.config.channels.channels()[index]
    }

    fn if_mhz(&self, index: usize) -> f64 {
        // Test channels were validated against this grid.
        self.config.grid.freqs_mhz()[self.channel(index)]
    }

    fn next_state(&self, index: usize) -> SweepState {
        if index < self.config.channels.len() {
            SweepState::SettingFrequency { index }
        } else {
            SweepState::Done
        }
    }

    /// Do the work of the current state and move to the next one. On an
    /// error the state is left unchanged.
    pub fn step(&mut self) -> Result<SweepState, InstrumentError> {
        let next = match self.state {
            SweepState::Idle => {
                debug!(
                    "Starting {} sweep over {} test channels ({})",
                    self.tone,
                    self.config.channels.len(),
                    self.lo
                );
                for o in self.observers.iter_mut() {
                    o.started(self.tone, &self.lo, self.config.channels.len());
                }
                self.next_state(0)
            }

            SweepState::SettingFrequency { index } => {
                let rf_ghz = self.lo.rf_ghz(self.tone, self.if_mhz(index));
                trace!(
                    "Channel {}: setting RF to {rf_ghz} GHz",
                    self.channel(index)
                );
                self.rf.set_frequency(rf_ghz, FreqUnit::GHz)?;
                SweepState::Settling { index }
            }

            SweepState::Settling { index } => {
                std::thread::sleep(self.config.settle);
                SweepState::Reading { index }
            }

            SweepState::Reading { index } => {
                let spectra = Spectra::read(
                    &mut *self.fpga,
                    &self.config.layout,
                    self.config.bram_addr_width,
                )?;
                let channel = self.channel(index);
                let if_mhz = self.if_mhz(index);
                let (usb, lsb) = match (spectra.usb.get(channel), spectra.lsb.get(channel)) {
                    (Some(&usb), Some(&lsb)) => (usb, lsb),
                    _ => {
                        return Err(InstrumentError::BadBlockSize {
                            name: "spectra".to_string(),
                            expected: self.config.grid.len(),
                            got: spectra.usb.len().min(spectra.lsb.len()),
                        })
                    }
                };
                let sample = SweepSample {
                    channel,
                    if_mhz,
                    rf_ghz: self.lo.rf_ghz(self.tone, if_mhz),
                    power: PowerPair { usb, lsb },
                };
                self.pending = Some((sample, spectra));
                SweepState::Recorded { index }
            }

            SweepState::Recorded { index } => {
                if let Some((sample, spectra)) = self.pending.take() {
                    let srr = srr::sample_srr_db(std::slice::from_ref(&sample), self.tone);
                    self.srr_db.extend(srr);
                    self.samples.push(sample);
                    let update = SweepUpdate {
                        tone: self.tone,
                        lo: &self.lo,
                        index,
                        total: self.config.channels.len(),
                        sample: &self.samples[self.samples.len() - 1],
                        spectra: &spectra,
                        srr_db: &self.srr_db,
                    };
                    for o in self.observers.iter_mut() {
                        o.recorded(&update);
                    }
                }
                let next = self.next_state(index + 1);
                if next == SweepState::Done {
                    for o in self.observers.iter_mut() {
                        o.finished(self.tone, self.samples.len(), true);
                    }
                }
                next
            }

            SweepState::Done => SweepState::Done,
        };
        self.state = next;
        Ok(next)
    }

    /// Step until every test channel is done or something fails.
    pub fn run(mut self) -> Result<Vec<SweepSample>, SweepAborted> {
        loop {
            match self.step() {
                Ok(SweepState::Done) => return Ok(self.samples),
                Ok(_) => (),
                Err(error) => {
                    let index = match self.state {
                        SweepState::SettingFrequency { index }
                        | SweepState::Settling { index }
                        | SweepState::Reading { index }
                        | SweepState::Recorded { index } => index,
                        SweepState::Idle | SweepState::Done => 0,
                    };
                    for o in self.observers.iter_mut() {
                        o.finished(self.tone, self.samples.len(), false);
                    }
                    return Err(SweepAborted {
                        tone: self.tone,
                        channel: self.channel(index),
                        samples: self.samples,
                        error,
                    });
                }
            }
        }
    }
}
