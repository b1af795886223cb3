// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The FPGA spectrometer's frequency setup.

Everything here is validated up front; a [`ConfigurationError`] means that no
hardware has been touched.
 */

mod error;
#[cfg(test)]
mod tests;

pub use error::ConfigurationError;

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::constants::*;

/// The static configuration of the spectrometer model loaded on the FPGA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrometerConfig {
    /// The bandwidth of the spectrometer \[MHz\].
    pub bandwidth_mhz: f64,

    /// The address width of each bram holding spectral data \[bits\].
    pub bram_addr_width: u32,

    /// The number of brams a spectrum is interleaved across.
    pub num_brams: usize,

    /// The number of spectra accumulated per readout.
    pub acc_len: u32,

    /// The number of bits of the ADCs.
    pub adc_bits: u32,
}

impl Default for SpectrometerConfig {
    fn default() -> Self {
        Self {
            bandwidth_mhz: DEFAULT_BANDWIDTH_MHZ,
            bram_addr_width: DEFAULT_BRAM_ADDR_WIDTH,
            num_brams: DEFAULT_NUM_BRAMS,
            acc_len: DEFAULT_ACC_LEN,
            adc_bits: DEFAULT_ADC_BITS,
        }
    }
}

impl SpectrometerConfig {
    /// Check that the configuration describes a usable spectrometer.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.bandwidth_mhz.is_finite() && self.bandwidth_mhz > 0.0) {
            return Err(ConfigurationError::BadBandwidth(self.bandwidth_mhz));
        }
        if self.bram_addr_width == 0 || self.bram_addr_width > MAX_BRAM_ADDR_WIDTH {
            return Err(ConfigurationError::BadBramAddrWidth {
                got: self.bram_addr_width,
                max: MAX_BRAM_ADDR_WIDTH,
            });
        }
        if self.num_brams == 0 {
            return Err(ConfigurationError::EmptyGrid);
        }
        if self.acc_len == 0 {
            return Err(ConfigurationError::ZeroAccLen);
        }
        Ok(())
    }

    /// The number of words in each spectrometer bram. Only meaningful for a
    /// validated configuration.
    pub fn words_per_bram(&self) -> usize {
        1 << self.bram_addr_width
    }

    /// The total number of frequency channels.
    pub fn nchannels(&self) -> usize {
        self.words_per_bram() * self.num_brams
    }

    /// The size of the FFT feeding the spectrometer (real input, so twice the
    /// number of channels).
    pub fn fft_size(&self) -> usize {
        2 * self.nchannels()
    }

    /// The full-scale power level of the spectrometer \[dB\].
    pub fn dbfs(&self) -> f64 {
        6.02 * f64::from(self.adc_bits) + 1.76 + 10.0 * (self.nchannels() as f64).log10()
    }

    /// The time between retuning a tone and the spectrometer producing an
    /// accumulation that doesn't contain the old tone. Reading sooner than
    /// this gives stale data.
    pub fn min_settle_time(&self) -> Duration {
        let bandwidth_hz = self.bandwidth_mhz * 1e6;
        Duration::from_secs_f64(
            self.fft_size() as f64 * f64::from(self.acc_len) * 2.0 / bandwidth_hz,
        )
    }

    /// Check a settle time against [`SpectrometerConfig::min_settle_time`]. If
    /// `allow_short` is true, a short settle time is only warned about.
    pub fn check_settle_time(
        &self,
        settle: Duration,
        allow_short: bool,
    ) -> Result<(), ConfigurationError> {
        let min = self.min_settle_time();
        debug!(
            "Settle time {:.3} s, minimum {:.3} s",
            settle.as_secs_f64(),
            min.as_secs_f64()
        );
        if settle < min {
            if allow_short {
                warn!(
                    "Settle time {:.3} s is shorter than the pipeline latency {:.3} s; measurements may contain stale data",
                    settle.as_secs_f64(),
                    min.as_secs_f64()
                );
            } else {
                return Err(ConfigurationError::SettleTooShort {
                    settle_s: settle.as_secs_f64(),
                    min_s: min.as_secs_f64(),
                });
            }
        }
        Ok(())
    }

    /// Get the IF frequency grid of this spectrometer.
    pub fn grid(&self) -> Result<FrequencyGrid, ConfigurationError> {
        self.validate()?;
        FrequencyGrid::new(self.bandwidth_mhz, self.nchannels())
    }
}

/// The IF frequencies of every spectrometer channel \[MHz\]. Always non-empty
/// and strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    freqs_mhz: Vec1<f64>,
    bandwidth_mhz: f64,
}

impl FrequencyGrid {
    /// Equivalent to `linspace(0, bandwidth, nchannels, endpoint=False)`.
    pub fn new(bandwidth_mhz: f64, nchannels: usize) -> Result<FrequencyGrid, ConfigurationError> {
        if !(bandwidth_mhz.is_finite() && bandwidth_mhz > 0.0) {
            return Err(ConfigurationError::BadBandwidth(bandwidth_mhz));
        }
        let spacing = bandwidth_mhz / nchannels as f64;
        let freqs = (0..nchannels).map(|i| i as f64 * spacing).collect();
        let freqs_mhz = Vec1::try_from_vec(freqs).map_err(|_| ConfigurationError::EmptyGrid)?;
        Ok(FrequencyGrid {
            freqs_mhz,
            bandwidth_mhz,
        })
    }

    pub fn len(&self) -> usize {
        self.freqs_mhz.len()
    }

    // A grid is never empty; this is here to keep clippy happy.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// \[MHz\]
    pub fn spacing_mhz(&self) -> f64 {
        self.bandwidth_mhz / self.len() as f64
    }

    /// \[MHz\]
    pub fn bandwidth_mhz(&self) -> f64 {
        self.bandwidth_mhz
    }

    /// All channel frequencies \[MHz\].
    pub fn freqs_mhz(&self) -> &[f64] {
        &self.freqs_mhz
    }

    /// The frequency of a single channel \[MHz\].
    pub fn freq_mhz(&self, channel: usize) -> Option<f64> {
        self.freqs_mhz.get(channel).copied()
    }
}

/// The subsampled set of channels that test tones are injected into. Always
/// non-empty, strictly increasing and within the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestChannels(Vec1<usize>);

impl TestChannels {
    /// Equivalent to `range(first, nchannels, step)`.
    pub fn from_step(
        nchannels: usize,
        first: usize,
        step: usize,
    ) -> Result<TestChannels, ConfigurationError> {
        if nchannels == 0 {
            return Err(ConfigurationError::EmptyGrid);
        }
        if step == 0 {
            return Err(ConfigurationError::ZeroChannelStep);
        }
        if first >= nchannels {
            return Err(ConfigurationError::TestChannelOutOfRange {
                channel: first,
                nchannels,
            });
        }
        Self::from_list(nchannels, (first..nchannels).step_by(step).collect())
    }

    /// Use an explicit list of test channels.
    pub fn from_list(
        nchannels: usize,
        channels: Vec<usize>,
    ) -> Result<TestChannels, ConfigurationError> {
        let channels =
            Vec1::try_from_vec(channels).map_err(|_| ConfigurationError::NoTestChannels)?;
        for &channel in channels.iter() {
            if channel >= nchannels {
                return Err(ConfigurationError::TestChannelOutOfRange { channel, nchannels });
            }
        }
        for pair in channels.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigurationError::NonMonotonicTestChannels {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(TestChannels(channels))
    }

    pub fn channels(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    // Never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The IF frequencies of the test channels \[MHz\].
    pub fn freqs_mhz(&self, grid: &FrequencyGrid) -> Result<Vec<f64>, ConfigurationError> {
        self.0
            .iter()
            .map(|&channel| {
                grid.freq_mhz(channel)
                    .ok_or(ConfigurationError::TestChannelOutOfRange {
                        channel,
                        nchannels: grid.len(),
                    })
            })
            .collect()
    }
}
