// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sideband rejection ratio (SRR) curves.

Tones are only injected into a sparse set of test channels. The signal and
image powers measured there are each linearly interpolated onto every channel
of the spectrometer, and the SRR is their ratio. Outside of the swept range the
nearest measured value is used.
 */


use crate::{
    math::{db, interp},
    spectrometer::{ConfigurationError, FrequencyGrid},
    sweep::{Sideband, SweepSample},
};

/// The SRR over every channel of a spectrometer, from a sweep with the tone in
/// one sideband.
#[derive(Debug, Clone, PartialEq)]
pub struct SrrCurve {
    /// The sideband the tone was injected into (the signal sideband).
    pub tone: Sideband,

    /// The IF of every channel \[MHz\].
    pub freqs_mhz: Vec<f64>,

    /// Interpolated signal power per channel.
    pub signal: Vec<f64>,

    /// Interpolated image power per channel.
    pub image: Vec<f64>,

    /// Linear signal-to-image ratio per channel. An image power of zero gives
    /// +inf.
    pub ratio: Vec<f64>,
}

/// The smallest, mean and largest SRR of a curve \[dB\].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrrSummary {
    pub min_db: f64,
    pub mean_db: f64,
    pub max_db: f64,
}

impl SrrCurve {
    /// Interpolate sweep samples onto `grid` and take the ratio. The samples'
    /// IFs must be strictly increasing.
    pub fn compute(
        grid: &FrequencyGrid,
        samples: &[SweepSample],
        tone: Sideband,
    ) -> Result<SrrCurve, ConfigurationError> {
        if samples.is_empty() {
            return Err(ConfigurationError::NoTestChannels);
        }
        for pair in samples.windows(2) {
            if pair[1].if_mhz <= pair[0].if_mhz {
                return Err(ConfigurationError::NonMonotonicTestChannels {
                    prev: pair[0].channel,
                    next: pair[1].channel,
                });
            }
        }

        let xp: Vec<f64> = samples.iter().map(|s| s.if_mhz).collect();
        let signal_p: Vec<f64> = samples.iter().map(|s| s.signal(tone)).collect();
        let image_p: Vec<f64> = samples.iter().map(|s| s.image(tone)).collect();
        let signal = interp(grid.freqs_mhz(), &xp, &signal_p);
        let image = interp(grid.freqs_mhz(), &xp, &image_p);
        let ratio = signal
            .iter()
            .zip(image.iter())
            .map(|(&s, &i)| ratio(s, i))
            .collect();

        Ok(SrrCurve {
            tone,
            freqs_mhz: grid.freqs_mhz().to_vec(),
            signal,
            image,
            ratio,
        })
    }

    /// The SRR of each channel \[dB\].
    pub fn db(&self) -> Vec<f64> {
        self.ratio.iter().map(|&r| db(r)).collect()
    }

    /// Summarise the curve. NaN values (channels where neither sideband saw
    /// any power) are ignored entirely, and infinite values (no measurable
    /// image) are left out of the mean; if every value is infinite, so is the
    /// mean. With nothing but NaNs, the whole summary is NaN.
    pub fn summary(&self) -> SrrSummary {
        let db: Vec<f64> = self.db().into_iter().filter(|v| !v.is_nan()).collect();
        if db.is_empty() {
            return SrrSummary {
                min_db: f64::NAN,
                mean_db: f64::NAN,
                max_db: f64::NAN,
            };
        }
        let min_db = db.iter().copied().fold(f64::INFINITY, f64::min);
        let max_db = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let finite: Vec<f64> = db.into_iter().filter(|v| v.is_finite()).collect();
        let mean_db = if finite.is_empty() {
            max_db
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        SrrSummary {
            min_db,
            mean_db,
            max_db,
        }
    }
}

/// The linear SRR of a pair of powers. No image is an unbounded rejection,
/// not an error, but with no signal either there is nothing to compare and
/// the SRR is NaN.
pub fn ratio(signal: f64, image: f64) -> f64 {
    if image <= 0.0 {
        if signal <= 0.0 {
            f64::NAN
        } else {
            f64::INFINITY
        }
    } else {
        signal / image
    }
}

/// The SRR at each swept test channel \[dB\], without any interpolation.
pub fn sample_srr_db(samples: &[SweepSample], tone: Sideband) -> Vec<f64> {
    samples
        .iter()
        .map(|s| db(ratio(s.signal(tone), s.image(tone))))
        .collect()
}
