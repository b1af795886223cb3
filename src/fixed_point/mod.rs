// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Conversion of real values into the signed fixed-point words used by the
//! FPGA's constant brams.
//!
//! A word with `nbits` total bits and `binpt` fractional bits represents values
//! in steps of `2^-binpt` between `-2^(nbits-1-binpt)` and
//! `2^(nbits-1-binpt) - 2^-binpt`. Values outside of this range are clamped to
//! the boundary and reported as [`QuantizationSaturation`]s; they never wrap.

#[cfg(test)]
mod tests;

use byteorder::{BigEndian, WriteBytesExt};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{constants::*, spectrometer::ConfigurationError};

/// The layout of a signed fixed-point word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPointFormat {
    nbits: u32,
    binpt: u32,
}

impl Default for FixedPointFormat {
    fn default() -> Self {
        Self {
            nbits: DEFAULT_CONSTS_NBITS,
            binpt: DEFAULT_CONSTS_BINPT,
        }
    }
}

impl FixedPointFormat {
    /// `nbits` must be between 2 and 64 and there must be at least one
    /// non-fractional bit for the sign.
    pub fn new(nbits: u32, binpt: u32) -> Result<FixedPointFormat, ConfigurationError> {
        if !(2..=64).contains(&nbits) || binpt >= nbits {
            return Err(ConfigurationError::BadFixedPointFormat { nbits, binpt });
        }
        Ok(FixedPointFormat { nbits, binpt })
    }

    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    pub fn binpt(&self) -> u32 {
        self.binpt
    }

    /// The smallest representable word.
    pub fn min_word(&self) -> i64 {
        if self.nbits == 64 {
            i64::MIN
        } else {
            -(1 << (self.nbits - 1))
        }
    }

    /// The largest representable word.
    pub fn max_word(&self) -> i64 {
        if self.nbits == 64 {
            i64::MAX
        } else {
            (1 << (self.nbits - 1)) - 1
        }
    }

    /// The value of one least-significant bit.
    pub fn step(&self) -> f64 {
        (-f64::from(self.binpt)).exp2()
    }

    /// The smallest representable value.
    pub fn min_value(&self) -> f64 {
        self.to_float(self.min_word())
    }

    /// The largest representable value.
    pub fn max_value(&self) -> f64 {
        self.to_float(self.max_word())
    }

    /// The value represented by a word.
    pub fn to_float(&self, word: i64) -> f64 {
        word as f64 * self.step()
    }

    /// Quantize a single value, returning the word and whether it was clamped.
    /// NaN is clamped to 0.
    fn quantize_one(&self, value: f64) -> (i64, bool) {
        if value.is_nan() {
            return (0, true);
        }
        let scaled = (value * f64::from(self.binpt).exp2()).round();
        let (min, max) = (self.min_word(), self.max_word());
        // min_word is a power of two and exact as a float, but max_word isn't
        // for 64-bit words; compare against max_word + 1 instead.
        let max_exclusive = f64::from(self.nbits - 1).exp2();
        if scaled < min as f64 {
            (min, true)
        } else if scaled >= max_exclusive {
            (max, true)
        } else {
            // Exactly representable as an i64 because it's within [min, max].
            (scaled as i64, false)
        }
    }

    /// Quantize real values into fixed-point words. Every value that had to be
    /// clamped is listed in the result; if `warn_saturation` is true, each one is
    /// also reported in the log.
    pub fn quantize(&self, values: &[f64], warn_saturation: bool) -> Quantized {
        let mut words = Vec::with_capacity(values.len());
        let mut saturations = vec![];
        for (index, &value) in values.iter().enumerate() {
            let (word, clamped) = self.quantize_one(value);
            if clamped {
                let saturation = QuantizationSaturation {
                    index,
                    value,
                    clamped_word: word,
                    clamped_value: self.to_float(word),
                };
                if warn_saturation {
                    warn!("{saturation}");
                }
                saturations.push(saturation);
            }
            words.push(word);
        }

        Quantized {
            format: *self,
            words,
            saturations,
        }
    }

    /// The number of bytes used to store one word in a bram.
    pub fn word_bytes(&self) -> usize {
        self.nbits.div_ceil(8) as usize
    }
}

/// A value that didn't fit into a fixed-point word and was clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationSaturation {
    /// The index of the value in the input array (i.e. the channel, for
    /// calibration constants).
    pub index: usize,
    /// The original value.
    pub value: f64,
    /// The word the value was clamped to.
    pub clamped_word: i64,
    /// The value represented by the clamped word.
    pub clamped_value: f64,
}

impl QuantizationSaturation {
    /// How far the original value was from the value that's represented.
    pub fn excess(&self) -> f64 {
        self.value - self.clamped_value
    }
}

impl std::fmt::Display for QuantizationSaturation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Value {} at index {} saturated to {} (excess {:e})",
            self.value,
            self.index,
            self.clamped_value,
            self.excess()
        )
    }
}

/// Quantized words, ready to be serialised into bram bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub format: FixedPointFormat,
    pub words: Vec<i64>,
    pub saturations: Vec<QuantizationSaturation>,
}

impl Quantized {
    /// The values the words represent.
    pub fn to_floats(&self) -> Vec<f64> {
        self.words.iter().map(|&w| self.format.to_float(w)).collect()
    }

    /// Serialise the words as big-endian two's complement, each
    /// [`FixedPointFormat::word_bytes`] long.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        words_to_be_bytes(&self.words, self.format.word_bytes())
    }
}

/// Serialise signed words as big-endian two's complement with `word_bytes`
/// bytes per word. Words must already fit in that width.
pub(crate) fn words_to_be_bytes(words: &[i64], word_bytes: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * word_bytes);
    for &word in words {
        // Writing into a Vec can't fail.
        bytes
            .write_int::<BigEndian>(word, word_bytes)
            .expect("writing to a Vec is infallible");
    }
    bytes
}
