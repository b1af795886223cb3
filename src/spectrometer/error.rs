// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with invalid spectrometer, sweep or LO parameters. These
//! are always raised before any hardware I/O.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("The spectrometer has no channels; the frequency grid cannot be empty")]
    EmptyGrid,

    #[error("The spectrometer bandwidth must be positive and finite, but got {0} MHz")]
    BadBandwidth(f64),

    #[error("The bram address width must be between 1 and {max} bits, but got {got}")]
    BadBramAddrWidth { got: u32, max: u32 },

    #[error("The accumulation length cannot be 0")]
    ZeroAccLen,

    #[error("The test-channel step cannot be 0")]
    ZeroChannelStep,

    #[error("No test channels were specified")]
    NoTestChannels,

    #[error("Test channel {channel} is not on the frequency grid; there are only {nchannels} channels")]
    TestChannelOutOfRange { channel: usize, nchannels: usize },

    #[error("Test channels must be strictly increasing, but channel {next} follows channel {prev}")]
    NonMonotonicTestChannels { prev: usize, next: usize },

    #[error("The settle time ({settle_s} s) is shorter than the spectrometer's pipeline latency ({min_s} s); stale accumulations would be read. Increase the settle time or explicitly allow a short settle time")]
    SettleTooShort { settle_s: f64, min_s: f64 },

    #[error("The settle time must be non-negative and finite, but got {0} s")]
    BadSettleTime(f64),

    #[error("Fixed-point format has {binpt} fractional bits, but only {nbits} bits in total")]
    BadFixedPointFormat { nbits: u32, binpt: u32 },

    #[error("No {what} LO frequencies were specified")]
    NoLoFrequencies { what: &'static str },

    #[error("Frequency multiplier for the {what} generator must be positive, but got {got}")]
    BadMultiplier { what: &'static str, got: f64 },

    #[error("The {what} array has {got} elements, but the spectrometer has {expected} channels")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}
