// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Digital sideband-separation calibration constants.

A DSS receiver has two IF paths, A and B. Combining them as `A + c B` with the
right complex constant `c` per channel cancels one of the two RF sidebands. The
constants are derived from auto- and cross-powers measured with a tone in each
sideband (see [`CalibrationConstants::compute`]), then quantized and written
into the FPGA's constant brams.
 */

mod error;
mod store;

pub use error::{CalibrationError, CalibrationStoreError};
pub use store::{CalibrationStore, DirectoryStore, MemoryStore};

use log::{debug, info, warn};
use ndarray::{prelude::*, Zip};

use crate::{
    c64,
    fixed_point::{FixedPointFormat, QuantizationSaturation, Quantized},
    instrument::{write_interleaved, Fpga, FpgaLayout},
};

/// Correlated powers measured with a calibration tone in the USB and then in
/// the LSB. Every array has one element per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoCrossPowerSet {
    /// `|A|²` with the tone in the USB.
    pub a2_usb: Array1<f64>,
    /// `|A|²` with the tone in the LSB.
    pub a2_lsb: Array1<f64>,
    /// `|B|²` with the tone in the USB.
    pub b2_usb: Array1<f64>,
    /// `|B|²` with the tone in the LSB.
    pub b2_lsb: Array1<f64>,
    /// `A B*` with the tone in the USB.
    pub ab_usb: Array1<c64>,
    /// `A B*` with the tone in the LSB.
    pub ab_lsb: Array1<c64>,
}

impl AutoCrossPowerSet {
    /// The number of channels. All arrays must have this length; see
    /// [`AutoCrossPowerSet::validate`].
    pub fn nchannels(&self) -> usize {
        self.a2_usb.len()
    }

    /// Check that every array has the same, non-zero length, optionally
    /// requiring a specific length.
    pub fn validate(&self, expected: Option<usize>) -> Result<(), CalibrationError> {
        let expected = expected.unwrap_or_else(|| self.nchannels());
        if expected == 0 {
            return Err(CalibrationError::Empty);
        }
        let lengths = [
            ("a2_usb", self.a2_usb.len()),
            ("a2_lsb", self.a2_lsb.len()),
            ("b2_usb", self.b2_usb.len()),
            ("b2_lsb", self.b2_lsb.len()),
            ("ab_usb", self.ab_usb.len()),
            ("ab_lsb", self.ab_lsb.len()),
        ];
        for (what, got) in lengths {
            if got != expected {
                return Err(CalibrationError::LengthMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }
}

/// Where calibration constants come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantSource {
    /// The same constant on every channel for both sidebands, e.g. `0+1j` for
    /// a perfectly balanced receiver.
    Ideal(c64),

    /// Constants derived from measured powers.
    Measured(AutoCrossPowerSet),
}

/// Complex constants for each channel. `usb` maximises the USB (rejects the
/// LSB); `lsb` maximises the LSB (rejects the USB). Every element is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConstants {
    pub usb: Array1<c64>,
    pub lsb: Array1<c64>,
}

/// Calibration constants quantized for the FPGA. The real and imaginary parts
/// are stored in separate brams.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedConstants {
    pub usb_re: Quantized,
    pub usb_im: Quantized,
    pub lsb_re: Quantized,
    pub lsb_im: Quantized,
}

impl QuantizedConstants {
    /// All saturations across the four arrays, labelled with the array they
    /// came from.
    pub fn saturations(&self) -> impl Iterator<Item = (&'static str, &QuantizationSaturation)> {
        [
            ("USB real", &self.usb_re),
            ("USB imag", &self.usb_im),
            ("LSB real", &self.lsb_re),
            ("LSB imag", &self.lsb_im),
        ]
        .into_iter()
        .flat_map(|(what, q)| q.saturations.iter().map(move |s| (what, s)))
    }
}

impl CalibrationConstants {
    /// Broadcast a single constant over `nchannels` channels for both
    /// sidebands.
    pub fn ideal(value: c64, nchannels: usize) -> CalibrationConstants {
        CalibrationConstants {
            usb: Array1::from_elem(nchannels, value),
            lsb: Array1::from_elem(nchannels, value),
        }
    }

    /// Derive constants from measured powers:
    ///
    /// `consts_usb = -ab_lsb / b2_lsb`
    ///
    /// `consts_lsb = -conj(ab_usb) / a2_usb`
    ///
    /// Any channel whose denominator has a magnitude below `epsilon` makes the
    /// derivation fail; the error names the first such channel.
    pub fn compute(
        powers: &AutoCrossPowerSet,
        epsilon: f64,
    ) -> Result<CalibrationConstants, CalibrationError> {
        powers.validate(None)?;
        check_denominator(powers.b2_lsb.view(), epsilon, "USB", "b2_lsb")?;
        check_denominator(powers.a2_usb.view(), epsilon, "LSB", "a2_usb")?;

        let mut usb = Array1::<c64>::zeros(powers.nchannels());
        Zip::from(&mut usb)
            .and(&powers.ab_lsb)
            .and(&powers.b2_lsb)
            .for_each(|c, &ab, &b2| *c = -ab / b2);
        let mut lsb = Array1::<c64>::zeros(powers.nchannels());
        Zip::from(&mut lsb)
            .and(&powers.ab_usb)
            .and(&powers.a2_usb)
            .for_each(|c, &ab, &a2| *c = -ab.conj() / a2);

        let consts = CalibrationConstants { usb, lsb };
        consts.check_finite()?;
        Ok(consts)
    }

    /// Get constants from either source. `nchannels` is the number of
    /// channels expected by the spectrometer.
    pub fn from_source(
        source: &ConstantSource,
        nchannels: usize,
        epsilon: f64,
    ) -> Result<CalibrationConstants, CalibrationError> {
        match source {
            ConstantSource::Ideal(value) => {
                if nchannels == 0 {
                    return Err(CalibrationError::Empty);
                }
                debug!("Using the ideal constant {value} on all {nchannels} channels");
                let consts = CalibrationConstants::ideal(*value, nchannels);
                consts.check_finite()?;
                Ok(consts)
            }
            ConstantSource::Measured(powers) => {
                powers.validate(Some(nchannels))?;
                debug!("Deriving constants from measured powers over {nchannels} channels");
                CalibrationConstants::compute(powers, epsilon)
            }
        }
    }

    pub fn nchannels(&self) -> usize {
        self.usb.len()
    }

    fn check_finite(&self) -> Result<(), CalibrationError> {
        for (constant, array) in [("USB", &self.usb), ("LSB", &self.lsb)] {
            if let Some((channel, value)) = array
                .iter()
                .enumerate()
                .find(|(_, c)| !(c.re.is_finite() && c.im.is_finite()))
            {
                return Err(CalibrationError::NonFinite {
                    constant,
                    channel,
                    value: *value,
                });
            }
        }
        Ok(())
    }

    /// Quantize the real and imaginary parts of both constant arrays.
    pub fn quantize(&self, format: FixedPointFormat, warn_saturation: bool) -> QuantizedConstants {
        let re = |a: &Array1<c64>| a.iter().map(|c| c.re).collect::<Vec<_>>();
        let im = |a: &Array1<c64>| a.iter().map(|c| c.im).collect::<Vec<_>>();
        QuantizedConstants {
            usb_re: format.quantize(&re(&self.usb), warn_saturation),
            usb_im: format.quantize(&im(&self.usb), warn_saturation),
            lsb_re: format.quantize(&re(&self.lsb), warn_saturation),
            lsb_im: format.quantize(&im(&self.lsb), warn_saturation),
        }
    }

    /// Quantize the constants and write them into the FPGA's constant brams.
    /// Saturations are not errors; they are returned so the caller can report
    /// them.
    pub fn load<F: Fpga + ?Sized>(
        &self,
        fpga: &mut F,
        layout: &FpgaLayout,
        format: FixedPointFormat,
        warn_saturation: bool,
    ) -> Result<QuantizedConstants, CalibrationError> {
        let quantized = self.quantize(format, warn_saturation);
        let word_bytes = format.word_bytes();
        for (brams, q) in [
            (&layout.consts_usb_re_brams, &quantized.usb_re),
            (&layout.consts_usb_im_brams, &quantized.usb_im),
            (&layout.consts_lsb_re_brams, &quantized.lsb_re),
            (&layout.consts_lsb_im_brams, &quantized.lsb_im),
        ] {
            write_interleaved(fpga, brams, &q.words, word_bytes)?;
        }

        let num_saturated = quantized.saturations().count();
        if num_saturated > 0 {
            warn!("{num_saturated} constant value(s) saturated when quantizing");
        }
        info!(
            "Loaded {} calibration constants per sideband ({} bits, {} fractional)",
            self.nchannels(),
            format.nbits(),
            format.binpt()
        );
        Ok(quantized)
    }
}

fn check_denominator(
    denominator: ArrayView1<f64>,
    epsilon: f64,
    constant: &'static str,
    name: &'static str,
) -> Result<(), CalibrationError> {
    let mut bad = denominator
        .iter()
        .enumerate()
        .filter(|(_, v)| !(v.abs() >= epsilon));
    if let Some((channel, &value)) = bad.next() {
        return Err(CalibrationError::NearZeroDenominator {
            constant,
            denominator: name,
            channel,
            value,
            epsilon,
            num_bad: 1 + bad.count(),
        });
    }
    Ok(())
}
