// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The FPGA's registers and memory blocks (brams).
//!
//! A spectrum is spread across several brams; channel `i * N + b` lives at
//! address `i` of bram `b` when there are `N` brams. All words are big-endian.

use byteorder::{BigEndian, ByteOrder};
use log::trace;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use super::InstrumentError;
use crate::{
    constants::{DEFAULT_ACC_LEN_REG, DEFAULT_BRAM_WORD_WIDTH, DEFAULT_CNT_RST_REG, DEFAULT_NUM_BRAMS},
    fixed_point::words_to_be_bytes,
};

/// How the words of a bram are interpreted. The names follow numpy's dtype
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize)]
pub enum BramDataType {
    /// Big-endian unsigned (powers).
    #[strum(serialize = ">u8")]
    #[serde(rename = ">u8")]
    Unsigned,

    /// Big-endian signed (cross-powers).
    #[strum(serialize = ">i8")]
    #[serde(rename = ">i8")]
    Signed,
}

/// The FPGA register/memory interface. Implementors only need to move raw
/// bytes; typed access is provided on top.
pub trait Fpga {
    fn write_register(&mut self, name: &str, value: u32) -> Result<(), InstrumentError>;

    fn read_register(&mut self, name: &str) -> Result<u32, InstrumentError>;

    /// Read `nbytes` bytes from the start of a bram.
    fn read_raw(&mut self, name: &str, nbytes: usize) -> Result<Vec<u8>, InstrumentError>;

    /// Write bytes to the start of a bram.
    fn write_raw(&mut self, name: &str, bytes: &[u8]) -> Result<(), InstrumentError>;

    /// Read a whole bram of `2^addr_width` words, each `word_width` bits wide.
    fn read_block(
        &mut self,
        name: &str,
        addr_width: u32,
        word_width: u32,
        dtype: BramDataType,
    ) -> Result<Vec<f64>, InstrumentError> {
        let word_bytes = word_bytes(word_width)?;
        let num_words = 1usize << addr_width;
        let expected = num_words * word_bytes;
        let bytes = self.read_raw(name, expected)?;
        if bytes.len() != expected {
            return Err(InstrumentError::BadBlockSize {
                name: name.to_string(),
                expected,
                got: bytes.len(),
            });
        }

        let words = bytes
            .chunks_exact(word_bytes)
            .map(|chunk| match dtype {
                BramDataType::Unsigned => BigEndian::read_uint(chunk, word_bytes) as f64,
                BramDataType::Signed => BigEndian::read_int(chunk, word_bytes) as f64,
            })
            .collect();
        Ok(words)
    }

    /// Write signed words, each `word_bytes` bytes long, to a bram.
    fn write_block(
        &mut self,
        name: &str,
        words: &[i64],
        word_bytes: usize,
    ) -> Result<(), InstrumentError> {
        let bytes = words_to_be_bytes(words, word_bytes);
        self.write_raw(name, &bytes)
    }
}

fn word_bytes(word_width: u32) -> Result<usize, InstrumentError> {
    if word_width == 0 || word_width > 64 || word_width % 8 != 0 {
        return Err(InstrumentError::BadWordWidth(word_width));
    }
    Ok(word_width as usize / 8)
}

/// Read a spectrum that's interleaved across several brams.
pub fn read_interleaved<F: Fpga + ?Sized>(
    fpga: &mut F,
    brams: &[String],
    addr_width: u32,
    word_width: u32,
    dtype: BramDataType,
) -> Result<Vec<f64>, InstrumentError> {
    let blocks = brams
        .iter()
        .map(|name| fpga.read_block(name, addr_width, word_width, dtype))
        .collect::<Result<Vec<_>, _>>()?;
    let num_words = 1usize << addr_width;
    let mut spectrum = Vec::with_capacity(num_words * brams.len());
    for i in 0..num_words {
        spectrum.extend(blocks.iter().map(|block| block[i]));
    }
    Ok(spectrum)
}

/// Write words across several brams, de-interleaving them so that word `j`
/// lands in bram `j % N` at address `j / N`.
pub fn write_interleaved<F: Fpga + ?Sized>(
    fpga: &mut F,
    brams: &[String],
    words: &[i64],
    word_bytes: usize,
) -> Result<(), InstrumentError> {
    let num_brams = brams.len();
    if num_brams == 0 || words.len() % num_brams != 0 {
        return Err(InstrumentError::BadInterleave {
            got: words.len(),
            num_brams,
        });
    }
    for (b, name) in brams.iter().enumerate() {
        let bram_words: Vec<i64> = words.iter().skip(b).step_by(num_brams).copied().collect();
        trace!("Writing {} words to {name}", bram_words.len());
        fpga.write_block(name, &bram_words, word_bytes)?;
    }
    Ok(())
}

fn bram_names(prefix: &str, suffix: &str, n: usize) -> Vec1<String> {
    let mut names = Vec1::new(format!("{prefix}0{suffix}"));
    names.extend((1..n).map(|i| format!("{prefix}{i}{suffix}")));
    names
}

/// The names and formats of everything on the FPGA that gets used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpgaLayout {
    /// The accumulation length register.
    pub acc_len_reg: String,

    /// The counter reset register.
    pub cnt_rst_reg: String,

    /// A register counting accumulations. If present, it is checked on either
    /// side of a spectra read so that both sidebands come from the same
    /// accumulation.
    pub acc_count_reg: Option<String>,

    /// The brams holding the USB output power spectrum.
    pub usb_power_brams: Vec1<String>,

    /// The brams holding the LSB output power spectrum.
    pub lsb_power_brams: Vec1<String>,

    /// \[bits\]
    pub power_word_width: u32,

    pub power_dtype: BramDataType,

    /// Constants maximising USB (rejecting LSB), real part.
    pub consts_usb_re_brams: Vec1<String>,

    /// Constants maximising USB (rejecting LSB), imaginary part.
    pub consts_usb_im_brams: Vec1<String>,

    /// Constants maximising LSB (rejecting USB), real part.
    pub consts_lsb_re_brams: Vec1<String>,

    /// Constants maximising LSB (rejecting USB), imaginary part.
    pub consts_lsb_im_brams: Vec1<String>,
}

impl Default for FpgaLayout {
    fn default() -> Self {
        Self::with_num_brams(DEFAULT_NUM_BRAMS)
    }
}

impl FpgaLayout {
    /// The standard ROACH2 DSS naming for a model with `num_brams` brams per
    /// spectrum (at least one bram is always used).
    pub fn with_num_brams(num_brams: usize) -> FpgaLayout {
        let n = num_brams.max(1);
        FpgaLayout {
            acc_len_reg: DEFAULT_ACC_LEN_REG.to_string(),
            cnt_rst_reg: DEFAULT_CNT_RST_REG.to_string(),
            acc_count_reg: None,
            usb_power_brams: bram_names("dout0_", "", n),
            lsb_power_brams: bram_names("dout1_", "", n),
            power_word_width: DEFAULT_BRAM_WORD_WIDTH,
            power_dtype: BramDataType::Unsigned,
            consts_usb_re_brams: bram_names("bram_mult0_", "_bram_re", n),
            consts_usb_im_brams: bram_names("bram_mult0_", "_bram_im", n),
            consts_lsb_re_brams: bram_names("bram_mult1_", "_bram_re", n),
            consts_lsb_im_brams: bram_names("bram_mult1_", "_bram_im", n),
        }
    }
}

/// USB and LSB output power spectra from the same accumulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectra {
    pub usb: Vec<f64>,
    pub lsb: Vec<f64>,
}

impl Spectra {
    /// Read both output spectra. If the layout has an accumulation counter, a
    /// read that straddles two accumulations is an error.
    pub fn read<F: Fpga + ?Sized>(
        fpga: &mut F,
        layout: &FpgaLayout,
        addr_width: u32,
    ) -> Result<Spectra, InstrumentError> {
        let read_both = |fpga: &mut F| -> Result<Spectra, InstrumentError> {
            let usb = read_interleaved(
                fpga,
                &layout.usb_power_brams,
                addr_width,
                layout.power_word_width,
                layout.power_dtype,
            )?;
            let lsb = read_interleaved(
                fpga,
                &layout.lsb_power_brams,
                addr_width,
                layout.power_word_width,
                layout.power_dtype,
            )?;
            Ok(Spectra { usb, lsb })
        };

        let counter = match layout.acc_count_reg.as_deref() {
            None => return read_both(fpga),
            Some(c) => c,
        };
        let before = fpga.read_register(counter)?;
        let spectra = read_both(fpga)?;
        let after = fpga.read_register(counter)?;
        if before != after {
            return Err(InstrumentError::TornRead { before, after });
        }
        Ok(spectra)
    }
}
