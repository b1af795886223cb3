// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. e.g. the `measure` and
//! `load-consts` subcommands both need to know about the spectrometer and the
//! calibration constants, so the same arguments are shared between them.

mod printers;

pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    c64,
    calibration::{CalibrationStore, CalibrationStoreError, ConstantSource, DirectoryStore},
    constants::*,
    fixed_point::FixedPointFormat,
    instrument::FpgaLayout,
    spectrometer::{ConfigurationError, SpectrometerConfig},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref BANDWIDTH_HELP: String =
        format!("The bandwidth of the spectrometer [MHz]. Default: {DEFAULT_BANDWIDTH_MHZ}");

    static ref BRAM_ADDR_WIDTH_HELP: String =
        format!("The address width of each spectrometer bram [bits]. Default: {DEFAULT_BRAM_ADDR_WIDTH}");

    static ref NUM_BRAMS_HELP: String =
        format!("The number of brams each spectrum is interleaved across. Default: {DEFAULT_NUM_BRAMS}");

    static ref ACC_LEN_HELP: String =
        format!("The number of spectra accumulated per readout. Default: {DEFAULT_ACC_LEN}");

    static ref ADC_BITS_HELP: String =
        format!("The number of bits of the ADCs, used to express powers in dBFS. Default: {DEFAULT_ADC_BITS}");

    static ref IDEAL_CONSTS_HELP: String =
        format!("Use this complex value as the calibration constant of every channel, instead of constants derived from calibration data. Default: {}{:+}j", DEFAULT_IDEAL_CONST.0, DEFAULT_IDEAL_CONST.1);

    static ref CONSTS_NBITS_HELP: String =
        format!("The total number of bits of each calibration constant word. Default: {DEFAULT_CONSTS_NBITS}");

    static ref CONSTS_BINPT_HELP: String =
        format!("The number of fractional bits of each calibration constant word. Default: {DEFAULT_CONSTS_BINPT}");

    static ref CAL_EPSILON_HELP: String =
        format!("Auto-powers smaller than this are treated as zero when deriving constants. Default: {DEFAULT_CALIBRATION_EPSILON:e}");
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(DssError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(DssError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(DssError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Arguments describing the spectrometer model on the FPGA.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct SpectrometerArgs {
    #[clap(long, help = BANDWIDTH_HELP.as_str(), help_heading = "SPECTROMETER")]
    pub(super) bandwidth: Option<f64>,

    #[clap(long, help = BRAM_ADDR_WIDTH_HELP.as_str(), help_heading = "SPECTROMETER")]
    pub(super) bram_addr_width: Option<u32>,

    #[clap(long, help = NUM_BRAMS_HELP.as_str(), help_heading = "SPECTROMETER")]
    pub(super) num_brams: Option<usize>,

    #[clap(long, help = ACC_LEN_HELP.as_str(), help_heading = "SPECTROMETER")]
    pub(super) acc_len: Option<u32>,

    #[clap(long, help = ADC_BITS_HELP.as_str(), help_heading = "SPECTROMETER")]
    pub(super) adc_bits: Option<u32>,

    /// The name of a register counting accumulations. If given, it is checked
    /// on either side of every spectra read so that both sidebands come from
    /// the same accumulation.
    #[clap(long, help_heading = "SPECTROMETER")]
    pub(super) acc_count_reg: Option<String>,
}

impl SpectrometerArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            bandwidth: self.bandwidth.or(other.bandwidth),
            bram_addr_width: self.bram_addr_width.or(other.bram_addr_width),
            num_brams: self.num_brams.or(other.num_brams),
            acc_len: self.acc_len.or(other.acc_len),
            adc_bits: self.adc_bits.or(other.adc_bits),
            acc_count_reg: self.acc_count_reg.or(other.acc_count_reg),
        }
    }

    /// Get a validated spectrometer configuration and the FPGA names that go
    /// with it.
    pub(super) fn parse(self) -> Result<(SpectrometerConfig, FpgaLayout), ConfigurationError> {
        let SpectrometerArgs {
            bandwidth,
            bram_addr_width,
            num_brams,
            acc_len,
            adc_bits,
            acc_count_reg,
        } = self;
        let config = SpectrometerConfig {
            bandwidth_mhz: bandwidth.unwrap_or(DEFAULT_BANDWIDTH_MHZ),
            bram_addr_width: bram_addr_width.unwrap_or(DEFAULT_BRAM_ADDR_WIDTH),
            num_brams: num_brams.unwrap_or(DEFAULT_NUM_BRAMS),
            acc_len: acc_len.unwrap_or(DEFAULT_ACC_LEN),
            adc_bits: adc_bits.unwrap_or(DEFAULT_ADC_BITS),
        };
        config.validate()?;
        let mut layout = FpgaLayout::with_num_brams(config.num_brams);
        layout.acc_count_reg = acc_count_reg;
        Ok((config, layout))
    }

    pub(super) fn describe(config: &SpectrometerConfig, printer: &mut InfoPrinter) {
        printer.push_block(vec![
            format!(
                "{} channels over {} MHz ({:.4} MHz per channel)",
                config.nchannels(),
                config.bandwidth_mhz,
                config.bandwidth_mhz / config.nchannels() as f64
            )
            .into(),
            format!(
                "{} brams × 2^{} addresses, accumulation length {}",
                config.num_brams, config.bram_addr_width, config.acc_len
            )
            .into(),
            format!("Full scale: {:.2} dB", config.dbfs()).into(),
        ]);
    }
}

/// Arguments selecting the calibration constants.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ConstsArgs {
    #[clap(
        long, help = IDEAL_CONSTS_HELP.as_str(), help_heading = "CALIBRATION CONSTANTS",
        number_of_values = 2,
        allow_hyphen_values = true,
        value_names = &["RE", "IM"]
    )]
    pub(super) ideal_consts: Option<Vec<f64>>,

    /// The directory holding calibration data. Each calibration session is a
    /// directory under here containing a caldata.json file.
    #[clap(long, help_heading = "CALIBRATION CONSTANTS")]
    pub(super) cal_dir: Option<PathBuf>,

    /// The calibration session to derive constants from. If not given, the
    /// caldata.json directly inside --cal-dir is used.
    #[clap(long, help_heading = "CALIBRATION CONSTANTS")]
    pub(super) cal_key: Option<String>,

    #[clap(long, help = CONSTS_NBITS_HELP.as_str(), help_heading = "CALIBRATION CONSTANTS")]
    pub(super) consts_nbits: Option<u32>,

    #[clap(long, help = CONSTS_BINPT_HELP.as_str(), help_heading = "CALIBRATION CONSTANTS")]
    pub(super) consts_binpt: Option<u32>,

    #[clap(long, help = CAL_EPSILON_HELP.as_str(), help_heading = "CALIBRATION CONSTANTS")]
    pub(super) cal_epsilon: Option<f64>,

    /// Don't report constants that saturate their fixed-point words.
    #[clap(long, help_heading = "CALIBRATION CONSTANTS")]
    #[serde(default)]
    pub(super) no_saturation_warnings: bool,
}

#[derive(Error, Debug)]
pub(super) enum ConstsArgsError {
    #[error("Ideal constants must be given as a real and an imaginary part, but got {0:?}")]
    BadIdealConsts(Vec<f64>),

    #[error("Both ideal constants and calibration data were given; use one or the other")]
    IdealAndMeasured,

    #[error("Loading constants per LO setting needs a calibration directory (--cal-dir)")]
    NoCalDir,

    #[error(transparent)]
    Store(#[from] CalibrationStoreError),
}

/// Where the constants come from.
pub(super) enum ConstsChoice {
    /// One source for the whole run.
    Once(ConstantSource),

    /// Calibration data per LO setting, from this store.
    PerLoSetting(DirectoryStore),
}

/// Parsed [`ConstsArgs`].
pub(super) struct ConstsParams {
    pub(super) choice: ConstsChoice,
    pub(super) format: FixedPointFormat,
    pub(super) epsilon: f64,
    pub(super) warn_saturation: bool,
}

impl ConstsArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            ideal_consts: self.ideal_consts.or(other.ideal_consts),
            cal_dir: self.cal_dir.or(other.cal_dir),
            cal_key: self.cal_key.or(other.cal_key),
            consts_nbits: self.consts_nbits.or(other.consts_nbits),
            consts_binpt: self.consts_binpt.or(other.consts_binpt),
            cal_epsilon: self.cal_epsilon.or(other.cal_epsilon),
            no_saturation_warnings: self.no_saturation_warnings || other.no_saturation_warnings,
        }
    }

    /// Work out where constants come from. Calibration data for a single
    /// session is read here, so that a missing or broken file is reported
    /// before any hardware is touched.
    pub(super) fn parse(self, per_lo_setting: bool) -> Result<ConstsParams, crate::DssError> {
        let ConstsArgs {
            ideal_consts,
            cal_dir,
            cal_key,
            consts_nbits,
            consts_binpt,
            cal_epsilon,
            no_saturation_warnings,
        } = self;

        let format = FixedPointFormat::new(
            consts_nbits.unwrap_or(DEFAULT_CONSTS_NBITS),
            consts_binpt.unwrap_or(DEFAULT_CONSTS_BINPT),
        )?;
        let epsilon = cal_epsilon.unwrap_or(DEFAULT_CALIBRATION_EPSILON);

        let ideal = match ideal_consts.as_deref() {
            None => None,
            Some(&[re, im]) => Some(c64::new(re, im)),
            Some(v) => return Err(ConstsArgsError::BadIdealConsts(v.to_vec()).into()),
        };
        let choice = match (ideal, cal_dir) {
            (Some(_), Some(_)) => return Err(ConstsArgsError::IdealAndMeasured.into()),
            (_, None) if per_lo_setting => return Err(ConstsArgsError::NoCalDir.into()),
            (_, Some(dir)) if per_lo_setting => {
                if cal_key.is_some() {
                    "--cal-key is ignored when constants are loaded per LO setting".warn();
                }
                ConstsChoice::PerLoSetting(DirectoryStore::new(dir))
            }
            (_, Some(dir)) => {
                let key = cal_key.unwrap_or_default();
                let store = DirectoryStore::new(dir);
                debug!("Reading calibration data from {}", store.path(&key).display());
                let powers = store.load(&key).map_err(ConstsArgsError::from)?;
                ConstsChoice::Once(ConstantSource::Measured(powers))
            }
            (ideal, None) => ConstsChoice::Once(ConstantSource::Ideal(ideal.unwrap_or_else(
                || c64::new(DEFAULT_IDEAL_CONST.0, DEFAULT_IDEAL_CONST.1),
            ))),
        };

        Ok(ConstsParams {
            choice,
            format,
            epsilon,
            warn_saturation: !no_saturation_warnings,
        })
    }
}

impl ConstsParams {
    pub(super) fn describe(&self, printer: &mut InfoPrinter) {
        let source = match &self.choice {
            ConstsChoice::Once(ConstantSource::Ideal(c)) => {
                format!("Ideal constants: {}{:+}j", c.re, c.im)
            }
            ConstsChoice::Once(ConstantSource::Measured(p)) => {
                format!("Constants from calibration data ({} channels)", p.nchannels())
            }
            ConstsChoice::PerLoSetting(store) => format!(
                "Constants from calibration data per LO setting, under {}",
                store.root().display()
            ),
        };
        printer.push_block(vec![
            source.into(),
            format!(
                "Fixed point: {} bits, {} fractional",
                self.format.nbits(),
                self.format.binpt()
            )
            .into(),
        ]);
    }
}
