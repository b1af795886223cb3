// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Measure the sideband rejection ratio of a receiver at one or many LO
//! settings.


use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vec1::Vec1;

use super::common::{
    display_warnings, ConstsArgs, ConstsChoice, ConstsParams, InfoPrinter, SpectrometerArgs, Warn,
    ARG_FILE_HELP,
};
use crate::{
    constants::*,
    measure::{
        ConstantLoading, FailurePolicy, GeneratorSettings, MeasurementPlan, MeasurementSettings,
    },
    params::{MeasureParams, SimulatedHardware},
    spectrometer::{ConfigurationError, TestChannels},
    sweep::SweepConfig,
    DssError,
};

lazy_static::lazy_static! {
    static ref RF_POWER_HELP: String =
        format!("The power of the RF generator [dBm]. Default: {DEFAULT_RF_POWER_DBM}");

    static ref FIRST_CHANNEL_HELP: String =
        format!("The first test channel. Default: {DEFAULT_FIRST_TEST_CHANNEL}");

    static ref CHANNEL_STEP_HELP: String =
        format!("Test every this many channels, starting at --first-channel. Default: {DEFAULT_CHANNEL_STEP}");

    static ref SETTLE_TIME_HELP: String =
        format!("How long to wait after retuning the RF tone before reading spectra [seconds]. Default: {DEFAULT_SETTLE_TIME_S}");

    static ref OUTPUT_DIR_HELP: String =
        format!("The directory to write results into. Default: {DEFAULT_OUTPUT_DIR}");
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct MeasureCliArgs {
    /// The LO frequency of a single-LO receiver [GHz]. The LO is assumed to
    /// be set externally; only the RF generator is controlled.
    #[clap(long, help_heading = "LO SETTINGS")]
    pub(super) lo: Option<f64>,

    /// The LO1 frequencies of a two-LO receiver [GHz]. Every LO1 frequency is
    /// measured against every LO2 frequency.
    #[clap(long, multiple_values(true), help_heading = "LO SETTINGS")]
    pub(super) lo1: Option<Vec<f64>>,

    /// The LO2 frequencies of a two-LO receiver [GHz].
    #[clap(long, multiple_values(true), help_heading = "LO SETTINGS")]
    pub(super) lo2: Option<Vec<f64>>,

    #[clap(long, help = RF_POWER_HELP.as_str(), help_heading = "GENERATORS")]
    pub(super) rf_power: Option<f64>,

    /// The power of the LO1 generator [dBm]. Left untouched if not given.
    #[clap(long, help_heading = "GENERATORS")]
    pub(super) lo1_power: Option<f64>,

    /// The power of the LO2 generator [dBm]. Left untouched if not given.
    #[clap(long, help_heading = "GENERATORS")]
    pub(super) lo2_power: Option<f64>,

    /// The frequency multiplier after the RF generator. The generator is set
    /// to the RF frequency divided by this.
    #[clap(long, help_heading = "GENERATORS")]
    pub(super) rf_multiplier: Option<f64>,

    /// The frequency multiplier after the LO1 generator.
    #[clap(long, help_heading = "GENERATORS")]
    pub(super) lo1_multiplier: Option<f64>,

    #[clap(long, help = FIRST_CHANNEL_HELP.as_str(), help_heading = "SWEEP")]
    pub(super) first_channel: Option<usize>,

    #[clap(long, help = CHANNEL_STEP_HELP.as_str(), help_heading = "SWEEP")]
    pub(super) channel_step: Option<usize>,

    /// An explicit, strictly increasing list of test channels. Overrides
    /// --first-channel and --channel-step.
    #[clap(long, multiple_values(true), help_heading = "SWEEP")]
    pub(super) test_channels: Option<Vec<usize>>,

    #[clap(long, help = SETTLE_TIME_HELP.as_str(), help_heading = "SWEEP")]
    pub(super) settle_time: Option<f64>,

    /// Allow a settle time shorter than the spectrometer's pipeline latency.
    /// Spectra may then contain the previous tone.
    #[clap(long, help_heading = "SWEEP")]
    #[serde(default)]
    pub(super) allow_short_settle: bool,

    /// Don't load any calibration constants; use whatever the FPGA already
    /// has.
    #[clap(long, help_heading = "CALIBRATION CONSTANTS")]
    #[serde(default)]
    pub(super) keep_consts: bool,

    /// Before each LO setting, load constants derived from the calibration
    /// data stored for that setting under --cal-dir.
    #[clap(long, help_heading = "CALIBRATION CONSTANTS")]
    #[serde(default)]
    pub(super) reload_consts: bool,

    /// Stop at the first LO setting that fails, rather than carrying on with
    /// the rest.
    #[clap(long, help_heading = "SWEEP")]
    #[serde(default)]
    pub(super) halt_on_failure: bool,

    #[clap(short = 'o', long, help = OUTPUT_DIR_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output_dir: Option<PathBuf>,

    /// Measure a simulated receiver instead of real hardware.
    #[clap(long, help_heading = "HARDWARE")]
    #[serde(default)]
    pub(super) simulate: bool,
}

impl MeasureCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            lo: self.lo.or(other.lo),
            lo1: self.lo1.or(other.lo1),
            lo2: self.lo2.or(other.lo2),
            rf_power: self.rf_power.or(other.rf_power),
            lo1_power: self.lo1_power.or(other.lo1_power),
            lo2_power: self.lo2_power.or(other.lo2_power),
            rf_multiplier: self.rf_multiplier.or(other.rf_multiplier),
            lo1_multiplier: self.lo1_multiplier.or(other.lo1_multiplier),
            first_channel: self.first_channel.or(other.first_channel),
            channel_step: self.channel_step.or(other.channel_step),
            test_channels: self.test_channels.or(other.test_channels),
            settle_time: self.settle_time.or(other.settle_time),
            allow_short_settle: self.allow_short_settle || other.allow_short_settle,
            keep_consts: self.keep_consts || other.keep_consts,
            reload_consts: self.reload_consts || other.reload_consts,
            halt_on_failure: self.halt_on_failure || other.halt_on_failure,
            output_dir: self.output_dir.or(other.output_dir),
            simulate: self.simulate || other.simulate,
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct MeasureArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "spectrometer")]
    #[serde(default)]
    pub(super) spectrometer_args: SpectrometerArgs,

    #[clap(flatten)]
    #[serde(rename = "constants")]
    #[serde(default)]
    pub(super) consts_args: ConstsArgs,

    #[clap(flatten)]
    #[serde(rename = "measure")]
    #[serde(default)]
    pub(super) measure_args: MeasureCliArgs,
}

impl MeasureArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<MeasureArgs, DssError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let MeasureArgs {
                args_file: _,
                spectrometer_args,
                consts_args,
                measure_args,
            } = unpack_arg_file!(arg_file);

            Ok(MeasureArgs {
                args_file: None,
                spectrometer_args: cli_args.spectrometer_args.merge(spectrometer_args),
                consts_args: cli_args.consts_args.merge(consts_args),
                measure_args: cli_args.measure_args.merge(measure_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<MeasureParams, DssError> {
        debug!("{:#?}", self);

        let MeasureArgs {
            args_file: _,
            spectrometer_args,
            consts_args,
            measure_args:
                MeasureCliArgs {
                    lo,
                    lo1,
                    lo2,
                    rf_power,
                    lo1_power,
                    lo2_power,
                    rf_multiplier,
                    lo1_multiplier,
                    first_channel,
                    channel_step,
                    test_channels,
                    settle_time,
                    allow_short_settle,
                    keep_consts,
                    reload_consts,
                    halt_on_failure,
                    output_dir,
                    simulate,
                },
        } = self;

        if !simulate {
            return Err(MeasureArgsError::NoHardware.into());
        }

        let plan = parse_plan(lo, lo1, lo2)?;

        let (spectrometer, layout) = spectrometer_args.parse()?;
        let mut printer = InfoPrinter::new("Measuring sideband rejection".into());
        SpectrometerArgs::describe(&spectrometer, &mut printer);

        let nchannels = spectrometer.nchannels();
        let channels = match test_channels {
            Some(list) => {
                if first_channel.is_some() || channel_step.is_some() {
                    "--first-channel and --channel-step are ignored when --test-channels is given"
                        .warn();
                }
                TestChannels::from_list(nchannels, list)?
            }
            None => TestChannels::from_step(
                nchannels,
                first_channel.unwrap_or(DEFAULT_FIRST_TEST_CHANNEL),
                channel_step.unwrap_or(DEFAULT_CHANNEL_STEP),
            )?,
        };

        let settle_s = settle_time.unwrap_or(DEFAULT_SETTLE_TIME_S);
        if !(settle_s.is_finite() && settle_s >= 0.0) {
            return Err(ConfigurationError::BadSettleTime(settle_s).into());
        }
        let settle = Duration::from_secs_f64(settle_s);
        let num_test_channels = channels.len();
        let sweep = SweepConfig::new(&spectrometer, layout, channels, settle, allow_short_settle)?;
        printer.push_block(vec![
            format!(
                "{num_test_channels} test channels, {settle_s} s settle time (minimum {:.3} s)",
                spectrometer.min_settle_time().as_secs_f64()
            )
            .into(),
            format!("{} MHz between channels", sweep.grid.spacing_mhz()).into(),
        ]);

        let generators = parse_generators(
            plan.is_multi(),
            rf_power,
            lo1_power,
            lo2_power,
            rf_multiplier,
            lo1_multiplier,
        )?;
        let mut block = vec![format!("RF power: {} dBm", generators.rf_power_dbm).into()];
        if let Some(m) = generators.rf_multiplier {
            block.push(format!("RF multiplier: ×{m}").into());
        }
        if let Some(m) = generators.lo1_multiplier {
            block.push(format!("LO1 multiplier: ×{m}").into());
        }
        printer.push_block(block);

        let lo_settings = plan.lo_settings();
        let mut block = vec![format!("{} LO setting(s)", lo_settings.len()).into()];
        for lo in &lo_settings {
            block.push(format!("{lo}").into());
        }
        printer.push_block(block);

        if keep_consts && reload_consts {
            return Err(MeasureArgsError::KeepAndReload.into());
        }
        let consts_args = if keep_consts
            && (consts_args.ideal_consts.is_some() || consts_args.cal_dir.is_some())
        {
            "--keep-consts is set; other calibration constant arguments are ignored".warn();
            ConstsArgs {
                ideal_consts: None,
                cal_dir: None,
                cal_key: None,
                ..consts_args
            }
        } else {
            consts_args
        };
        let consts_params = consts_args.parse(reload_consts)?;
        if keep_consts {
            printer.push_line("Keeping the constants already on the FPGA".into());
        } else {
            consts_params.describe(&mut printer);
        }
        let ConstsParams {
            choice,
            format: consts_format,
            epsilon: calibration_epsilon,
            warn_saturation,
        } = consts_params;
        let (constants, store) = match choice {
            _ if keep_consts => (ConstantLoading::Keep, None),
            ConstsChoice::Once(source) => (ConstantLoading::Once(source), None),
            ConstsChoice::PerLoSetting(store) => (ConstantLoading::PerLoSetting, Some(store)),
        };

        let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        printer.push_line(format!("Writing results to {}", output_dir.display()).into());
        printer.display();
        display_warnings();

        let fixed_lo_ghz = match &plan {
            MeasurementPlan::Single { lo_ghz } => *lo_ghz,
            MeasurementPlan::Multi { lo1_ghz, .. } => *lo1_ghz.first(),
        };

        Ok(MeasureParams {
            plan,
            settings: MeasurementSettings {
                spectrometer,
                sweep,
                generators,
                consts_format,
                calibration_epsilon,
                constants,
                failure_policy: if halt_on_failure {
                    FailurePolicy::Halt
                } else {
                    FailurePolicy::Continue
                },
                warn_saturation,
            },
            store,
            output_dir,
            hardware: SimulatedHardware { fixed_lo_ghz },
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), DssError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let results = params.run()?;
        let total = results.outcomes.len();
        let mut failures = results.failures();
        if let Some(first) = failures.next() {
            let num_failed = 1 + failures.count();
            return Err(DssError::Measure(format!(
                "{num_failed} of {total} LO setting(s) failed; the first was {}: {}",
                first.lo, first.error
            )));
        }
        Ok(())
    }
}

/// Work out which LO settings to measure.
fn parse_plan(
    lo: Option<f64>,
    lo1: Option<Vec<f64>>,
    lo2: Option<Vec<f64>>,
) -> Result<MeasurementPlan, DssError> {
    let check = |ghz: f64| {
        if ghz.is_finite() && ghz > 0.0 {
            Ok(ghz)
        } else {
            Err(MeasureArgsError::BadLo { ghz })
        }
    };
    let plan = match (lo, lo1, lo2) {
        (None, None, None) => return Err(MeasureArgsError::NoLo.into()),
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(MeasureArgsError::SingleAndMultiLo.into())
        }
        (Some(lo), None, None) => MeasurementPlan::Single { lo_ghz: check(lo)? },
        (None, Some(lo1), Some(lo2)) => {
            let lo1_ghz = Vec1::try_from_vec(lo1)
                .map_err(|_| ConfigurationError::NoLoFrequencies { what: "LO1" })?;
            let lo2_ghz = Vec1::try_from_vec(lo2)
                .map_err(|_| ConfigurationError::NoLoFrequencies { what: "LO2" })?;
            for &ghz in lo1_ghz.iter().chain(lo2_ghz.iter()) {
                check(ghz)?;
            }
            MeasurementPlan::Multi { lo1_ghz, lo2_ghz }
        }
        (None, _, _) => return Err(MeasureArgsError::OnlyOneOfLo1Lo2.into()),
    };
    Ok(plan)
}

fn parse_generators(
    multi: bool,
    rf_power: Option<f64>,
    lo1_power: Option<f64>,
    lo2_power: Option<f64>,
    rf_multiplier: Option<f64>,
    lo1_multiplier: Option<f64>,
) -> Result<GeneratorSettings, DssError> {
    let check_power = |what: &'static str, dbm: f64| {
        if dbm.is_finite() {
            Ok(dbm)
        } else {
            Err(MeasureArgsError::BadPower { what, dbm })
        }
    };
    let check_multiplier = |what: &'static str, got: f64| {
        if got.is_finite() && got > 0.0 {
            Ok(got)
        } else {
            Err(ConfigurationError::BadMultiplier { what, got })
        }
    };

    if !multi && (lo1_power.is_some() || lo2_power.is_some() || lo1_multiplier.is_some()) {
        "LO generator settings are ignored for a single-LO receiver".warn();
    }
    let (lo1_power, lo2_power, lo1_multiplier) = if multi {
        (lo1_power, lo2_power, lo1_multiplier)
    } else {
        (None, None, None)
    };

    Ok(GeneratorSettings {
        rf_power_dbm: check_power("RF", rf_power.unwrap_or(DEFAULT_RF_POWER_DBM))?,
        lo1_power_dbm: lo1_power.map(|p| check_power("LO1", p)).transpose()?,
        lo2_power_dbm: lo2_power.map(|p| check_power("LO2", p)).transpose()?,
        rf_multiplier: rf_multiplier.map(|m| check_multiplier("RF", m)).transpose()?,
        lo1_multiplier: lo1_multiplier
            .map(|m| check_multiplier("LO1", m))
            .transpose()?,
    })
}

#[derive(Error, Debug)]
pub(super) enum MeasureArgsError {
    #[error("No LO frequencies were given; use --lo for a single-LO receiver, or --lo1 and --lo2 for a two-LO receiver")]
    NoLo,

    #[error("--lo cannot be used together with --lo1 or --lo2")]
    SingleAndMultiLo,

    #[error("A two-LO receiver needs both --lo1 and --lo2")]
    OnlyOneOfLo1Lo2,

    #[error("LO frequencies must be positive and finite, but got {ghz} GHz")]
    BadLo { ghz: f64 },

    #[error("The {what} generator power must be finite, but got {dbm} dBm")]
    BadPower { what: &'static str, dbm: f64 },

    #[error("--keep-consts and --reload-consts cannot be used together")]
    KeepAndReload,

    #[error("No FPGA transport available; use --simulate")]
    NoHardware,
}
