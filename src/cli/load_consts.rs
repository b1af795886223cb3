// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Derive calibration constants, quantize them and load them into the FPGA
//! without measuring anything.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::{
    common::{
        display_warnings, ConstsArgs, ConstsChoice, ConstsParams, InfoPrinter, SpectrometerArgs,
        ARG_FILE_HELP,
    },
    measure::MeasureArgsError,
};
use crate::{
    params::{LoadConstsParams, SimulatedHardware},
    DssError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct LoadConstsArgs {
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

    /// Load the constants into a simulated FPGA instead of real hardware.
    #[clap(long, help_heading = "HARDWARE")]
    #[serde(default)]
    pub(super) simulate: bool,
}

impl LoadConstsArgs {
    pub(super) fn merge(self) -> Result<LoadConstsArgs, DssError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let LoadConstsArgs {
                args_file: _,
                spectrometer_args,
                consts_args,
                simulate,
            } = unpack_arg_file!(arg_file);

            Ok(LoadConstsArgs {
                args_file: None,
                spectrometer_args: cli_args.spectrometer_args.merge(spectrometer_args),
                consts_args: cli_args.consts_args.merge(consts_args),
                simulate: cli_args.simulate || simulate,
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<LoadConstsParams, DssError> {
        debug!("{:#?}", self);

        let LoadConstsArgs {
            args_file: _,
            spectrometer_args,
            consts_args,
            simulate,
        } = self;

        if !simulate {
            return Err(MeasureArgsError::NoHardware.into());
        }

        let (spectrometer, layout) = spectrometer_args.parse()?;
        let consts_params = consts_args.parse(false)?;

        let mut printer = InfoPrinter::new("Loading calibration constants".into());
        SpectrometerArgs::describe(&spectrometer, &mut printer);
        consts_params.describe(&mut printer);
        printer.display();
        display_warnings();

        let ConstsParams {
            choice,
            format,
            epsilon,
            warn_saturation,
        } = consts_params;
        let source = match choice {
            ConstsChoice::Once(source) => source,
            // Per-LO-setting constants were not asked for.
            ConstsChoice::PerLoSetting(_) => unreachable!(),
        };

        Ok(LoadConstsParams {
            spectrometer,
            layout,
            source,
            format,
            epsilon,
            warn_saturation,
            hardware: SimulatedHardware { fixed_lo_ghz: 0.0 },
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

        params.run()?;
        Ok(())
    }
}
