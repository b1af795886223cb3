// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Report how long to wait after retuning a tone before the spectrometer's
//! accumulations are free of the old tone.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{display_warnings, InfoPrinter, SpectrometerArgs, ARG_FILE_HELP};
use crate::{
    spectrometer::{ConfigurationError, SpectrometerConfig},
    DssError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SettleTimeArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "spectrometer")]
    #[serde(default)]
    pub(super) spectrometer_args: SpectrometerArgs,

    /// A settle time to check against the minimum [seconds].
    #[clap(long)]
    pub(super) settle_time: Option<f64>,
}

impl SettleTimeArgs {
    pub(super) fn merge(self) -> Result<SettleTimeArgs, DssError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SettleTimeArgs {
                args_file: _,
                spectrometer_args,
                settle_time,
            } = unpack_arg_file!(arg_file);

            Ok(SettleTimeArgs {
                args_file: None,
                spectrometer_args: cli_args.spectrometer_args.merge(spectrometer_args),
                settle_time: cli_args.settle_time.or(settle_time),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<(SpectrometerConfig, Option<Duration>), DssError> {
        let SettleTimeArgs {
            args_file: _,
            spectrometer_args,
            settle_time,
        } = self;

        let (config, _) = spectrometer_args.parse()?;
        let settle = match settle_time {
            Some(s) if s.is_finite() && s >= 0.0 => Some(Duration::from_secs_f64(s)),
            Some(s) => return Err(ConfigurationError::BadSettleTime(s).into()),
            None => None,
        };

        let mut printer = InfoPrinter::new("Spectrometer".into());
        SpectrometerArgs::describe(&config, &mut printer);
        printer.display();
        display_warnings();

        Ok((config, settle))
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), DssError> {
        trace!("{:#?}", self);
        let (config, settle) = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let min = config.min_settle_time();
        info!("Minimum settle time: {:.6} s", min.as_secs_f64());
        if let Some(settle) = settle {
            config.check_settle_time(settle, false)?;
            info!("A settle time of {:.6} s is long enough", settle.as_secs_f64());
        }
        Ok(())
    }
}
