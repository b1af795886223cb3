// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Things that watch a sweep as it happens. Observers can't influence the
//! sweep.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};

use super::{Sideband, SweepSample};
use crate::{instrument::Spectra, measure::LoSetting, PROGRESS_BARS};

/// A freshly recorded sample and the context it was recorded in.
#[derive(Debug)]
pub struct SweepUpdate<'a> {
    pub tone: Sideband,
    pub lo: &'a LoSetting,

    /// The position of the sample in the test channel list.
    pub index: usize,

    /// The number of test channels in the sweep.
    pub total: usize,

    pub sample: &'a SweepSample,

    /// The full spectra that the sample was taken from.
    pub spectra: &'a Spectra,

    /// The SRR at every test channel recorded so far \[dB\].
    pub srr_db: &'a [f64],
}

pub trait SweepObserver {
    fn started(&mut self, _tone: Sideband, _lo: &LoSetting, _num_channels: usize) {}

    fn recorded(&mut self, update: &SweepUpdate);

    /// `completed` is false if the sweep was aborted.
    fn finished(&mut self, _tone: Sideband, _num_samples: usize, _completed: bool) {}
}

/// Logs every sample at debug level.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SweepObserver for LogObserver {
    fn recorded(&mut self, update: &SweepUpdate) {
        let s = update.sample;
        debug!(
            "{} {}/{}: channel {:4} IF {:8.3} MHz RF {:.6} GHz USB {:.4e} LSB {:.4e} SRR {:.2} dB",
            update.tone,
            update.index + 1,
            update.total,
            s.channel,
            s.if_mhz,
            s.rf_ghz,
            s.power.usb,
            s.power.lsb,
            update.srr_db.last().copied().unwrap_or(f64::NAN)
        );
    }

    fn finished(&mut self, tone: Sideband, num_samples: usize, completed: bool) {
        if completed {
            info!("{tone} sweep finished with {num_samples} samples");
        }
    }
}

/// Draws a progress bar for each sweep, if progress bars are enabled.
#[derive(Debug, Default)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> ProgressObserver {
        ProgressObserver::default()
    }
}

impl SweepObserver for ProgressObserver {
    fn started(&mut self, tone: Sideband, lo: &LoSetting, num_channels: usize) {
        let target = if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let style = ProgressStyle::default_bar()
            .template(
                "{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} channels ({elapsed_precise}<{eta_precise})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::with_draw_target(Some(num_channels as u64), target)
            .with_style(style)
            .with_position(0)
            .with_message(format!("{tone} sweep {}", lo.short()));
        bar.tick();
        self.bar = Some(bar);
    }

    fn recorded(&mut self, update: &SweepUpdate) {
        if let Some(bar) = &self.bar {
            bar.set_position((update.index + 1) as u64);
        }
    }

    fn finished(&mut self, tone: Sideband, _num_samples: usize, completed: bool) {
        if let Some(bar) = self.bar.take() {
            if completed {
                bar.finish();
            } else {
                bar.abandon_with_message(format!("{tone} sweep aborted"));
            }
        }
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

impl<O: SweepObserver + ?Sized> SweepObserver for &mut O {
    fn started(&mut self, tone: Sideband, lo: &LoSetting, num_channels: usize) {
        (**self).started(tone, lo, num_channels)
    }

    fn recorded(&mut self, update: &SweepUpdate) {
        (**self).recorded(update)
    }

    fn finished(&mut self, tone: Sideband, num_samples: usize, completed: bool) {
        (**self).finished(tone, num_samples, completed)
    }
}
