// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Whole SRR measurement runs.

A run covers one or more LO settings. For each setting, calibration constants
may be (re)loaded, a tone is swept through the USB, then through the LSB, and
an SRR curve is computed for each sweep. Within an LO setting the USB sweep is
always finished (or has failed) before the LSB sweep starts.

Hardware is owned by a [`RunContext`]. Generator outputs are always switched
off at the end of a run, whether it succeeded or not.
 */

mod context;
mod error;

pub use context::{GeneratorSettings, RunContext};
pub use error::MeasureError;

use std::{fmt::Display, time::Instant};

use log::{debug, info, warn};
use vec1::Vec1;

use crate::{
    calibration::{
        CalibrationConstants, CalibrationError, CalibrationStore, CalibrationStoreError,
        ConstantSource,
    },
    fixed_point::FixedPointFormat,
    instrument::{FreqUnit, SignalGenerator},
    spectrometer::{FrequencyGrid, SpectrometerConfig},
    srr::SrrCurve,
    sweep::{Sideband, SweepAborted, SweepConfig, SweepObserver, SweepSample, ToneSweep},
};

/// The LO frequencies of one measurement. A receiver with a single LO has no
/// `lo2_ghz`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoSetting {
    /// \[GHz\]
    pub lo1_ghz: f64,

    /// \[GHz\]
    pub lo2_ghz: Option<f64>,
}

impl LoSetting {
    pub fn single(lo_ghz: f64) -> LoSetting {
        LoSetting {
            lo1_ghz: lo_ghz,
            lo2_ghz: None,
        }
    }

    pub fn pair(lo1_ghz: f64, lo2_ghz: f64) -> LoSetting {
        LoSetting {
            lo1_ghz,
            lo2_ghz: Some(lo2_ghz),
        }
    }

    /// The RF frequency that lands on `if_mhz` in `sideband` \[GHz\]:
    ///
    /// `RF_usb = LO1 + LO2 + IF`
    ///
    /// `RF_lsb = LO1 - LO2 - IF`
    pub fn rf_ghz(&self, sideband: Sideband, if_mhz: f64) -> f64 {
        let lo2 = self.lo2_ghz.unwrap_or(0.0);
        let if_ghz = if_mhz / 1e3;
        match sideband {
            Sideband::Usb => self.lo1_ghz + lo2 + if_ghz,
            Sideband::Lsb => self.lo1_ghz - lo2 - if_ghz,
        }
    }

    /// The RF frequency of every channel of `grid`, for both sidebands.
    pub fn rf_mapping(&self, grid: &FrequencyGrid) -> RfMapping {
        let map = |sb: Sideband| -> Vec<f64> {
            grid.freqs_mhz().iter().map(|&f| self.rf_ghz(sb, f)).collect()
        };
        RfMapping {
            usb_ghz: map(Sideband::Usb),
            lsb_ghz: map(Sideband::Lsb),
        }
    }

    /// The key under which calibration data for this setting is stored, e.g.
    /// "lo1_3ghz_lo2_1ghz".
    pub fn cal_key(&self) -> String {
        match self.lo2_ghz {
            Some(lo2) => format!("lo1_{}ghz_lo2_{}ghz", self.lo1_ghz, lo2),
            None => format!("lo_{}ghz", self.lo1_ghz),
        }
    }

    /// A short description for progress bars.
    pub fn short(&self) -> String {
        match self.lo2_ghz {
            Some(lo2) => format!("{}+{} GHz", self.lo1_ghz, lo2),
            None => format!("{} GHz", self.lo1_ghz),
        }
    }
}

impl Display for LoSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.lo2_ghz {
            Some(lo2) => write!(f, "LO1 {} GHz, LO2 {} GHz", self.lo1_ghz, lo2),
            None => write!(f, "LO {} GHz", self.lo1_ghz),
        }
    }
}

/// The RF frequency of every spectrometer channel \[GHz\].
#[derive(Debug, Clone, PartialEq)]
pub struct RfMapping {
    pub usb_ghz: Vec<f64>,
    pub lsb_ghz: Vec<f64>,
}

/// Which LO settings to measure.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementPlan {
    /// A single, externally-set LO.
    Single { lo_ghz: f64 },

    /// Every combination of LO1 and LO2, LO1 in the outer loop.
    Multi {
        lo1_ghz: Vec1<f64>,
        lo2_ghz: Vec1<f64>,
    },
}

impl MeasurementPlan {
    /// Every LO setting, in the order they are measured.
    pub fn lo_settings(&self) -> Vec<LoSetting> {
        match self {
            MeasurementPlan::Single { lo_ghz } => vec![LoSetting::single(*lo_ghz)],
            MeasurementPlan::Multi { lo1_ghz, lo2_ghz } => lo1_ghz
                .iter()
                .flat_map(|&lo1| lo2_ghz.iter().map(move |&lo2| LoSetting::pair(lo1, lo2)))
                .collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, MeasurementPlan::Multi { .. })
    }
}

/// When calibration constants are loaded into the FPGA.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantLoading {
    /// Use whatever is already loaded.
    Keep,

    /// Load these constants once, before anything is measured.
    Once(ConstantSource),

    /// Before each LO setting, load constants derived from the calibration
    /// data stored under that setting's key.
    PerLoSetting,
}

/// What to do when an LO setting fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Carry on with the next LO setting.
    Continue,

    /// Stop the run.
    Halt,
}

/// Everything needed for a run except the hardware.
pub struct MeasurementSettings {
    pub spectrometer: SpectrometerConfig,
    pub sweep: SweepConfig,
    pub generators: GeneratorSettings,
    pub consts_format: FixedPointFormat,
    pub calibration_epsilon: f64,
    pub constants: ConstantLoading,
    pub failure_policy: FailurePolicy,
    pub warn_saturation: bool,
}

/// The result of measuring one LO setting.
#[derive(Debug, Clone)]
pub struct SrrMeasurement {
    pub lo: LoSetting,
    pub rf: RfMapping,

    /// Samples with the tone in the USB.
    pub usb_samples: Vec<SweepSample>,

    /// Samples with the tone in the LSB.
    pub lsb_samples: Vec<SweepSample>,

    /// The SRR with the tone in the USB.
    pub usb: SrrCurve,

    /// The SRR with the tone in the LSB.
    pub lsb: SrrCurve,
}

/// An LO setting that couldn't be measured. Samples recorded before the
/// failure are kept.
#[derive(Debug)]
pub struct FailedMeasurement {
    pub lo: LoSetting,
    pub usb_samples: Vec<SweepSample>,
    pub lsb_samples: Vec<SweepSample>,
    pub error: MeasureError,
}

/// The results of a run, in the order the LO settings were measured.
#[derive(Debug, Default)]
pub struct MeasurementResults {
    pub outcomes: Vec<Result<SrrMeasurement, FailedMeasurement>>,

    /// Whether the run stopped early because of [`FailurePolicy::Halt`].
    pub halted: bool,
}

impl MeasurementResults {
    pub fn successes(&self) -> impl Iterator<Item = &SrrMeasurement> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedMeasurement> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }
}

/// Run a measurement plan on the hardware in `ctx`.
///
/// Errors returned here happened before anything was measured. Failures of
/// individual LO settings are in the results.
pub fn run_measurement(
    ctx: &mut RunContext,
    plan: &MeasurementPlan,
    settings: &MeasurementSettings,
    store: Option<&dyn CalibrationStore>,
    observers: &mut [&mut dyn SweepObserver],
) -> Result<MeasurementResults, MeasureError> {
    let start = Instant::now();
    if plan.is_multi() {
        if ctx.lo1.is_none() {
            return Err(MeasureError::MissingGenerator("LO1"));
        }
        if ctx.lo2.is_none() {
            return Err(MeasureError::MissingGenerator("LO2"));
        }
    }
    let nchannels = settings.sweep.grid.len();
    let once = match &settings.constants {
        ConstantLoading::Once(source) => Some(CalibrationConstants::from_source(
            source,
            nchannels,
            settings.calibration_epsilon,
        )?),
        _ => None,
    };

    // Whatever happens from here, switch the generators off at the end.
    let mut ctx = scopeguard::guard(ctx, |ctx| {
        if ctx.outputs_are_on() {
            info!("Switching off generator outputs");
            if let Err(e) = ctx.outputs_off() {
                warn!("Generator outputs may still be on: {e}");
            }
        }
    });
    ctx.prepare(
        &settings.spectrometer,
        &settings.sweep.layout,
        &settings.generators,
    )
    .map_err(MeasureError::Prepare)?;

    if let Some(consts) = once {
        consts.load(
            &mut *ctx.fpga,
            &settings.sweep.layout,
            settings.consts_format,
            settings.warn_saturation,
        )?;
    }

    let mut results = MeasurementResults::default();
    let mut current_lo1 = None;
    for lo in plan.lo_settings() {
        info!("Measuring with {lo}");
        let outcome =
            measure_lo_setting(&mut **ctx, lo, &mut current_lo1, settings, store, observers);
        if let Err(failed) = &outcome {
            warn!("Measurement with {lo} failed: {}", failed.error);
        }
        let failed = outcome.is_err();
        results.outcomes.push(outcome);
        if failed && settings.failure_policy == FailurePolicy::Halt {
            warn!("Halting the run");
            results.halted = true;
            break;
        }
    }

    summarise(&results);
    info!(
        "Finished {} LO setting(s). Total time: {:.1} s",
        results.outcomes.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(results)
}

fn retune(
    generator: &mut dyn SignalGenerator,
    name: &'static str,
    ghz: f64,
) -> Result<(), MeasureError> {
    debug!("Setting {name} to {ghz} GHz");
    generator
        .set_frequency(ghz, FreqUnit::GHz)
        .map_err(|err| MeasureError::Retune {
            generator: name,
            ghz,
            err,
        })
}

fn measure_lo_setting(
    ctx: &mut RunContext,
    lo: LoSetting,
    current_lo1: &mut Option<f64>,
    settings: &MeasurementSettings,
    store: Option<&dyn CalibrationStore>,
    observers: &mut [&mut dyn SweepObserver],
) -> Result<SrrMeasurement, FailedMeasurement> {
    let fail = |error: MeasureError| FailedMeasurement {
        lo,
        usb_samples: vec![],
        lsb_samples: vec![],
        error,
    };

    if let Some(lo2) = lo.lo2_ghz {
        // LO1 only changes in the outer loop.
        if *current_lo1 != Some(lo.lo1_ghz) {
            *current_lo1 = None;
            if let Some(generator) = ctx.lo1.as_deref_mut() {
                retune(generator, "LO1", lo.lo1_ghz).map_err(fail)?;
            }
            *current_lo1 = Some(lo.lo1_ghz);
        }
        if let Some(generator) = ctx.lo2.as_deref_mut() {
            retune(generator, "LO2", lo2).map_err(fail)?;
        }
    }

    if matches!(settings.constants, ConstantLoading::PerLoSetting) {
        load_stored_constants(ctx, &lo, settings, store).map_err(fail)?;
    }

    let usb_samples = match sweep(ctx, lo, Sideband::Usb, settings, observers) {
        Ok(s) => s,
        Err(aborted) => {
            return Err(FailedMeasurement {
                lo,
                usb_samples: aborted.samples.clone(),
                lsb_samples: vec![],
                error: MeasureError::Sweep(aborted),
            })
        }
    };
    let lsb_samples = match sweep(ctx, lo, Sideband::Lsb, settings, observers) {
        Ok(s) => s,
        Err(aborted) => {
            return Err(FailedMeasurement {
                lo,
                usb_samples,
                lsb_samples: aborted.samples.clone(),
                error: MeasureError::Sweep(aborted),
            })
        }
    };

    let grid = &settings.sweep.grid;
    let curves = SrrCurve::compute(grid, &usb_samples, Sideband::Usb).and_then(|usb| {
        SrrCurve::compute(grid, &lsb_samples, Sideband::Lsb).map(|lsb| (usb, lsb))
    });
    match curves {
        Ok((usb, lsb)) => Ok(SrrMeasurement {
            lo,
            rf: lo.rf_mapping(grid),
            usb_samples,
            lsb_samples,
            usb,
            lsb,
        }),
        Err(e) => Err(FailedMeasurement {
            lo,
            usb_samples,
            lsb_samples,
            error: e.into(),
        }),
    }
}

fn load_stored_constants(
    ctx: &mut RunContext,
    lo: &LoSetting,
    settings: &MeasurementSettings,
    store: Option<&dyn CalibrationStore>,
) -> Result<(), MeasureError> {
    let key = lo.cal_key();
    let store = store
        .ok_or_else(|| CalibrationError::from(CalibrationStoreError::Missing(key.clone())))?;
    info!("Loading constants for '{key}'");
    let powers = store.load(&key).map_err(CalibrationError::from)?;
    let consts = CalibrationConstants::from_source(
        &ConstantSource::Measured(powers),
        settings.sweep.grid.len(),
        settings.calibration_epsilon,
    )?;
    consts.load(
        &mut *ctx.fpga,
        &settings.sweep.layout,
        settings.consts_format,
        settings.warn_saturation,
    )?;
    Ok(())
}

fn sweep(
    ctx: &mut RunContext,
    lo: LoSetting,
    tone: Sideband,
    settings: &MeasurementSettings,
    observers: &mut [&mut dyn SweepObserver],
) -> Result<Vec<SweepSample>, SweepAborted> {
    let start = Instant::now();
    let mut sweep = ToneSweep::new(&mut *ctx.rf, &mut *ctx.fpga, &settings.sweep, lo, tone);
    for o in observers.iter_mut() {
        sweep = sweep.with_observer(&mut **o);
    }
    let result = sweep.run();
    debug!("{tone} sweep took {:.1} s", start.elapsed().as_secs_f64());
    result
}

/// Log the SRR range of every successful LO setting.
fn summarise(results: &MeasurementResults) {
    for m in results.successes() {
        for curve in [&m.usb, &m.lsb] {
            let s = curve.summary();
            info!(
                "{} SRR ({}): min {:.2} dB, mean {:.2} dB, max {:.2} dB",
                curve.tone, m.lo, s.min_db, s.mean_db, s.max_db
            );
        }
    }
    for f in results.failures() {
        warn!(
            "{}: failed with {} USB and {} LSB samples recorded",
            f.lo,
            f.usb_samples.len(),
            f.lsb_samples.len()
        );
    }
}
