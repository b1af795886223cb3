// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A simulated DSS receiver, FPGA and set of signal generators.

All handles made from one [`SimulatedReceiver`] share its state, so tuning a
simulated generator moves the tone seen by the simulated FPGA. The receiver's
two IF paths have a small, channel-dependent gain and phase imbalance, so
ideal constants give a finite rejection and measured constants (from
[`SimulatedReceiver::auto_cross_powers`]) give a much better one.

Every hardware operation is recorded as a [`SimEvent`] so that the order of
operations can be inspected.
 */

use std::{
    cell::{RefCell, RefMut},
    collections::HashMap,
    rc::Rc,
};

use byteorder::{BigEndian, ByteOrder};
use log::trace;
use ndarray::Array1;
use strum_macros::Display;

use super::{Fpga, FpgaLayout, FreqUnit, InstrumentError, SignalGenerator};
use crate::{
    c64, calibration::AutoCrossPowerSet, constants::TAU, fixed_point::FixedPointFormat,
    spectrometer::SpectrometerConfig,
};

/// What a simulated generator is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum GeneratorRole {
    /// The test tone.
    #[strum(serialize = "RF")]
    Rf,
    #[strum(serialize = "LO1")]
    Lo1,
    #[strum(serialize = "LO2")]
    Lo2,
}

/// Something that happened to the simulated hardware.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    SetFrequency { role: GeneratorRole, ghz: f64 },
    SetPower { role: GeneratorRole, dbm: f64 },
    SetMultiplier { role: GeneratorRole, multiplier: f64 },
    SetOutput { role: GeneratorRole, on: bool },
    WriteRegister { name: String, value: u32 },
    ReadBram { name: String },
    WriteBram { name: String },
}

#[derive(Debug, Clone, Default)]
struct GeneratorState {
    freq_ghz: f64,
    power_dbm: f64,
    multiplier: f64,
    on: bool,
    /// Fail acknowledgment of the n-th (1-based) frequency set.
    fail_on_set: Option<usize>,
    num_sets: usize,
}

#[derive(Debug)]
struct SimState {
    config: SpectrometerConfig,
    layout: FpgaLayout,
    format: FixedPointFormat,
    /// The LO frequency used when no LO generators are simulated \[GHz\].
    fixed_lo_ghz: f64,
    generators: HashMap<GeneratorRole, GeneratorState>,
    registers: HashMap<String, u32>,
    brams: HashMap<String, Vec<u8>>,
    noise_floor: f64,
    events: Vec<SimEvent>,
}

/// The shared state of a simulated receiver.
#[derive(Debug, Clone)]
pub struct SimulatedReceiver(Rc<RefCell<SimState>>);

/// Linear amplitude of the test tone at 0 dBm, in spectrometer units.
const TONE_AMPLITUDE: f64 = 1e3;

/// Relative gain imbalance between the IF paths.
const GAIN_IMBALANCE: f64 = 0.05;

/// Phase imbalance between the IF paths \[radians\].
const PHASE_IMBALANCE: f64 = 0.04;

impl SimulatedReceiver {
    /// A receiver whose single LO is fixed at `fixed_lo_ghz` (unless LO
    /// generators are made and switched on).
    pub fn new(
        config: SpectrometerConfig,
        layout: FpgaLayout,
        format: FixedPointFormat,
        fixed_lo_ghz: f64,
    ) -> SimulatedReceiver {
        let mut registers = HashMap::new();
        registers.insert(layout.acc_len_reg.clone(), config.acc_len);
        registers.insert(layout.cnt_rst_reg.clone(), 0);
        if let Some(reg) = &layout.acc_count_reg {
            registers.insert(reg.clone(), 0);
        }
        let mut brams = HashMap::new();
        let word_bytes = format.word_bytes();
        for name in layout
            .consts_usb_re_brams
            .iter()
            .chain(layout.consts_usb_im_brams.iter())
            .chain(layout.consts_lsb_re_brams.iter())
            .chain(layout.consts_lsb_im_brams.iter())
        {
            brams.insert(name.clone(), vec![0; config.words_per_bram() * word_bytes]);
        }

        SimulatedReceiver(Rc::new(RefCell::new(SimState {
            config,
            layout,
            format,
            fixed_lo_ghz,
            generators: HashMap::new(),
            registers,
            brams,
            noise_floor: 1.0,
            events: vec![],
        })))
    }

    /// A handle to the simulated FPGA.
    pub fn fpga(&self) -> SimulatedFpga {
        SimulatedFpga(self.clone())
    }

    /// A handle to a simulated generator.
    pub fn generator(&self, role: GeneratorRole) -> SimulatedGenerator {
        self.0.borrow_mut().generators.entry(role).or_default();
        SimulatedGenerator {
            name: format!("simulated {role} generator"),
            role,
            receiver: self.clone(),
        }
    }

    /// Make the `n`-th (1-based) frequency set of a generator go
    /// unacknowledged.
    pub fn fail_acknowledgment_on(&self, role: GeneratorRole, n: usize) {
        self.0
            .borrow_mut()
            .generators
            .entry(role)
            .or_default()
            .fail_on_set = Some(n);
    }

    /// Everything that has happened so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().events.clone()
    }

    pub fn register(&self, name: &str) -> Option<u32> {
        self.0.borrow().registers.get(name).copied()
    }

    pub fn output_on(&self, role: GeneratorRole) -> bool {
        self.0
            .borrow()
            .generators
            .get(&role)
            .map(|g| g.on)
            .unwrap_or(false)
    }

    /// The frequency of a generator \[GHz\].
    pub fn frequency_ghz(&self, role: GeneratorRole) -> Option<f64> {
        self.0.borrow().generators.get(&role).map(|g| g.freq_ghz)
    }

    /// Powers as a correlating calibration would measure them: a tone of the
    /// current RF power in each channel of the USB, and then of the LSB.
    pub fn auto_cross_powers(&self) -> AutoCrossPowerSet {
        let state = self.0.borrow();
        let n = state.config.nchannels();
        let s2 = state.tone_amplitude().powi(2);
        let gains_usb: Vec<c64> = (0..n).map(|k| usb_gain(k, n)).collect();
        let gains_lsb: Vec<c64> = (0..n).map(|k| lsb_gain(k, n)).collect();

        // A = s, B = g s, so |A|² = s², |B|² = |g|² s², A B* = s² conj(g).
        AutoCrossPowerSet {
            a2_usb: Array1::from_elem(n, s2),
            a2_lsb: Array1::from_elem(n, s2),
            b2_usb: gains_usb.iter().map(|g| g.norm_sqr() * s2).collect(),
            b2_lsb: gains_lsb.iter().map(|g| g.norm_sqr() * s2).collect(),
            ab_usb: gains_usb.iter().map(|g| g.conj() * s2).collect(),
            ab_lsb: gains_lsb.iter().map(|g| g.conj() * s2).collect(),
        }
    }
}

/// Path B's response relative to path A for a tone in the USB.
fn usb_gain(channel: usize, nchannels: usize) -> c64 {
    let x = TAU * channel as f64 / nchannels as f64;
    let gain = 1.0 + GAIN_IMBALANCE * x.sin();
    let phase = PHASE_IMBALANCE * x.cos();
    -c64::i() * c64::from_polar(gain, phase)
}

/// Path B's response relative to path A for a tone in the LSB.
fn lsb_gain(channel: usize, nchannels: usize) -> c64 {
    let x = TAU * channel as f64 / nchannels as f64;
    let gain = 1.0 + 0.6 * GAIN_IMBALANCE * x.cos();
    let phase = PHASE_IMBALANCE * x.sin();
    c64::i() * c64::from_polar(gain, phase)
}

impl SimState {
    fn tone_amplitude(&self) -> f64 {
        let dbm = self
            .generators
            .get(&GeneratorRole::Rf)
            .map(|g| g.power_dbm)
            .unwrap_or(0.0);
        TONE_AMPLITUDE * 10f64.powf(dbm / 20.0)
    }

    /// Which channel and sideband the tone falls in, if it's on and in the
    /// band. `true` means USB. The sideband is decided by LO1 (or the fixed
    /// LO); LO2, if on, then shifts the first IF down.
    fn tone(&self) -> Option<(usize, bool)> {
        let on = |role| self.generators.get(&role).filter(|g| g.on);
        let rf = on(GeneratorRole::Rf)?;
        let lo1 = on(GeneratorRole::Lo1).map_or(self.fixed_lo_ghz, |g| g.freq_ghz);
        let lo2 = on(GeneratorRole::Lo2).map_or(0.0, |g| g.freq_ghz);
        let if1_ghz = rf.freq_ghz - lo1;
        let if_mhz = (if1_ghz.abs() - lo2) * 1e3;
        let spacing = self.config.bandwidth_mhz / self.config.nchannels() as f64;
        let channel = (if_mhz / spacing).round();
        if channel < 0.0 || channel >= self.config.nchannels() as f64 {
            return None;
        }
        Some((channel as usize, if1_ghz >= 0.0))
    }

    /// Decode a constant from the constant brams.
    fn constant(&self, re_brams: &[String], im_brams: &[String], channel: usize) -> c64 {
        let word_bytes = self.format.word_bytes();
        let read = |brams: &[String]| {
            let n = brams.len();
            let addr = channel / n;
            self.brams
                .get(&brams[channel % n])
                .and_then(|b| b.get(addr * word_bytes..(addr + 1) * word_bytes))
                .map(|bytes| {
                    let word = BigEndian::read_int(bytes, word_bytes);
                    self.format.to_float(word)
                })
                .unwrap_or(0.0)
        };
        c64::new(read(re_brams), read(im_brams))
    }

    /// The USB and LSB output power spectra for the current state.
    fn spectra(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.config.nchannels();
        let acc_len = f64::from(
            self.registers
                .get(&self.layout.acc_len_reg)
                .copied()
                .unwrap_or(self.config.acc_len),
        );
        let floor = self.noise_floor * acc_len;
        let mut usb = vec![floor; n];
        let mut lsb = vec![floor; n];
        if let Some((channel, in_usb)) = self.tone() {
            let a = c64::new(self.tone_amplitude(), 0.0);
            let b = a * if in_usb {
                usb_gain(channel, n)
            } else {
                lsb_gain(channel, n)
            };
            let layout = &self.layout;
            let c_usb = self.constant(
                &layout.consts_usb_re_brams,
                &layout.consts_usb_im_brams,
                channel,
            );
            let c_lsb = self.constant(
                &layout.consts_lsb_re_brams,
                &layout.consts_lsb_im_brams,
                channel,
            );
            usb[channel] += (a + c_usb * b).norm_sqr() * acc_len;
            lsb[channel] += (c_lsb * a + b).norm_sqr() * acc_len;
        }
        (usb, lsb)
    }
}

/// A simulated signal generator.
#[derive(Debug, Clone)]
pub struct SimulatedGenerator {
    name: String,
    role: GeneratorRole,
    receiver: SimulatedReceiver,
}

impl SimulatedGenerator {
    fn with_state<T>(&self, f: impl FnOnce(&mut GeneratorState) -> T) -> T {
        let mut state = self.receiver.0.borrow_mut();
        f(state.generators.entry(self.role).or_default())
    }

    fn record(&self, event: SimEvent) {
        trace!("{}: {event:?}", self.name);
        self.receiver.0.borrow_mut().events.push(event);
    }
}

impl SignalGenerator for SimulatedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_frequency(&mut self, value: f64, unit: FreqUnit) -> Result<(), InstrumentError> {
        let ghz = match unit {
            FreqUnit::Hz => value / 1e9,
            FreqUnit::KHz => value / 1e6,
            FreqUnit::MHz => value / 1e3,
            FreqUnit::GHz => value,
        };
        let acknowledged = self.with_state(|g| {
            g.num_sets += 1;
            if g.fail_on_set == Some(g.num_sets) {
                false
            } else {
                g.freq_ghz = ghz;
                true
            }
        });
        if !acknowledged {
            return Err(InstrumentError::NoAcknowledgment {
                instrument: self.name.clone(),
                command: format!("freq {value} {unit}; *opc?"),
                got: String::new(),
            });
        }
        self.record(SimEvent::SetFrequency {
            role: self.role,
            ghz,
        });
        Ok(())
    }

    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.with_state(|g| g.power_dbm = dbm);
        self.record(SimEvent::SetPower {
            role: self.role,
            dbm,
        });
        Ok(())
    }

    fn set_multiplier(&mut self, multiplier: f64) -> Result<(), InstrumentError> {
        self.with_state(|g| g.multiplier = multiplier);
        self.record(SimEvent::SetMultiplier {
            role: self.role,
            multiplier,
        });
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.with_state(|g| g.on = on);
        self.record(SimEvent::SetOutput {
            role: self.role,
            on,
        });
        Ok(())
    }

    fn operation_complete(&mut self) -> Result<(), InstrumentError> {
        Ok(())
    }
}

/// A simulated FPGA running the DSS spectrometer model.
#[derive(Debug, Clone)]
pub struct SimulatedFpga(SimulatedReceiver);

impl SimulatedFpga {
    fn state(&self) -> RefMut<'_, SimState> {
        self.0 .0.borrow_mut()
    }
}

impl Fpga for SimulatedFpga {
    fn write_register(&mut self, name: &str, value: u32) -> Result<(), InstrumentError> {
        let mut state = self.state();
        match state.registers.get_mut(name) {
            Some(r) => *r = value,
            None => return Err(InstrumentError::UnknownDevice(name.to_string())),
        }
        state.events.push(SimEvent::WriteRegister {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn read_register(&mut self, name: &str) -> Result<u32, InstrumentError> {
        self.state()
            .registers
            .get(name)
            .copied()
            .ok_or_else(|| InstrumentError::UnknownDevice(name.to_string()))
    }

    fn read_raw(&mut self, name: &str, nbytes: usize) -> Result<Vec<u8>, InstrumentError> {
        let mut state = self.state();
        state.events.push(SimEvent::ReadBram {
            name: name.to_string(),
        });

        if let Some(bytes) = state.brams.get(name) {
            return Ok(bytes.iter().copied().take(nbytes).collect());
        }

        let layout = &state.layout;
        let (brams, usb) = if let Some(b) = layout.usb_power_brams.iter().position(|n| n == name)
        {
            (b, true)
        } else if let Some(b) = layout.lsb_power_brams.iter().position(|n| n == name) {
            (b, false)
        } else {
            return Err(InstrumentError::UnknownDevice(name.to_string()));
        };
        let num_brams = layout.usb_power_brams.len();
        let word_bytes = (layout.power_word_width / 8).clamp(1, 8) as usize;
        let max_word = u64::MAX >> (64 - 8 * word_bytes);
        let (usb_spec, lsb_spec) = state.spectra();
        let spectrum = if usb { usb_spec } else { lsb_spec };
        let mut bytes = vec![0; spectrum.len() / num_brams * word_bytes];
        for (i, chunk) in bytes.chunks_exact_mut(word_bytes).enumerate() {
            let power = (spectrum[i * num_brams + brams].round().max(0.0) as u64).min(max_word);
            BigEndian::write_uint(chunk, power, word_bytes);
        }
        bytes.truncate(nbytes);
        Ok(bytes)
    }

    fn write_raw(&mut self, name: &str, bytes: &[u8]) -> Result<(), InstrumentError> {
        let mut state = self.state();
        match state.brams.get_mut(name) {
            Some(b) => {
                let n = bytes.len().min(b.len());
                b[..n].copy_from_slice(&bytes[..n]);
            }
            None => return Err(InstrumentError::UnknownDevice(name.to_string())),
        }
        state.events.push(SimEvent::WriteBram {
            name: name.to_string(),
        });
        Ok(())
    }
}
