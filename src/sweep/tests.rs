// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    fixed_point::FixedPointFormat,
    instrument::sim::{GeneratorRole, SimEvent, SimulatedReceiver},
};

fn small_config() -> SpectrometerConfig {
    SpectrometerConfig {
        bram_addr_width: 4,
        num_brams: 4,
        acc_len: 16,
        ..Default::default()
    }
}

/// 64 channels with tones in channels 1, 9, ..., 57.
fn setup() -> (SimulatedReceiver, SweepConfig) {
    let config = small_config();
    let layout = FpgaLayout::with_num_brams(4);
    let receiver =
        SimulatedReceiver::new(config, layout.clone(), FixedPointFormat::default(), 5.0);
    let channels = TestChannels::from_step(config.nchannels(), 1, 8).unwrap();
    let sweep_config =
        SweepConfig::new(&config, layout, channels, Duration::ZERO, true).unwrap();
    (receiver, sweep_config)
}

#[derive(Default)]
struct Recorder {
    started: usize,
    channels: Vec<usize>,
    srr_lengths: Vec<usize>,
    spectrum_lengths: Vec<usize>,
    finished: Option<(usize, bool)>,
}

impl SweepObserver for Recorder {
    fn started(&mut self, _tone: Sideband, _lo: &LoSetting, num_channels: usize) {
        self.started = num_channels;
    }

    fn recorded(&mut self, update: &SweepUpdate) {
        self.channels.push(update.sample.channel);
        self.srr_lengths.push(update.srr_db.len());
        self.spectrum_lengths.push(update.spectra.usb.len());
    }

    fn finished(&mut self, _tone: Sideband, num_samples: usize, completed: bool) {
        self.finished = Some((num_samples, completed));
    }
}

#[test]
fn test_full_usb_sweep() {
    let (receiver, config) = setup();
    let mut rf = receiver.generator(GeneratorRole::Rf);
    rf.set_output(true).unwrap();
    let mut fpga = receiver.fpga();
    let mut recorder = Recorder::default();

    let samples = ToneSweep::new(
        &mut rf,
        &mut fpga,
        &config,
        LoSetting::single(5.0),
        Sideband::Usb,
    )
    .with_observer(&mut recorder)
    .run()
    .unwrap();

    assert_eq!(samples.len(), 8);
    let channels: Vec<usize> = samples.iter().map(|s| s.channel).collect();
    assert_eq!(channels, vec![1, 9, 17, 25, 33, 41, 49, 57]);
    for s in &samples {
        assert_abs_diff_eq!(s.if_mhz, s.channel as f64 * 1080.0 / 64.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.rf_ghz, 5.0 + s.if_mhz / 1e3, epsilon = 1e-12);
        // No constants are loaded, so both outputs see the tone.
        assert!(s.signal(Sideband::Usb) > 1000.0);
        assert!(s.image(Sideband::Usb) > 1000.0);
    }

    assert_eq!(recorder.started, 8);
    assert_eq!(recorder.channels, channels);
    assert_eq!(recorder.srr_lengths, (1..=8).collect::<Vec<_>>());
    assert!(recorder.spectrum_lengths.iter().all(|&l| l == 64));
    assert_eq!(recorder.finished, Some((8, true)));
}

#[test]
fn test_lsb_sweep_tunes_below_the_lo() {
    let (receiver, config) = setup();
    let mut rf = receiver.generator(GeneratorRole::Rf);
    rf.set_output(true).unwrap();
    let mut fpga = receiver.fpga();
    let samples = ToneSweep::new(
        &mut rf,
        &mut fpga,
        &config,
        LoSetting::single(5.0),
        Sideband::Lsb,
    )
    .run()
    .unwrap();
    assert_eq!(samples.len(), 8);
    for s in &samples {
        assert_abs_diff_eq!(s.rf_ghz, 5.0 - s.if_mhz / 1e3, epsilon = 1e-12);
    }
    assert_eq!(
        receiver.frequency_ghz(GeneratorRole::Rf),
        Some(samples[7].rf_ghz)
    );
}

#[test]
fn test_failed_ack_keeps_partial_samples() {
    let (receiver, config) = setup();
    receiver.fail_acknowledgment_on(GeneratorRole::Rf, 5);
    let mut rf = receiver.generator(GeneratorRole::Rf);
    rf.set_output(true).unwrap();
    let mut fpga = receiver.fpga();
    let mut recorder = Recorder::default();

    let result = ToneSweep::new(
        &mut rf,
        &mut fpga,
        &config,
        LoSetting::single(5.0),
        Sideband::Usb,
    )
    .with_observer(&mut recorder)
    .run();

    let aborted = match result {
        Err(a) => a,
        Ok(s) => panic!("expected the sweep to abort, but got {} samples", s.len()),
    };
    assert_eq!(aborted.samples.len(), 4);
    assert_eq!(aborted.channel, 33);
    assert_eq!(aborted.tone, Sideband::Usb);
    assert!(matches!(
        aborted.error,
        InstrumentError::NoAcknowledgment { .. }
    ));
    assert_eq!(recorder.finished, Some((4, false)));
}

#[test]
fn test_no_read_before_the_generator_confirms() {
    let (receiver, config) = setup();
    let mut rf = receiver.generator(GeneratorRole::Rf);
    let mut fpga = receiver.fpga();
    ToneSweep::new(
        &mut rf,
        &mut fpga,
        &config,
        LoSetting::single(5.0),
        Sideband::Usb,
    )
    .run()
    .unwrap();

    // Each channel is a retune followed by reads of all 8 power brams.
    let events = receiver.events();
    assert_eq!(events.len(), 8 * 9);
    for chunk in events.chunks(9) {
        assert!(matches!(chunk[0], SimEvent::SetFrequency { .. }));
        assert!(chunk[1..]
            .iter()
            .all(|e| matches!(e, SimEvent::ReadBram { .. })));
    }
}

#[test]
fn test_step_by_step() {
    let (receiver, config) = setup();
    let mut rf = receiver.generator(GeneratorRole::Rf);
    let mut fpga = receiver.fpga();
    let mut sweep = ToneSweep::new(
        &mut rf,
        &mut fpga,
        &config,
        LoSetting::single(5.0),
        Sideband::Usb,
    );
    assert_eq!(sweep.state(), SweepState::Idle);
    let expected = [
        SweepState::SettingFrequency { index: 0 },
        SweepState::Settling { index: 0 },
        SweepState::Reading { index: 0 },
        SweepState::Recorded { index: 0 },
        SweepState::SettingFrequency { index: 1 },
    ];
    for state in expected {
        assert_eq!(sweep.step().unwrap(), state);
    }
    assert_eq!(sweep.samples().len(), 1);

    while sweep.step().unwrap() != SweepState::Done {}
    assert_eq!(sweep.samples().len(), 8);
    // Done is terminal.
    assert_eq!(sweep.step().unwrap(), SweepState::Done);
}

#[test]
fn test_sweep_config_checks_settle_time() {
    let config = small_config();
    let slow = SpectrometerConfig {
        acc_len: 1 << 16,
        ..SpectrometerConfig::default()
    };
    let channels = TestChannels::from_step(slow.nchannels(), 1, 256).unwrap();
    let result = SweepConfig::new(
        &slow,
        FpgaLayout::default(),
        channels.clone(),
        Duration::from_millis(10),
        false,
    );
    assert!(matches!(
        result,
        Err(ConfigurationError::SettleTooShort { .. })
    ));
    assert!(SweepConfig::new(
        &slow,
        FpgaLayout::default(),
        channels,
        Duration::from_millis(10),
        true
    )
    .is_ok());

    // Test channels beyond the grid.
    let channels = TestChannels::from_step(2048, 1, 256).unwrap();
    assert!(matches!(
        SweepConfig::new(
            &config,
            FpgaLayout::with_num_brams(4),
            channels,
            Duration::ZERO,
            true
        ),
        Err(ConfigurationError::TestChannelOutOfRange { .. })
    ));

    // Layout doesn't match the spectrometer.
    let channels = TestChannels::from_step(64, 1, 8).unwrap();
    assert!(matches!(
        SweepConfig::new(&config, FpgaLayout::default(), channels, Duration::ZERO, true),
        Err(ConfigurationError::LengthMismatch { .. })
    ));
}

#[test]
fn test_sideband_strings() {
    assert_eq!(Sideband::Usb.to_string(), "USB");
    assert_eq!("LSB".parse::<Sideband>().unwrap(), Sideband::Lsb);
    assert_eq!(Sideband::Usb.other(), Sideband::Lsb);
}
