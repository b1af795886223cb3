// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io::{Cursor, Write},
    rc::Rc,
};

use super::*;
use crate::{
    fixed_point::FixedPointFormat,
    instrument::sim::{GeneratorRole, SimulatedReceiver},
    spectrometer::SpectrometerConfig,
};

/// A writer whose contents can be inspected after it's been boxed.
#[derive(Clone, Default)]
struct SharedWriter(Rc<RefCell<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedWriter {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.borrow().clone())
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}

fn scpi(replies: &str) -> (ScpiGenerator, SharedWriter) {
    let writer = SharedWriter::default();
    let gen = ScpiGenerator::from_stream(
        "test gen",
        Cursor::new(replies.as_bytes().to_vec()),
        writer.clone(),
    );
    (gen, writer)
}

#[test]
fn test_parse_visa_resource() {
    assert_eq!(
        parse_visa_resource("TCPIP::192.168.1.34::INSTR").unwrap(),
        "192.168.1.34:5025"
    );
    assert_eq!(
        parse_visa_resource("TCPIP0::siggen.local::5000::SOCKET").unwrap(),
        "siggen.local:5000"
    );
    assert_eq!(
        parse_visa_resource("192.168.1.35:5025").unwrap(),
        "192.168.1.35:5025"
    );

    for bad in [
        "",
        "TCPIP::::INSTR",
        "TCPIP0::host::notaport::SOCKET",
        "GPIB0::12::INSTR",
        "host",
        "TCPIP::host::THING",
    ] {
        assert!(
            matches!(parse_visa_resource(bad), Err(InstrumentError::BadResource(_))),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn test_scpi_set_frequency_waits_for_ack() {
    let (mut gen, writer) = scpi("1\n+1\n");
    gen.set_frequency(3.5, FreqUnit::GHz).unwrap();
    gen.set_frequency(250.0, FreqUnit::MHz).unwrap();
    assert_eq!(
        writer.lines(),
        vec!["freq 3.5 ghz; *opc?", "freq 250 mhz; *opc?"]
    );
}

#[test]
fn test_scpi_bad_ack_is_an_error() {
    let (mut gen, _) = scpi("0\n");
    let result = gen.set_frequency(3.5, FreqUnit::GHz);
    match result {
        Err(InstrumentError::NoAcknowledgment { command, got, .. }) => {
            assert_eq!(command, "freq 3.5 ghz; *opc?");
            assert_eq!(got, "0");
        }
        _ => panic!("expected NoAcknowledgment, got {result:?}"),
    }
}

#[test]
fn test_scpi_no_reply_is_a_disconnection() {
    let (mut gen, _) = scpi("");
    let result = gen.set_frequency(3.5, FreqUnit::GHz);
    assert!(matches!(result, Err(InstrumentError::Disconnected { .. })));
}

#[test]
fn test_scpi_commands_without_replies() {
    let (mut gen, writer) = scpi("1\n");
    gen.set_power(7.0).unwrap();
    gen.set_multiplier(3.0).unwrap();
    gen.set_output(true).unwrap();
    gen.set_output(false).unwrap();
    gen.operation_complete().unwrap();
    assert_eq!(
        writer.lines(),
        vec!["power 7", "freq:mult 3", "outp on", "outp off", "*opc?"]
    );
}

/// An FPGA that hands out canned bram contents and a sequence of counter
/// values.
#[derive(Default)]
struct MockFpga {
    brams: HashMap<String, Vec<u8>>,
    registers: HashMap<String, u32>,
    counter: VecDeque<u32>,
}

impl Fpga for MockFpga {
    fn write_register(&mut self, name: &str, value: u32) -> Result<(), InstrumentError> {
        self.registers.insert(name.to_string(), value);
        Ok(())
    }

    fn read_register(&mut self, name: &str) -> Result<u32, InstrumentError> {
        if name == "acc_cnt" {
            return self
                .counter
                .pop_front()
                .ok_or_else(|| InstrumentError::UnknownDevice(name.to_string()));
        }
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| InstrumentError::UnknownDevice(name.to_string()))
    }

    fn read_raw(&mut self, name: &str, nbytes: usize) -> Result<Vec<u8>, InstrumentError> {
        self.brams
            .get(name)
            .map(|b| b.iter().copied().take(nbytes).collect())
            .ok_or_else(|| InstrumentError::UnknownDevice(name.to_string()))
    }

    fn write_raw(&mut self, name: &str, bytes: &[u8]) -> Result<(), InstrumentError> {
        self.brams.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Two brams of 4 u64 words each; bram `b` holds `10 * b + i` at address `i`.
fn two_bram_fpga(prefix: &str) -> (MockFpga, Vec<String>) {
    let mut fpga = MockFpga::default();
    let names: Vec<String> = (0..2).map(|b| format!("{prefix}{b}")).collect();
    for (b, name) in names.iter().enumerate() {
        let bytes = (0..4u64)
            .flat_map(|i| (10 * b as u64 + i).to_be_bytes())
            .collect();
        fpga.brams.insert(name.clone(), bytes);
    }
    (fpga, names)
}

#[test]
fn test_read_interleaved() {
    let (mut fpga, names) = two_bram_fpga("dout0_");
    let spectrum = read_interleaved(&mut fpga, &names, 2, 64, BramDataType::Unsigned).unwrap();
    assert_eq!(spectrum, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0, 3.0, 13.0]);
}

#[test]
fn test_read_block_signed() {
    let mut fpga = MockFpga::default();
    let bytes = [-3i64, 5].iter().flat_map(|w| w.to_be_bytes()).collect();
    fpga.brams.insert("cross".to_string(), bytes);
    let words = fpga
        .read_block("cross", 1, 64, BramDataType::Signed)
        .unwrap();
    assert_eq!(words, vec![-3.0, 5.0]);
}

#[test]
fn test_short_block_is_an_error() {
    let (mut fpga, names) = two_bram_fpga("dout0_");
    // Ask for 8 words per bram when there are only 4.
    let result = read_interleaved(&mut fpga, &names, 3, 64, BramDataType::Unsigned);
    match result {
        Err(InstrumentError::BadBlockSize {
            name,
            expected,
            got,
        }) => {
            assert_eq!(name, "dout0_0");
            assert_eq!(expected, 64);
            assert_eq!(got, 32);
        }
        _ => panic!("expected BadBlockSize, got {result:?}"),
    }
}

#[test]
fn test_bad_word_width() {
    let (mut fpga, names) = two_bram_fpga("dout0_");
    let result = read_interleaved(&mut fpga, &names, 2, 12, BramDataType::Unsigned);
    assert!(matches!(result, Err(InstrumentError::BadWordWidth(12))));
}

#[test]
fn test_write_interleaved() {
    let mut fpga = MockFpga::default();
    let names: Vec<String> = (0..2).map(|b| format!("bram_mult0_{b}_bram_re")).collect();
    write_interleaved(&mut fpga, &names, &[1, -1, 2, -2, 3, -3], 4).unwrap();
    assert_eq!(
        fpga.brams["bram_mult0_0_bram_re"],
        vec![0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
    );
    assert_eq!(
        fpga.brams["bram_mult0_1_bram_re"],
        vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe, 0xff, 0xff, 0xff, 0xfd]
    );

    let result = write_interleaved(&mut fpga, &names, &[1, 2, 3], 4);
    assert!(matches!(
        result,
        Err(InstrumentError::BadInterleave {
            got: 3,
            num_brams: 2
        })
    ));
}

fn mock_layout() -> FpgaLayout {
    let mut layout = FpgaLayout::with_num_brams(2);
    layout.acc_count_reg = Some("acc_cnt".to_string());
    layout
}

#[test]
fn test_spectra_read_within_one_accumulation() {
    let (mut fpga, _) = two_bram_fpga("dout0_");
    let (lsb, _) = two_bram_fpga("dout1_");
    fpga.brams.extend(lsb.brams);
    fpga.counter = VecDeque::from(vec![5, 5]);
    let spectra = Spectra::read(&mut fpga, &mock_layout(), 2).unwrap();
    assert_eq!(spectra.usb, spectra.lsb);
    assert_eq!(spectra.usb.len(), 8);
    assert!(fpga.counter.is_empty());
}

#[test]
fn test_torn_spectra_read_is_not_retried() {
    let (mut fpga, _) = two_bram_fpga("dout0_");
    let (lsb, _) = two_bram_fpga("dout1_");
    fpga.brams.extend(lsb.brams);
    fpga.counter = VecDeque::from(vec![4, 5, 5, 5]);
    let result = Spectra::read(&mut fpga, &mock_layout(), 2);
    assert!(matches!(
        result,
        Err(InstrumentError::TornRead {
            before: 4,
            after: 5
        })
    ));
    // Only one pair of counter reads happened.
    assert_eq!(fpga.counter, VecDeque::from(vec![5, 5]));
}

#[test]
fn test_default_layout_names() {
    let layout = FpgaLayout::default();
    assert_eq!(layout.acc_len_reg, "syn_acc_len");
    assert_eq!(layout.cnt_rst_reg, "cnt_rst");
    assert_eq!(layout.usb_power_brams.len(), 8);
    assert_eq!(layout.usb_power_brams[7], "dout0_7");
    assert_eq!(layout.lsb_power_brams[0], "dout1_0");
    assert_eq!(layout.consts_usb_re_brams[3], "bram_mult0_3_bram_re");
    assert_eq!(layout.consts_lsb_im_brams[0], "bram_mult1_0_bram_im");
}

fn small_receiver() -> SimulatedReceiver {
    let config = SpectrometerConfig {
        bram_addr_width: 4,
        num_brams: 4,
        acc_len: 16,
        ..Default::default()
    };
    SimulatedReceiver::new(
        config,
        FpgaLayout::with_num_brams(4),
        FixedPointFormat::default(),
        5.0,
    )
}

#[test]
fn test_simulated_tone_lands_in_the_right_channel() {
    let receiver = small_receiver();
    let mut fpga = receiver.fpga();
    let mut rf = receiver.generator(GeneratorRole::Rf);
    let layout = FpgaLayout::with_num_brams(4);
    // 64 channels over 1080 MHz: channel 10 is at 168.75 MHz.
    rf.set_frequency(5.0 + 168.75e-3, FreqUnit::GHz).unwrap();
    rf.set_output(true).unwrap();

    let spectra = Spectra::read(&mut fpga, &layout, 4).unwrap();
    let (peak, _) = spectra
        .usb
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    assert_eq!(peak, 10);
    // With no constants loaded, both outputs see the tone equally well.
    assert!(spectra.lsb[10] > 100.0 * spectra.lsb[9]);

    // The same IF in the LSB.
    rf.set_frequency(5.0 - 168.75e-3, FreqUnit::GHz).unwrap();
    let spectra = Spectra::read(&mut fpga, &layout, 4).unwrap();
    assert!(spectra.usb[10] > 100.0 * spectra.usb[9]);

    rf.set_output(false).unwrap();
    let spectra = Spectra::read(&mut fpga, &layout, 4).unwrap();
    assert_eq!(spectra.usb[10], spectra.usb[9]);
}

#[test]
fn test_simulated_ack_failure() {
    let receiver = small_receiver();
    receiver.fail_acknowledgment_on(GeneratorRole::Rf, 2);
    let mut rf = receiver.generator(GeneratorRole::Rf);
    assert!(rf.set_frequency(5.1, FreqUnit::GHz).is_ok());
    assert!(matches!(
        rf.set_frequency(5.2, FreqUnit::GHz),
        Err(InstrumentError::NoAcknowledgment { .. })
    ));
    // The failed set doesn't retune.
    assert_eq!(receiver.frequency_ghz(GeneratorRole::Rf), Some(5.1));
    assert!(rf.set_frequency(5.3, FreqUnit::GHz).is_ok());
}

#[test]
fn test_simulated_fpga_rejects_unknown_names() {
    let receiver = small_receiver();
    let mut fpga = receiver.fpga();
    assert!(matches!(
        fpga.write_register("nope", 1),
        Err(InstrumentError::UnknownDevice(_))
    ));
    assert!(matches!(
        fpga.read_raw("nope", 8),
        Err(InstrumentError::UnknownDevice(_))
    ));
    fpga.write_register("syn_acc_len", 32).unwrap();
    assert_eq!(receiver.register("syn_acc_len"), Some(32));
}
