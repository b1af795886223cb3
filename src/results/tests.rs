// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    measure::{LoSetting, MeasureError},
    spectrometer::{FrequencyGrid, TestChannels},
    srr::SrrCurve,
    sweep::PowerPair,
};

fn measurement() -> SrrMeasurement {
    let grid = FrequencyGrid::new(80.0, 8).unwrap();
    let channels = TestChannels::from_list(8, vec![1, 5]).unwrap();
    let lo = LoSetting::pair(3.0, 1.0);
    let samples = |tone: Sideband| -> Vec<SweepSample> {
        channels
            .channels()
            .iter()
            .map(|&channel| {
                let if_mhz = grid.freqs_mhz()[channel];
                let power = match tone {
                    Sideband::Usb => PowerPair {
                        usb: 1e6,
                        lsb: 1e4,
                    },
                    Sideband::Lsb => PowerPair {
                        usb: 1e3,
                        lsb: 1e6,
                    },
                };
                SweepSample {
                    channel,
                    if_mhz,
                    rf_ghz: lo.rf_ghz(tone, if_mhz),
                    power,
                }
            })
            .collect()
    };
    let usb_samples = samples(Sideband::Usb);
    let lsb_samples = samples(Sideband::Lsb);
    SrrMeasurement {
        lo,
        rf: lo.rf_mapping(&grid),
        usb: SrrCurve::compute(&grid, &usb_samples, Sideband::Usb).unwrap(),
        lsb: SrrCurve::compute(&grid, &lsb_samples, Sideband::Lsb).unwrap(),
        usb_samples,
        lsb_samples,
    }
}

fn columns(line: &str) -> Vec<f64> {
    line.split_whitespace()
        .map(|c| c.parse().unwrap())
        .collect()
}

#[test]
fn test_write_srr() {
    let mut buf = vec![];
    write_srr(&mut buf, &measurement()).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("# LO1 3 GHz, LO2 1 GHz"));
    assert!(lines.next().unwrap().starts_with("# channel"));
    let rows: Vec<Vec<f64>> = lines.map(columns).collect();
    assert_eq!(rows.len(), 8);
    for (channel, row) in rows.iter().enumerate() {
        assert_eq!(row[0], channel as f64);
        assert_abs_diff_eq!(row[1], channel as f64 * 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(row[2], 4.0 + row[1] / 1e3, epsilon = 1e-9);
        assert_abs_diff_eq!(row[3], 2.0 - row[1] / 1e3, epsilon = 1e-9);
        assert_abs_diff_eq!(row[4], 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(row[5], 30.0, epsilon = 1e-4);
    }
}

#[test]
fn test_write_samples_in_dbfs() {
    let m = measurement();
    let config = SpectrometerConfig {
        acc_len: 1000,
        ..Default::default()
    };
    let mut buf = vec![];
    write_samples(&mut buf, &m.usb_samples, Sideband::Usb, config.acc_len, config.dbfs()).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let rows: Vec<Vec<f64>> = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(columns)
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], 1.0);
    assert_eq!(rows[1][0], 5.0);
    // 1e6 / 1000 + 1 = 1001.
    assert_abs_diff_eq!(rows[0][3], 1001f64.log10() * 10.0 - config.dbfs(), epsilon = 1e-4);
    assert_abs_diff_eq!(rows[0][4], 11f64.log10() * 10.0 - config.dbfs(), epsilon = 1e-4);
}

#[test]
fn test_text_result_writer() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = TextResultWriter::new(dir.path(), &SpectrometerConfig::default());
    writer.measurement(&measurement()).unwrap();
    let lo_dir = dir.path().join("lo1_3ghz_lo2_1ghz");
    for name in ["srr.txt", "samples_usb.txt", "samples_lsb.txt"] {
        assert!(lo_dir.join(name).exists(), "{name} is missing");
    }
    let srr = std::fs::read_to_string(lo_dir.join("srr.txt")).unwrap();
    assert_eq!(srr.lines().count(), 2 + 8);
}

#[test]
fn test_partial_results_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = TextResultWriter::new(dir.path(), &SpectrometerConfig::default());
    let m = measurement();
    let failed = FailedMeasurement {
        lo: LoSetting::single(5.0),
        usb_samples: m.usb_samples[..1].to_vec(),
        lsb_samples: vec![],
        error: MeasureError::MissingGenerator("LO1"),
    };
    writer.failure(&failed).unwrap();
    let partial = dir.path().join("lo_5ghz").join("samples_usb.partial.txt");
    let text = std::fs::read_to_string(partial).unwrap();
    assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 1);

    // Nothing recorded, nothing written.
    let failed = FailedMeasurement {
        lo: LoSetting::single(6.0),
        usb_samples: vec![],
        lsb_samples: vec![],
        error: MeasureError::MissingGenerator("LO1"),
    };
    writer.failure(&failed).unwrap();
    assert!(!dir.path().join("lo_6ghz").exists());
}
