// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{io::Write, path::Path};

use indoc::indoc;
use tempfile::TempDir;

use dss_srr::{
    calibration::{CalibrationStore, DirectoryStore},
    instrument::{sim::SimulatedReceiver, FpgaLayout},
    FixedPointFormat, LoSetting, SpectrometerConfig,
};

use crate::*;

/// Parse the SRR rows written for `channels`: (USB SRR, LSB SRR) in dB.
fn read_srr(file: &Path, channels: &[usize]) -> Vec<(f64, f64)> {
    let contents = std::fs::read_to_string(file).unwrap();
    contents
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .filter(|cols| channels.contains(&cols[0].parse::<usize>().unwrap()))
        .map(|cols| (cols[4].parse().unwrap(), cols[5].parse().unwrap()))
        .collect()
}

#[test]
fn test_measure_needs_hardware() {
    let cmd = dss_srr().args(["measure", "--lo", "3", "--dry-run"]).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No FPGA transport available"), "{stderr}");
}

#[test]
fn test_measure_dry_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("results");
    let cmd = dss_srr()
        .args(["measure", "--simulate", "--lo", "3", "--dry-run", "--no-progress-bars"])
        .args(SMALL_SPECTROMETER)
        .args(["--settle-time", "0.00001", "-o"])
        .arg(&out)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run -- exiting now."), "{stdout}");
    assert!(!out.exists());
}

#[test]
fn test_measure_single_lo() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("results");
    let cmd = dss_srr()
        .args(["measure", "--simulate", "--lo", "3", "--no-progress-bars"])
        .args(SMALL_SPECTROMETER)
        .args(["--settle-time", "0.00001", "--channel-step", "8", "-o"])
        .arg(&out)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));

    let dir = out.join(LoSetting::single(3.0).cal_key());
    for file in ["srr.txt", "samples_usb.txt", "samples_lsb.txt"] {
        assert!(dir.join(file).exists(), "{file} is missing");
    }
    let contents = std::fs::read_to_string(dir.join("srr.txt")).unwrap();
    assert!(contents.starts_with("# LO 3 GHz\n"), "{contents}");
    // One row per channel, plus two header lines.
    assert_eq!(contents.lines().count(), 64 + 2);
}

#[test]
fn test_measure_multi_lo_with_arg_file() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("results");
    let (arg_file, mut f) = make_file_in_dir("args.toml", tmp.path());
    write!(
        f,
        indoc! {r#"
            [spectrometer]
            bram_addr_width = 4
            num_brams = 4
            acc_len = 16

            [measure]
            lo1 = [3.0, 4.0]
            lo2 = [1.0]
            lo1_power = 10.0
            test_channels = [4, 20, 36, 52]
            settle_time = 0.00001
            simulate = true
            output_dir = "{}"
        "#},
        out.display()
    )
    .unwrap();
    drop(f);

    let cmd = dss_srr()
        .arg("measure")
        .arg(&arg_file)
        .arg("--no-progress-bars")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    for lo in [LoSetting::pair(3.0, 1.0), LoSetting::pair(4.0, 1.0)] {
        let srr = out.join(lo.cal_key()).join("srr.txt");
        assert!(srr.exists(), "{} is missing", srr.display());
        let rows = read_srr(&srr, &[4, 20, 36, 52]);
        assert_eq!(rows.len(), 4);
    }
}

#[test]
fn test_calibration_improves_srr() {
    let tmp = TempDir::new().unwrap();
    let cal_dir = tmp.path().join("cal");
    let lo = LoSetting::single(3.0);

    // Calibration data as a correlating calibration of the simulated receiver
    // would measure it.
    let config = SpectrometerConfig {
        bram_addr_width: 4,
        num_brams: 4,
        acc_len: 16,
        ..Default::default()
    };
    let receiver = SimulatedReceiver::new(
        config,
        FpgaLayout::with_num_brams(config.num_brams),
        FixedPointFormat::new(32, 27).unwrap(),
        3.0,
    );
    DirectoryStore::new(&cal_dir)
        .save(&lo.cal_key(), &receiver.auto_cross_powers())
        .unwrap();

    let channels = [1, 9, 17, 25, 33, 41, 49, 57];
    let measure = |out: &Path, extra: &[&str]| {
        let cmd = dss_srr()
            .args(["measure", "--simulate", "--lo", "3", "--no-progress-bars"])
            .args(SMALL_SPECTROMETER)
            .args(["--settle-time", "0.00001", "--channel-step", "8"])
            .args(extra)
            .arg("-o")
            .arg(out)
            .ok();
        assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
        read_srr(&out.join(lo.cal_key()).join("srr.txt"), &channels)
    };

    let ideal = measure(&tmp.path().join("ideal"), &[]);
    let cal_dir_str = cal_dir.display().to_string();
    let calibrated = measure(
        &tmp.path().join("calibrated"),
        &["--reload-consts", "--cal-dir", &cal_dir_str],
    );
    assert_eq!(ideal.len(), channels.len());
    assert_eq!(calibrated.len(), channels.len());
    for (&(ideal_usb, ideal_lsb), &(cal_usb, cal_lsb)) in ideal.iter().zip(calibrated.iter()) {
        assert!(cal_usb > 50.0, "{cal_usb}");
        assert!(cal_lsb > 50.0, "{cal_lsb}");
        assert!(cal_usb > ideal_usb);
        assert!(cal_lsb > ideal_lsb);
    }
}

#[test]
fn test_missing_calibration_data_fails() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("results");
    let cmd = dss_srr()
        .args(["measure", "--simulate", "--lo", "3", "--no-progress-bars"])
        .args(SMALL_SPECTROMETER)
        .args(["--settle-time", "0.00001", "--reload-consts", "--cal-dir"])
        .arg(tmp.path())
        .arg("-o")
        .arg(&out)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("1 of 1 LO setting(s) failed"), "{stderr}");
}

#[test]
fn test_save_toml_reproduces_the_run() {
    let tmp = TempDir::new().unwrap();
    let toml = tmp.path().join("saved.toml");
    let cmd = dss_srr()
        .args(["measure", "--simulate", "--lo", "3", "--rf-power", "9", "--dry-run"])
        .args(SMALL_SPECTROMETER)
        .args(["--settle-time", "0.00001", "--save-toml"])
        .arg(&toml)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let saved = std::fs::read_to_string(&toml).unwrap();
    assert!(saved.contains("[measure]"), "{saved}");
    assert!(saved.contains("rf_power = 9.0"), "{saved}");

    let cmd = dss_srr()
        .arg("measure")
        .arg(&toml)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
}

#[test]
fn test_load_consts() {
    let cmd = dss_srr()
        .args(["load-consts", "--simulate", "--ideal-consts", "0", "1"])
        .args(SMALL_SPECTROMETER)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Loaded 64 calibration constants"), "{stdout}");

    let tmp = TempDir::new().unwrap();
    let cmd = dss_srr()
        .args(["load-consts", "--simulate", "--cal-dir"])
        .arg(tmp.path())
        .args(SMALL_SPECTROMETER)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("caldata.json"), "{stderr}");
}
