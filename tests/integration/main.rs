// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod measure;
mod settle_time;

use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

fn dss_srr() -> Command {
    Command::cargo_bin("dss-srr").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

fn make_file_in_dir<T: AsRef<Path>, U: AsRef<Path>>(filename: T, dir: U) -> (PathBuf, File) {
    let path = dir.as_ref().join(filename);
    let f = File::create(&path).expect("couldn't make file");
    (path, f)
}

/// Arguments describing a small (64-channel) simulated spectrometer that can
/// be swept quickly.
const SMALL_SPECTROMETER: [&str; 6] = [
    "--bram-addr-width",
    "4",
    "--num-brams",
    "4",
    "--acc-len",
    "16",
];

#[test]
fn test_help_is_printed() {
    let cmd = dss_srr().arg("--help").ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("measure"));
    assert!(stdout.contains("load-consts"));
    assert!(stdout.contains("settle-time"));
}

#[test]
fn test_no_subcommand_is_an_error() {
    let cmd = dss_srr().ok();
    assert!(cmd.is_err());
}
