// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::*;

#[test]
fn test_settle_time_is_reported() {
    let cmd = dss_srr()
        .args(["settle-time", "--bandwidth", "1000", "--acc-len", "1000"])
        .args(["--bram-addr-width", "4", "--num-brams", "4"])
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Minimum settle time: 0.000256 s"), "{stdout}");
}

#[test]
fn test_short_settle_time_is_an_error() {
    let cmd = dss_srr()
        .args(["settle-time", "--settle-time", "0.01"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("pipeline latency"), "{stderr}");
}
