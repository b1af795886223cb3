// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


/// One-dimensional piecewise-linear interpolation, the same as numpy's
/// `interp`. `xp` must be strictly increasing and the same length as `fp`;
/// this is checked by callers. Values of `x` outside of `xp` are clamped to
/// the first or last value of `fp`.
///
/// # Examples
///
/// `assert_eq!(interp(&[0.5], &[0.0, 1.0], &[0.0, 2.0]), vec![1.0]);`
pub(crate) fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    debug_assert!(!xp.is_empty());
    let last = xp.len() - 1;

    x.iter()
        .map(|&x| {
            if x <= xp[0] {
                return fp[0];
            }
            if x >= xp[last] {
                return fp[last];
            }
            // The first index where xp > x. This can't be 0 or beyond the end
            // because of the checks above.
            let i = xp.partition_point(|&v| v <= x);
            let (x0, x1) = (xp[i - 1], xp[i]);
            let (f0, f1) = (fp[i - 1], fp[i]);
            if x == x0 {
                f0
            } else {
                f0 + (f1 - f0) * (x - x0) / (x1 - x0)
            }
        })
        .collect()
}

/// Convert a linear power ratio to decibels. A ratio of +inf stays +inf.
#[inline]
pub(crate) fn db(x: f64) -> f64 {
    10.0 * x.log10()
}

/// Scale accumulated power values and express them relative to full scale,
/// i.e. `10 log10(power / acc_len + 1) - dbfs`. The `+ 1` keeps empty channels
/// finite.
pub(crate) fn scale_and_dbfs(power: &[f64], acc_len: u32, dbfs: f64) -> Vec<f64> {
    let acc_len = f64::from(acc_len);
    power
        .iter()
        .map(|&p| db(p / acc_len + 1.0) - dbfs)
        .collect()
}
