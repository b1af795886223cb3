// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_format_bounds() {
    let format = FixedPointFormat::new(32, 27).unwrap();
    assert_abs_diff_eq!(format.min_value(), -16.0);
    assert_abs_diff_eq!(format.max_value(), 16.0 - 2f64.powi(-27));
    assert_abs_diff_eq!(format.step(), 2f64.powi(-27));
    assert_eq!(format.word_bytes(), 4);
    assert_eq!(format, FixedPointFormat::default());

    assert!(FixedPointFormat::new(8, 8).is_err());
    assert!(FixedPointFormat::new(65, 8).is_err());
    assert!(FixedPointFormat::new(1, 0).is_err());
}

#[test]
fn test_quantization_error_is_bounded() {
    let format = FixedPointFormat::new(32, 27).unwrap();
    let values: Vec<f64> = (0..1000)
        .map(|i| -15.9 + 31.8 * (i as f64 / 999.0) + 1e-9 * i as f64)
        .chain([0.0, 1.0, -1.0, 0.123456789, -7.654321, 15.999999, -16.0])
        .collect();
    let quantized = format.quantize(&values, true);
    assert!(quantized.saturations.is_empty());
    for (v, r) in values.iter().zip(quantized.to_floats()) {
        assert!((r - v).abs() <= 2f64.powi(-28), "{v} -> {r}");
    }
}

#[test]
fn test_saturation_is_clamped_and_reported() {
    let format = FixedPointFormat::new(32, 27).unwrap();
    let quantized = format.quantize(&[0.5, 100.0, -20.0, -16.0], false);
    assert_eq!(quantized.words[0], 1 << 26);
    assert_eq!(quantized.words[1], i32::MAX as i64);
    assert_eq!(quantized.words[2], i32::MIN as i64);
    // -16 is exactly representable.
    assert_eq!(quantized.words[3], i32::MIN as i64);

    assert_eq!(quantized.saturations.len(), 2);
    let s = quantized.saturations[0];
    assert_eq!(s.index, 1);
    assert_abs_diff_eq!(s.value, 100.0);
    assert_abs_diff_eq!(s.clamped_value, format.max_value());
    assert!(s.excess() > 84.0);
    let s = quantized.saturations[1];
    assert_eq!(s.index, 2);
    assert_abs_diff_eq!(s.excess(), -4.0);
}

#[test]
fn test_nan_is_reported() {
    let format = FixedPointFormat::new(16, 8).unwrap();
    let quantized = format.quantize(&[f64::NAN], false);
    assert_eq!(quantized.words, vec![0]);
    assert_eq!(quantized.saturations.len(), 1);
}

#[test]
fn test_64_bit_words_report_saturation() {
    let format = FixedPointFormat::new(64, 0).unwrap();
    let top = 2f64.powi(63);
    let below_top = top - 1024.0;
    let quantized = format.quantize(&[top, -top, below_top, 1e300], false);
    assert_eq!(
        quantized.words,
        vec![i64::MAX, i64::MIN, i64::MAX - 1023, i64::MAX]
    );
    let indices: Vec<usize> = quantized.saturations.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 3]);
}

#[test]
fn test_rounds_to_nearest() {
    let format = FixedPointFormat::new(8, 2).unwrap();
    let quantized = format.quantize(&[0.3, 0.37, -0.3, 31.75, 31.9], false);
    assert_eq!(quantized.words, vec![1, 1, -1, 127, 127]);
    assert_eq!(quantized.saturations.len(), 1);
    assert_eq!(quantized.saturations[0].index, 4);
}

#[test]
fn test_be_bytes() {
    let format = FixedPointFormat::new(32, 27).unwrap();
    let quantized = format.quantize(&[1.0, -1.0], false);
    assert_eq!(
        quantized.to_be_bytes(),
        vec![0x08, 0x00, 0x00, 0x00, 0xf8, 0x00, 0x00, 0x00]
    );

    let format = FixedPointFormat::new(12, 4).unwrap();
    assert_eq!(format.word_bytes(), 2);
    let quantized = format.quantize(&[-0.0625], false);
    assert_eq!(quantized.to_be_bytes(), vec![0xff, 0xff]);
}
