// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_default_config_matches_roach2_model() {
    let config = SpectrometerConfig::default();
    assert_eq!(config.nchannels(), 2048);
    assert_eq!(config.fft_size(), 4096);
    assert_abs_diff_eq!(
        config.dbfs(),
        6.02 * 8.0 + 1.76 + 10.0 * 2048f64.log10(),
        epsilon = 1e-12
    );
}

#[test]
fn test_grid() {
    let grid = FrequencyGrid::new(1080.0, 2048).unwrap();
    assert_eq!(grid.len(), 2048);
    assert_abs_diff_eq!(grid.freqs_mhz()[0], 0.0);
    assert_abs_diff_eq!(grid.spacing_mhz(), 1080.0 / 2048.0);
    assert_abs_diff_eq!(grid.freq_mhz(2047).unwrap(), 1080.0 - 1080.0 / 2048.0);
    assert!(grid.freq_mhz(2048).is_none());
    assert!(grid.freqs_mhz().windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_empty_grid_is_an_error() {
    assert_eq!(
        FrequencyGrid::new(1080.0, 0),
        Err(ConfigurationError::EmptyGrid)
    );
    assert!(matches!(
        FrequencyGrid::new(0.0, 10),
        Err(ConfigurationError::BadBandwidth(_))
    ));
    let config = SpectrometerConfig {
        num_brams: 0,
        ..Default::default()
    };
    assert_eq!(config.grid(), Err(ConfigurationError::EmptyGrid));
}

#[test]
fn test_bram_addr_width_is_bounded() {
    for width in [0, MAX_BRAM_ADDR_WIDTH + 1, 40, 64, u32::MAX] {
        let config = SpectrometerConfig {
            bram_addr_width: width,
            ..Default::default()
        };
        let expected = ConfigurationError::BadBramAddrWidth {
            got: width,
            max: MAX_BRAM_ADDR_WIDTH,
        };
        assert_eq!(config.validate(), Err(expected.clone()));
        assert_eq!(config.grid().unwrap_err(), expected);
    }

    let config = SpectrometerConfig {
        bram_addr_width: MAX_BRAM_ADDR_WIDTH,
        num_brams: 1,
        ..Default::default()
    };
    assert_eq!(config.grid().unwrap().len(), 1 << MAX_BRAM_ADDR_WIDTH);
}

#[test]
fn test_test_channels_every_256() {
    let channels = TestChannels::from_step(2048, 1, 256).unwrap();
    assert_eq!(channels.len(), 8);
    assert_eq!(
        channels.channels(),
        &[1, 257, 513, 769, 1025, 1281, 1537, 1793]
    );

    let grid = FrequencyGrid::new(1080.0, 2048).unwrap();
    let freqs = channels.freqs_mhz(&grid).unwrap();
    assert_abs_diff_eq!(freqs[1], 257.0 * 1080.0 / 2048.0);
}

#[test]
fn test_bad_test_channels() {
    assert_eq!(
        TestChannels::from_list(16, vec![1, 5, 5]),
        Err(ConfigurationError::NonMonotonicTestChannels { prev: 5, next: 5 })
    );
    assert_eq!(
        TestChannels::from_list(16, vec![3, 2]),
        Err(ConfigurationError::NonMonotonicTestChannels { prev: 3, next: 2 })
    );
    assert_eq!(
        TestChannels::from_list(16, vec![1, 16]),
        Err(ConfigurationError::TestChannelOutOfRange {
            channel: 16,
            nchannels: 16
        })
    );
    assert_eq!(
        TestChannels::from_list(16, vec![]),
        Err(ConfigurationError::NoTestChannels)
    );
    assert_eq!(
        TestChannels::from_step(16, 0, 0),
        Err(ConfigurationError::ZeroChannelStep)
    );
}

#[test]
fn test_min_settle_time() {
    let config = SpectrometerConfig::default();
    // 4096 * 65536 * 2 / 1080e6
    let expected = 4096.0 * 65536.0 * 2.0 / 1080e6;
    assert_abs_diff_eq!(
        config.min_settle_time().as_secs_f64(),
        expected,
        epsilon = 1e-9
    );
    // The default settle time of the scripts is just above this.
    assert!(config
        .check_settle_time(Duration::from_secs_f64(DEFAULT_SETTLE_TIME_S), false)
        .is_ok());
}

#[test]
fn test_short_settle_time() {
    let config = SpectrometerConfig::default();
    let short = Duration::from_millis(10);
    assert!(matches!(
        config.check_settle_time(short, false),
        Err(ConfigurationError::SettleTooShort { .. })
    ));
    assert!(config.check_settle_time(short, true).is_ok());
}
