// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

Most of these are defaults for the ROACH2 DSS model (2048 channels over 1080
MHz); anything here can be overridden by user arguments.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// The bandwidth of the spectrometer \[MHz\].
pub const DEFAULT_BANDWIDTH_MHZ: f64 = 1080.0;

/// The number of bits of the ADCs. Used to compute dBFS.
pub const DEFAULT_ADC_BITS: u32 = 8;

/// The address width of each spectrometer bram \[bits\].
pub const DEFAULT_BRAM_ADDR_WIDTH: u32 = 8;

/// The largest bram address width accepted \[bits\]. 2^20 words per bram is
/// far beyond any spectrometer model that fits on the FPGA.
pub const MAX_BRAM_ADDR_WIDTH: u32 = 20;

/// The word width of each spectrometer power bram \[bits\].
pub const DEFAULT_BRAM_WORD_WIDTH: u32 = 64;

/// The number of brams a single spectrum is interleaved across.
pub const DEFAULT_NUM_BRAMS: usize = 8;

/// The number of spectra accumulated before a readout is valid.
pub const DEFAULT_ACC_LEN: u32 = 1 << 16;

/// Test tones are injected every this many channels.
pub const DEFAULT_CHANNEL_STEP: usize = 256;

/// The first channel to inject a test tone into. Channel 0 (DC) is skipped.
pub const DEFAULT_FIRST_TEST_CHANNEL: usize = 1;

/// How long to wait after retuning the RF generator before reading spectra
/// \[seconds\].
pub const DEFAULT_SETTLE_TIME_S: f64 = 0.5;

/// The RF (test tone) generator power \[dBm\].
pub const DEFAULT_RF_POWER_DBM: f64 = 7.0;

/// The total number of bits in a calibration constant word.
pub const DEFAULT_CONSTS_NBITS: u32 = 32;

/// The number of fractional bits in a calibration constant word.
pub const DEFAULT_CONSTS_BINPT: u32 = 27;

/// Auto-powers with a magnitude below this are treated as zero when deriving
/// calibration constants.
pub const DEFAULT_CALIBRATION_EPSILON: f64 = 1e-12;

/// The ideal constant used when no calibration data is available.
pub const DEFAULT_IDEAL_CONST: (f64, f64) = (0.0, 1.0);

/// The register holding the accumulation length of the synthesis spectrometer.
pub const DEFAULT_ACC_LEN_REG: &str = "syn_acc_len";

/// The register used to reset the spectrometer counters.
pub const DEFAULT_CNT_RST_REG: &str = "cnt_rst";

/// The default TCP port of SCPI instruments (VISA "TCPIP::<host>::INSTR").
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Where measurement results are written.
pub const DEFAULT_OUTPUT_DIR: &str = "dss_srr_results";
