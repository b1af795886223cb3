// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interfaces to the hardware: signal generators and the FPGA spectrometer.
//!
//! Every call blocks until the hardware has answered. Nothing here retries;
//! errors are handed straight back to the caller.

mod error;
mod fpga;
mod generator;
pub mod sim;
#[cfg(test)]
mod tests;

pub use error::InstrumentError;
pub use fpga::{read_interleaved, write_interleaved, BramDataType, Fpga, FpgaLayout, Spectra};
pub use generator::{parse_visa_resource, FreqUnit, ScpiGenerator, SignalGenerator};
