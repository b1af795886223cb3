// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from talking to signal generators or the FPGA.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("{instrument} did not acknowledge '{command}'; expected an operation-complete reply, got '{got}'")]
    NoAcknowledgment {
        instrument: String,
        command: String,
        got: String,
    },

    #[error("Timed out waiting for {instrument} during '{operation}'")]
    Timeout {
        instrument: String,
        operation: String,
    },

    #[error("{instrument} closed the connection")]
    Disconnected { instrument: String },

    #[error("Couldn't understand the instrument resource '{0}'; expected something like 'TCPIP::192.168.1.34::INSTR' or 'host:port'")]
    BadResource(String),

    #[error("The FPGA has no register or bram named '{0}'")]
    UnknownDevice(String),

    #[error("Expected {expected} bytes from '{name}', but got {got}")]
    BadBlockSize {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Word width {0} bits is not supported; it must be a multiple of 8 between 8 and 64")]
    BadWordWidth(u32),

    #[error("Tried to write {got} words to {num_brams} brams; the number of words must be a multiple of the number of brams")]
    BadInterleave { got: usize, num_brams: usize },

    #[error("The accumulation changed from {before} to {after} while reading spectra")]
    TornRead { before: u32, after: u32 },

    #[error("{instrument}: {source}")]
    IO {
        instrument: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstrumentError {
    /// Convert an IO error, recognising read timeouts.
    pub(crate) fn from_io(instrument: &str, operation: &str, e: std::io::Error) -> InstrumentError {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => InstrumentError::Timeout {
                instrument: instrument.to_string(),
                operation: operation.to_string(),
            },
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                InstrumentError::Disconnected {
                    instrument: instrument.to_string(),
                }
            }
            _ => InstrumentError::IO {
                instrument: instrument.to_string(),
                source: e,
            },
        }
    }
}
