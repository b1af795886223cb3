// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Signal generators.

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::InstrumentError;
use crate::constants::DEFAULT_SCPI_PORT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize)]
pub enum FreqUnit {
    #[strum(serialize = "hz")]
    Hz,
    #[strum(serialize = "khz")]
    KHz,
    #[strum(serialize = "mhz")]
    MHz,
    #[strum(serialize = "ghz")]
    GHz,
}

/// A signal generator used either for a local oscillator or the test tone.
pub trait SignalGenerator {
    /// A human-readable name for log and error messages.
    fn name(&self) -> &str;

    /// Retune the generator. This must not return until the generator has
    /// confirmed that it has finished retuning; a missing or bad confirmation
    /// is an error.
    fn set_frequency(&mut self, value: f64, unit: FreqUnit) -> Result<(), InstrumentError>;

    /// \[dBm\]
    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError>;

    /// Set the generator's frequency multiplier (e.g. when it drives a
    /// multiplier chain, the set frequency is the output frequency).
    fn set_multiplier(&mut self, multiplier: f64) -> Result<(), InstrumentError>;

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError>;

    /// Block until all pending operations are complete.
    fn operation_complete(&mut self) -> Result<(), InstrumentError>;
}

/// A generator that speaks SCPI over a byte stream (normally a raw TCP
/// socket).
pub struct ScpiGenerator {
    name: String,
    reader: Box<dyn BufRead>,
    writer: Box<dyn Write>,
}

/// Get a socket address from a VISA resource string (e.g.
/// "TCPIP::192.168.1.34::INSTR" or "TCPIP0::host::5025::SOCKET"), or a plain
/// "host:port".
pub fn parse_visa_resource(resource: &str) -> Result<String, InstrumentError> {
    let bad = || InstrumentError::BadResource(resource.to_string());
    if !resource.to_uppercase().starts_with("TCPIP") {
        return match resource.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(resource.to_string())
            }
            _ => Err(bad()),
        };
    }

    let parts: Vec<&str> = resource.split("::").collect();
    match parts.as_slice() {
        [_, host, suffix] if suffix.eq_ignore_ascii_case("INSTR") && !host.is_empty() => {
            Ok(format!("{host}:{DEFAULT_SCPI_PORT}"))
        }
        [_, host, port, suffix] if suffix.eq_ignore_ascii_case("SOCKET") && !host.is_empty() => {
            let port: u16 = port.parse().map_err(|_| bad())?;
            Ok(format!("{host}:{port}"))
        }
        _ => Err(bad()),
    }
}

impl ScpiGenerator {
    /// Connect to a generator over TCP. Replies not received within `timeout`
    /// are errors.
    pub fn connect(
        name: &str,
        resource: &str,
        timeout: Duration,
    ) -> Result<ScpiGenerator, InstrumentError> {
        let addr_str = parse_visa_resource(resource)?;
        debug!("Connecting to {name} at {addr_str}");
        let io_err = |e| InstrumentError::from_io(name, "connect", e);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(io_err)?
            .next()
            .ok_or_else(|| InstrumentError::BadResource(resource.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(io_err)?;
        stream.set_read_timeout(Some(timeout)).map_err(io_err)?;
        stream.set_write_timeout(Some(timeout)).map_err(io_err)?;
        stream.set_nodelay(true).map_err(io_err)?;
        let reader = BufReader::new(stream.try_clone().map_err(io_err)?);
        Ok(Self::from_stream(name, reader, stream))
    }

    /// Use any reader/writer pair as the transport.
    pub fn from_stream<R, W>(name: &str, reader: R, writer: W) -> ScpiGenerator
    where
        R: BufRead + 'static,
        W: Write + 'static,
    {
        ScpiGenerator {
            name: name.to_string(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        trace!("{} <- {command}", self.name);
        self.writer
            .write_all(command.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| InstrumentError::from_io(&self.name, command, e))
    }

    fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.write(command)?;
        let mut reply = String::new();
        let n = self
            .reader
            .read_line(&mut reply)
            .map_err(|e| InstrumentError::from_io(&self.name, command, e))?;
        if n == 0 {
            return Err(InstrumentError::Disconnected {
                instrument: self.name.clone(),
            });
        }
        let reply = reply.trim().to_string();
        trace!("{} -> {reply}", self.name);
        Ok(reply)
    }

    /// Send a command followed by "*OPC?" and require the reply "1".
    fn command_with_ack(&mut self, command: &str) -> Result<(), InstrumentError> {
        let full = format!("{command}; *opc?");
        let reply = self.query(&full)?;
        if reply == "1" || reply == "+1" {
            Ok(())
        } else {
            Err(InstrumentError::NoAcknowledgment {
                instrument: self.name.clone(),
                command: full,
                got: reply,
            })
        }
    }
}

impl SignalGenerator for ScpiGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_frequency(&mut self, value: f64, unit: FreqUnit) -> Result<(), InstrumentError> {
        self.command_with_ack(&format!("freq {value} {unit}"))
    }

    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.write(&format!("power {dbm}"))
    }

    fn set_multiplier(&mut self, multiplier: f64) -> Result<(), InstrumentError> {
        self.write(&format!("freq:mult {multiplier}"))
    }

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.write(if on { "outp on" } else { "outp off" })
    }

    fn operation_complete(&mut self) -> Result<(), InstrumentError> {
        let reply = self.query("*opc?")?;
        if reply == "1" || reply == "+1" {
            Ok(())
        } else {
            Err(InstrumentError::NoAcknowledgment {
                instrument: self.name.clone(),
                command: "*opc?".to_string(),
                got: reply,
            })
        }
    }
}
