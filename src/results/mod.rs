// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Handing measurement results to something that keeps them.

[`TextResultWriter`] writes whitespace-separated text files, one directory per
LO setting:

- `srr.txt`: every channel's IF, the RF it corresponds to in each sideband and
  the SRR of both sweeps \[dB\];
- `samples_usb.txt` and `samples_lsb.txt`: the raw samples of each sweep, with
  powers scaled relative to full scale \[dBFS\].
 */

mod error;
#[cfg(test)]
mod tests;

pub use error::ResultError;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    math::scale_and_dbfs,
    measure::{FailedMeasurement, SrrMeasurement},
    spectrometer::SpectrometerConfig,
    sweep::{Sideband, SweepSample},
};

/// Something that receives the results of a run, one LO setting at a time.
pub trait ResultSink {
    fn measurement(&mut self, m: &SrrMeasurement) -> Result<(), ResultError>;

    /// Called for LO settings that failed. The default does nothing with
    /// them.
    fn failure(&mut self, _f: &FailedMeasurement) -> Result<(), ResultError> {
        Ok(())
    }
}

/// Writes results as text files under a directory.
#[derive(Debug, Clone)]
pub struct TextResultWriter {
    dir: PathBuf,
    acc_len: u32,
    dbfs: f64,
}

impl TextResultWriter {
    pub fn new<P: AsRef<Path>>(dir: P, spectrometer: &SpectrometerConfig) -> TextResultWriter {
        TextResultWriter {
            dir: dir.as_ref().to_path_buf(),
            acc_len: spectrometer.acc_len,
            dbfs: spectrometer.dbfs(),
        }
    }

    /// The directory that results for the LO setting with `key` go into.
    pub fn lo_dir(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn write_file<F>(&self, dir: &Path, name: &str, f: F) -> Result<(), ResultError>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        let file = dir.join(name);
        debug!("Writing {}", file.display());
        let err = |err| ResultError::Write {
            file: file.clone(),
            err,
        };
        let mut buf = BufWriter::new(File::create(&file).map_err(err)?);
        f(&mut buf).map_err(err)?;
        buf.flush().map_err(err)
    }
}

impl ResultSink for TextResultWriter {
    fn measurement(&mut self, m: &SrrMeasurement) -> Result<(), ResultError> {
        let dir = self.lo_dir(&m.lo.cal_key());
        std::fs::create_dir_all(&dir).map_err(|err| ResultError::CreateDir {
            dir: dir.clone(),
            err,
        })?;
        self.write_file(&dir, "srr.txt", |buf| write_srr(buf, m))?;
        for (tone, samples) in [
            (Sideband::Usb, &m.usb_samples),
            (Sideband::Lsb, &m.lsb_samples),
        ] {
            let name = format!("samples_{}.txt", tone.to_string().to_lowercase());
            self.write_file(&dir, &name, |buf| {
                write_samples(buf, samples, tone, self.acc_len, self.dbfs)
            })?;
        }
        info!("Wrote results for {} to {}", m.lo, dir.display());
        Ok(())
    }

    fn failure(&mut self, f: &FailedMeasurement) -> Result<(), ResultError> {
        // Keep whatever was recorded before the failure.
        if f.usb_samples.is_empty() && f.lsb_samples.is_empty() {
            return Ok(());
        }
        let dir = self.lo_dir(&f.lo.cal_key());
        std::fs::create_dir_all(&dir).map_err(|err| ResultError::CreateDir {
            dir: dir.clone(),
            err,
        })?;
        for (tone, samples) in [
            (Sideband::Usb, &f.usb_samples),
            (Sideband::Lsb, &f.lsb_samples),
        ] {
            let name = format!("samples_{}.partial.txt", tone.to_string().to_lowercase());
            self.write_file(&dir, &name, |buf| {
                write_samples(buf, samples, tone, self.acc_len, self.dbfs)
            })?;
        }
        info!(
            "Wrote partial results for {} to {}",
            f.lo,
            dir.display()
        );
        Ok(())
    }
}

/// Write the SRR of both sweeps over every channel.
pub fn write_srr<W: Write>(buf: &mut W, m: &SrrMeasurement) -> std::io::Result<()> {
    writeln!(buf, "# {}", m.lo)?;
    writeln!(
        buf,
        "# channel if_mhz rf_usb_ghz rf_lsb_ghz srr_usb_db srr_lsb_db"
    )?;
    let usb = m.usb.db();
    let lsb = m.lsb.db();
    for (channel, &if_mhz) in m.usb.freqs_mhz.iter().enumerate() {
        writeln!(
            buf,
            "{channel} {if_mhz:.6} {:.9} {:.9} {:.4} {:.4}",
            m.rf.usb_ghz[channel], m.rf.lsb_ghz[channel], usb[channel], lsb[channel]
        )?;
    }
    Ok(())
}

/// Write the samples of one sweep. Powers are in dBFS.
pub fn write_samples<W: Write>(
    buf: &mut W,
    samples: &[SweepSample],
    tone: Sideband,
    acc_len: u32,
    dbfs: f64,
) -> std::io::Result<()> {
    writeln!(buf, "# {tone} tone")?;
    writeln!(buf, "# channel if_mhz rf_ghz usb_dbfs lsb_dbfs")?;
    let usb: Vec<f64> = samples.iter().map(|s| s.power.usb).collect();
    let lsb: Vec<f64> = samples.iter().map(|s| s.power.lsb).collect();
    let usb = scale_and_dbfs(&usb, acc_len, dbfs);
    let lsb = scale_and_dbfs(&lsb, acc_len, dbfs);
    for ((s, usb), lsb) in samples.iter().zip(usb).zip(lsb) {
        writeln!(
            buf,
            "{} {:.6} {:.9} {usb:.4} {lsb:.4}",
            s.channel, s.if_mhz, s.rf_ghz
        )?;
    }
    Ok(())
}
