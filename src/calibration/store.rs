// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Loading and saving measured calibration powers by session key.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::{AutoCrossPowerSet, CalibrationStoreError};
use crate::c64;

/// Anything that can keep [`AutoCrossPowerSet`]s under a key (e.g.
/// "lo1_3ghz_lo2_1ghz").
pub trait CalibrationStore {
    fn load(&self, key: &str) -> Result<AutoCrossPowerSet, CalibrationStoreError>;

    fn save(&mut self, key: &str, powers: &AutoCrossPowerSet) -> Result<(), CalibrationStoreError>;
}

/// An in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore(HashMap<String, AutoCrossPowerSet>);

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl CalibrationStore for MemoryStore {
    fn load(&self, key: &str) -> Result<AutoCrossPowerSet, CalibrationStoreError> {
        self.0
            .get(key)
            .cloned()
            .ok_or_else(|| CalibrationStoreError::Missing(key.to_string()))
    }

    fn save(&mut self, key: &str, powers: &AutoCrossPowerSet) -> Result<(), CalibrationStoreError> {
        self.0.insert(key.to_string(), powers.clone());
        Ok(())
    }
}

/// A store on disk. Each session is a directory under the root holding a
/// `caldata.json` file; an empty key refers to the root itself.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

const CALDATA_FILENAME: &str = "caldata.json";

/// The on-disk representation. Complex numbers are `[re, im]` pairs.
#[derive(Serialize, Deserialize)]
struct CalibrationRecord {
    a2_usb: Vec<f64>,
    a2_lsb: Vec<f64>,
    b2_usb: Vec<f64>,
    b2_lsb: Vec<f64>,
    ab_usb: Vec<c64>,
    ab_lsb: Vec<c64>,
}

impl From<&AutoCrossPowerSet> for CalibrationRecord {
    fn from(p: &AutoCrossPowerSet) -> Self {
        CalibrationRecord {
            a2_usb: p.a2_usb.to_vec(),
            a2_lsb: p.a2_lsb.to_vec(),
            b2_usb: p.b2_usb.to_vec(),
            b2_lsb: p.b2_lsb.to_vec(),
            ab_usb: p.ab_usb.to_vec(),
            ab_lsb: p.ab_lsb.to_vec(),
        }
    }
}

impl From<CalibrationRecord> for AutoCrossPowerSet {
    fn from(r: CalibrationRecord) -> Self {
        AutoCrossPowerSet {
            a2_usb: Array1::from(r.a2_usb),
            a2_lsb: Array1::from(r.a2_lsb),
            b2_usb: Array1::from(r.b2_usb),
            b2_lsb: Array1::from(r.b2_lsb),
            ab_usb: Array1::from(r.ab_usb),
            ab_lsb: Array1::from(r.ab_lsb),
        }
    }
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> DirectoryStore {
        DirectoryStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file that holds the data for `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.root.join(CALDATA_FILENAME)
        } else {
            self.root.join(key).join(CALDATA_FILENAME)
        }
    }
}

impl CalibrationStore for DirectoryStore {
    fn load(&self, key: &str) -> Result<AutoCrossPowerSet, CalibrationStoreError> {
        let file = self.path(key);
        if !file.exists() {
            return Err(CalibrationStoreError::Missing(key.to_string()));
        }
        debug!("Reading calibration data from {}", file.display());
        let f = File::open(&file).map_err(|err| CalibrationStoreError::IO {
            file: file.clone(),
            err,
        })?;
        let record: CalibrationRecord = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| CalibrationStoreError::Decode {
                file: file.clone(),
                err: e.to_string(),
            })?;
        let powers = AutoCrossPowerSet::from(record);
        powers
            .validate(None)
            .map_err(|e| CalibrationStoreError::Decode {
                file,
                err: e.to_string(),
            })?;
        Ok(powers)
    }

    fn save(&mut self, key: &str, powers: &AutoCrossPowerSet) -> Result<(), CalibrationStoreError> {
        let file = self.path(key);
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir).map_err(|err| CalibrationStoreError::IO {
                file: dir.to_path_buf(),
                err,
            })?;
        }
        debug!("Writing calibration data to {}", file.display());
        let f = File::create(&file).map_err(|err| CalibrationStoreError::IO {
            file: file.clone(),
            err,
        })?;
        let mut writer = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut writer, &CalibrationRecord::from(powers)).map_err(
            |e| CalibrationStoreError::Encode {
                key: key.to_string(),
                err: e.to_string(),
            },
        )?;
        writer
            .flush()
            .map_err(|err| CalibrationStoreError::IO { file, err })
    }
}
