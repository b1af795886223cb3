// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::{Sideband, SweepSample};
use crate::instrument::InstrumentError;

/// A tone sweep that stopped early. Everything recorded before the failure is
/// kept.
#[derive(Error, Debug)]
#[error("{tone} sweep aborted at test channel {channel} after {} sample(s): {error}", .samples.len())]
pub struct SweepAborted {
    pub tone: Sideband,

    /// The test channel being measured when the failure happened.
    pub channel: usize,

    /// The samples recorded before the failure.
    pub samples: Vec<SweepSample>,

    #[source]
    pub error: InstrumentError,
}
