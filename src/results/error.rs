// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Couldn't create the results directory '{dir}': {err}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Couldn't write results to '{file}': {err}")]
    Write {
        file: PathBuf,
        #[source]
        err: std::io::Error,
    },
}
