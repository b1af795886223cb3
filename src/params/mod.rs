// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters that actually run things.
//!
//! The code here is kind of "mirroring" the code within the `cli` module; the
//! idea is that `cli` is unparsed, user-facing code, whereas parameters have
//! been parsed and are ready to be used directly. The code here should be
//! public to the entire crate.

mod load_consts;
mod measure;

pub(crate) use load_consts::LoadConstsParams;
pub(crate) use measure::{MeasureParams, MeasureRunError};

use crate::{
    fixed_point::FixedPointFormat,
    instrument::{
        sim::{GeneratorRole, SimulatedReceiver},
        FpgaLayout,
    },
    measure::RunContext,
    spectrometer::SpectrometerConfig,
};

/// The simulated hardware that the CLI drives. The LO that the receiver uses
/// when no LO generators are switched on is `fixed_lo_ghz`.
pub(crate) struct SimulatedHardware {
    pub(crate) fixed_lo_ghz: f64,
}

impl SimulatedHardware {
    /// Build the simulated receiver and a [`RunContext`] that owns its FPGA and
    /// generators. LO generators are only attached if `with_lo_generators`.
    pub(crate) fn connect(
        &self,
        spectrometer: SpectrometerConfig,
        layout: FpgaLayout,
        format: FixedPointFormat,
        with_lo_generators: bool,
    ) -> (SimulatedReceiver, RunContext) {
        let receiver = SimulatedReceiver::new(spectrometer, layout, format, self.fixed_lo_ghz);
        let mut ctx = RunContext::new(
            Box::new(receiver.fpga()),
            Box::new(receiver.generator(GeneratorRole::Rf)),
        );
        if with_lo_generators {
            ctx = ctx.with_lo_generators(
                Box::new(receiver.generator(GeneratorRole::Lo1)),
                Some(Box::new(receiver.generator(GeneratorRole::Lo2))),
            );
        }
        (receiver, ctx)
    }
}
