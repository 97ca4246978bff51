// Edge interrupt handler for the tilt limit switches and the e-stop button.
//
// Runs in interrupt context: no logging, no allocation, no blocking. The
// platform layer takes one snapshot of the input lines and hands it here.

use crate::drive::{Drive, DriveCell};
use crate::shared::{LimitFlags, SharedState};

/// Port bit of the e-stop button
pub const PORT_EMERGENCY_STOP: u8 = 0x01;
/// Port bit of the upper tilt limit switch
pub const PORT_LIMIT_A: u8 = 0x08;
/// Port bit of the zero tilt limit switch
pub const PORT_LIMIT_B: u8 = 0x10;

/// Semantic view of the three input lines, `true` meaning asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitInputs {
    pub limit_a: bool,
    pub limit_b: bool,
    pub emergency_stop: bool,
}

impl LimitInputs {
    /// Decodes a raw port read. The switches pull their lines low.
    pub fn from_port(port: u8) -> Self {
        LimitInputs {
            limit_a: port & PORT_LIMIT_A == 0,
            limit_b: port & PORT_LIMIT_B == 0,
            emergency_stop: port & PORT_EMERGENCY_STOP == 0,
        }
    }

    pub fn limits(&self) -> LimitFlags {
        let mut flags = LimitFlags::empty();
        flags.set(LimitFlags::A, self.limit_a);
        flags.set(LimitFlags::B, self.limit_b);
        flags
    }
}

/// Handles one edge on any of the three lines.
///
/// An asserted e-stop latches the stop and disables the drive before the
/// outputs are cleared, so a controller tick that runs right after can no
/// longer re-energize anything. Limit switches are only recorded; the
/// controller decides what to do with them on its next tick.
pub fn on_limit_edge<D: Drive>(shared: &SharedState, drive: &DriveCell<D>, inputs: LimitInputs) {
    if inputs.emergency_stop {
        shared.latch_emergency_stop();
        // A failed write is retried by every following tick, which sees the
        // latched stop and commands Stop again.
        let _ = drive.with(|d| d.halt());
    }
    shared.latch_limits(inputs.limits());
}
