// This module contains the state enum of the motor position controller.
// To add or modify states, edit this file only.

/// - Homing: searching for a tilt limit switch to establish the angle origin
/// - Tracking: three-point regulation of both axes toward their targets
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum ControllerState {
    #[default]
    Homing,
    Tracking,
}

impl ControllerState {
    /// Check if the tilt axis has an absolute reference yet
    pub fn is_referenced(&self) -> bool {
        matches!(self, ControllerState::Tracking)
    }

    /// Get the state that follows this one. Tracking is the steady state.
    pub fn next(&self) -> ControllerState {
        ControllerState::Tracking
    }
}
