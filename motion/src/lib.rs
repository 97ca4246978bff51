//! Tracking core of the mount: shared state, H-bridge drive, limit/e-stop
//! latch, position controller and the solar tracking orchestrator.

pub mod config;
pub mod controller;
pub mod drive;
pub mod latch;
pub mod shared;
pub mod states;
pub mod tracking;

#[cfg(test)]
mod testing;

pub use config::{ControllerConfig, TrackingConfig};
pub use controller::{MotorController, TickReport, TiltBlock};
pub use drive::{Direction, Drive, DriveCell, DriveError, HBridge, MotorDrive};
pub use latch::{on_limit_edge, LimitInputs};
pub use shared::{LimitFlags, MountStatus, SharedState};
pub use states::ControllerState;
pub use tracking::{GpsFix, PositionSource, SolarSetpoint, SolarTracker, TrackingLimits, WakeupOutcome};
