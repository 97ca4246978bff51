// Tunables for the controller and the orchestrator, loaded from the
// `[motor]` and `[tracking]` sections of config.toml.

use anyhow::bail;
use serde::Deserialize;

/// Largest turn step per tick, tenths of a degree
pub const MAX_TURN_STEP: i16 = 5;
/// Largest tilt step per tick, tenths of a degree
pub const MAX_TILT_STEP: i16 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub turn_deadband: i16,
    pub tilt_deadband: i16,
    /// Open-loop angle advance per tick while the turn motor runs
    pub turn_step: i16,
    /// Open-loop angle advance per tick while the tilt motor runs
    pub tilt_step: i16,
    /// Tilt angle at limit switch A
    pub home_a: i16,
    /// Tilt angle at limit switch B
    pub home_b: i16,
    pub tick_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            turn_deadband: 50,
            tilt_deadband: 50,
            turn_step: 1,
            tilt_step: 1,
            home_a: 900,
            home_b: 0,
            tick_ms: 100,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (axis, step, deadband, max_step) in [
            ("turn", self.turn_step, self.turn_deadband, MAX_TURN_STEP),
            ("tilt", self.tilt_step, self.tilt_deadband, MAX_TILT_STEP),
        ] {
            if deadband < 0 {
                bail!("{} deadband must not be negative, got {}", axis, deadband);
            }
            if step <= 0 {
                bail!("{} step must be positive, got {}", axis, step);
            }
            if step > max_step {
                bail!("{} step {} exceeds the maximum of {}", axis, step, max_step);
            }
            // A step wider than the deadband can jump across it forever
            if step > deadband {
                bail!("{} step {} is larger than its deadband {}", axis, step, deadband);
            }
        }
        if self.tick_ms == 0 {
            bail!("tick period must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seconds between setpoint recomputations
    pub wakeup_interval_s: u64,
    /// Request tracking as soon as homing completes
    pub autostart: bool,
    /// User bounds in tenths of a degree, min == max disables a bound
    pub min_azimuth: i16,
    pub max_azimuth: i16,
    pub min_zenith: i16,
    pub max_zenith: i16,
    /// Zenith used when reporting the next sunrise
    pub sunrise_zenith: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            wakeup_interval_s: 600,
            autostart: true,
            min_azimuth: 0,
            max_azimuth: 0,
            min_zenith: 0,
            max_zenith: 0,
            sunrise_zenith: clock::ephemeris::HORIZON_ZENITH,
        }
    }
}
