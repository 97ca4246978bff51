use crate::config::TrackingConfig;
use crate::shared::SharedState;
use bitflags::bitflags;
use chrono::NaiveDateTime;
use clock::clock::decimal_hours;
use clock::ephemeris::{self, Observer};
use clock::DateTimeSource;

bitflags! {
    /// Which fields of a GPS fix the receiver vouches for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FixValidity: u8 {
        const LATITUDE = 0b0000_0001;
        const LONGITUDE = 0b0000_0010;
        const ALTITUDE = 0b0000_0100;
    }
}

/// Latest fix as handed over by the NMEA layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsFix {
    /// Ten-thousandths of a degree, north positive
    pub latitude_e4: i32,
    /// Ten-thousandths of a degree, east positive
    pub longitude_e4: i32,
    /// Metres above sea level
    pub altitude: i32,
    pub valid: FixValidity,
}

impl GpsFix {
    /// Fix for a surveyed, fixed station position
    pub fn fixed(latitude_deg: f64, longitude_deg: f64, altitude: i32) -> Self {
        GpsFix {
            latitude_e4: (latitude_deg * 10_000.0).round() as i32,
            longitude_e4: (longitude_deg * 10_000.0).round() as i32,
            altitude,
            valid: FixValidity::all(),
        }
    }

    pub fn has_position(&self) -> bool {
        self.valid
            .contains(FixValidity::LATITUDE | FixValidity::LONGITUDE)
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude_e4 as f64 / 10_000.0
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude_e4 as f64 / 10_000.0
    }
}

/// Where the orchestrator gets its position from.
pub trait PositionSource {
    fn latest_fix(&mut self) -> GpsFix;
}

impl PositionSource for GpsFix {
    fn latest_fix(&mut self) -> GpsFix {
        *self
    }
}

/// Sun direction in tenths of a degree, as last computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolarSetpoint {
    pub azimuth: i16,
    pub zenith: i16,
    pub valid: bool,
}

/// Closed range in tenths of a degree; `min == max` switches it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bound {
    pub min: i16,
    pub max: i16,
}

impl Bound {
    pub const fn new(min: i16, max: i16) -> Self {
        Bound { min, max }
    }

    pub fn is_enabled(&self) -> bool {
        self.min != self.max
    }

    pub fn permits(&self, value: i16) -> bool {
        !self.is_enabled() || (self.min..=self.max).contains(&value)
    }
}

/// Tilt travel of the mount, zenith 0.0 to 90.0 degrees
pub const DEVICE_ZENITH: Bound = Bound::new(0, 900);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingLimits {
    pub azimuth: Bound,
    pub zenith: Bound,
}

impl TrackingLimits {
    pub fn new(min_azimuth: i16, max_azimuth: i16, min_zenith: i16, max_zenith: i16) -> Self {
        TrackingLimits {
            azimuth: Bound::new(min_azimuth, max_azimuth),
            zenith: Bound::new(min_zenith, max_zenith),
        }
    }

    /// The device zenith range is always enforced; the user bounds only
    /// when enabled.
    pub fn permits(&self, azimuth: i16, zenith: i16) -> bool {
        DEVICE_ZENITH.permits(zenith) && self.azimuth.permits(azimuth) && self.zenith.permits(zenith)
    }
}

/// What one wakeup did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupOutcome {
    /// Tracking is off, nothing computed
    Inactive,
    NoFix,
    ClockUnavailable,
    EphemerisFailed,
    /// Sun outside the device or user limits
    OutOfBounds,
    /// New targets pushed to the controller
    Tracking,
}

/// The orchestrator: turns time and position into axis targets and decides
/// when the drive may run. Runs in the main loop.
pub struct SolarTracker<'a> {
    shared: &'a SharedState,
    config: TrackingConfig,
    limits: TrackingLimits,
    active: bool,
    setpoint: SolarSetpoint,
}

impl<'a> SolarTracker<'a> {
    pub fn new(shared: &'a SharedState, config: TrackingConfig) -> Self {
        let limits = TrackingLimits::new(
            config.min_azimuth,
            config.max_azimuth,
            config.min_zenith,
            config.max_zenith,
        );
        SolarTracker {
            shared,
            config,
            limits,
            active: false,
            setpoint: SolarSetpoint::default(),
        }
    }

    /// Turns tracking on or off. While homing is in progress the request is
    /// ignored and the drive is enabled instead, so homing always completes.
    pub fn tracking_cmd(&mut self, enable: bool) {
        if self.shared.is_homing_active() {
            log::info!("Homing in progress, enabling drive");
            self.shared.set_enabled(true);
        } else {
            if self.active != enable {
                log::info!("Tracking {}", if enable { "enabled" } else { "disabled" });
            }
            self.active = enable;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active
    }

    pub fn set_limits(&mut self, min_azimuth: i16, max_azimuth: i16, min_zenith: i16, max_zenith: i16) {
        self.limits = TrackingLimits::new(min_azimuth, max_azimuth, min_zenith, max_zenith);
        log::info!(
            "Tracking limits azimuth {}..{}, zenith {}..{}",
            min_azimuth,
            max_azimuth,
            min_zenith,
            max_zenith
        );
    }

    pub fn limits(&self) -> TrackingLimits {
        self.limits
    }

    /// Last computed setpoint, for display
    pub fn setpoint(&self) -> SolarSetpoint {
        self.setpoint
    }

    /// Re-synchronizes the turn angle from an external heading (magnetometer
    /// or stored value). Applied by the controller on its next tick.
    pub fn seed_turn_reference(&self, azimuth: i16) {
        log::info!("Seeding turn reference with {}", azimuth);
        self.shared.request_turn_reference(azimuth);
    }

    /// The explicit external clear a latched e-stop needs. An interrupted
    /// homing run is resumed at once; otherwise the drive stays disabled
    /// until the next wakeup decides it has work to do.
    pub fn clear_emergency_stop(&self) {
        if self.shared.is_emergency_stopped() {
            log::warn!("Emergency stop cleared");
            self.shared.clear_emergency_stop();
            if self.shared.is_homing_active() {
                log::info!("Resuming homing");
                self.shared.set_enabled(true);
            }
        }
    }

    /// Once per second: cut the drive once both axes have arrived, or when
    /// the setpoint is unusable. A setpoint that was never computed counts
    /// as unusable.
    pub fn task_1s(&mut self) {
        if !self.active {
            return;
        }
        let arrived = self.shared.is_turn_reached() && self.shared.is_tilt_reached();
        if (!self.setpoint.valid || arrived) && self.shared.is_enabled() {
            log::info!(
                "Drive off ({})",
                if self.setpoint.valid { "aligned" } else { "no valid setpoint" }
            );
            self.shared.set_enabled(false);
        }
    }

    /// Recomputes the setpoint and pushes new targets.
    pub fn task_wakeup<C, P>(&mut self, clock: &mut C, gps: &mut P) -> WakeupOutcome
    where
        C: DateTimeSource,
        P: PositionSource,
    {
        if !self.active {
            return WakeupOutcome::Inactive;
        }
        self.setpoint.valid = false;

        let fix = gps.latest_fix();
        if !fix.has_position() {
            log::warn!("No position fix, tracking paused");
            return self.invalidate(WakeupOutcome::NoFix);
        }

        let now = match clock.date_time() {
            Ok(now) => now,
            Err(e) => {
                log::error!("Failed to read the clock: {:?}", e);
                return self.invalidate(WakeupOutcome::ClockUnavailable);
            }
        };

        let observer = Observer {
            latitude_deg: fix.latitude_deg(),
            longitude_deg: fix.longitude_deg(),
            timezone_offset_hours: clock.timezone_offset_hours(),
        };
        let position = match ephemeris::sun_position(now.date(), decimal_hours(now.time()), &observer)
        {
            Ok(position) => position,
            Err(e) => {
                log::error!("Sun position failed: {}", e);
                return self.invalidate(WakeupOutcome::EphemerisFailed);
            }
        };

        // Both lie well inside i16: azimuth < 3600, zenith <= 1800
        let azimuth = ephemeris::degrees_to_tenths(position.azimuth_deg) as i16;
        let zenith = ephemeris::degrees_to_tenths(position.zenith_deg) as i16;

        // A rejected position leaves the last accepted one on display
        if !self.limits.permits(azimuth, zenith) {
            log::info!("Sun at azimuth {} zenith {} is outside the tracking limits", azimuth, zenith);
            if !DEVICE_ZENITH.permits(zenith) {
                self.log_next_sunrise(now, &observer);
            }
            return self.invalidate(WakeupOutcome::OutOfBounds);
        }

        self.setpoint = SolarSetpoint {
            azimuth,
            zenith,
            valid: true,
        };
        self.shared.turn().set_target(azimuth);
        self.shared.tilt().set_target(zenith);
        log::info!("Tracking azimuth {} zenith {}", azimuth, zenith);

        if !self.shared.is_turn_reached() || !self.shared.is_tilt_reached() {
            self.shared.set_enabled(true);
        }
        WakeupOutcome::Tracking
    }

    fn invalidate(&mut self, outcome: WakeupOutcome) -> WakeupOutcome {
        self.setpoint.valid = false;
        self.shared.set_enabled(false);
        outcome
    }

    fn log_next_sunrise(&self, now: NaiveDateTime, observer: &Observer) {
        let zenith = self.config.sunrise_zenith;
        let today = now.date();
        let date = match ephemeris::solve_time_for_zenith(today, observer, zenith, ephemeris::SunEvent::Set) {
            Ok(set) if decimal_hours(now.time()) >= set => today.succ_opt().unwrap_or(today),
            _ => today,
        };
        match ephemeris::solve_time_for_zenith(date, observer, zenith, ephemeris::SunEvent::Rise) {
            Ok(rise) => log::info!("Sun below the horizon, next sunrise {} at {:.2} h", date, rise),
            Err(e) => log::info!("Sun below the horizon, no sunrise on {}: {}", date, e),
        }
    }
}
