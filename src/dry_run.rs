// Host build: one simulated tracking cycle against the system clock, with
// the H-bridge replaced by a drive that applies whatever it is asked.

use crate::config::Config;
use chrono::{Duration, NaiveDateTime, Utc};
use clock::ephemeris::{self, Observer};
use clock::DateTimeSource;
use motion::{
    Direction, Drive, DriveError, GpsFix, LimitFlags, MotorController, SharedState, SolarTracker,
    WakeupOutcome,
};

/// Give up on a cycle that has not settled after this many ticks
const MAX_TICKS: u32 = 100_000;

/// System time shifted into the station's local standard time
struct SystemClock {
    timezone_offset_hours: f64,
}

impl DateTimeSource for SystemClock {
    fn date_time(&mut self) -> anyhow::Result<NaiveDateTime> {
        let offset = Duration::seconds((self.timezone_offset_hours * 3600.0).round() as i64);
        Ok(Utc::now().naive_utc() + offset)
    }

    fn timezone_offset_hours(&self) -> f64 {
        self.timezone_offset_hours
    }
}

struct DryRunDrive;

impl Drive for DryRunDrive {
    fn drive_tilt(&mut self, direction: Direction, _limits: LimitFlags) -> Result<Direction, DriveError> {
        Ok(direction)
    }

    fn drive_turn(&mut self, direction: Direction) -> Result<Direction, DriveError> {
        Ok(direction)
    }

    fn halt(&mut self) -> Result<(), DriveError> {
        Ok(())
    }
}

pub fn run(config: &Config) -> anyhow::Result<()> {
    println!(
        "Station {}: lat {}, lon {}, alt {}",
        config.get_station_id(),
        config.get_latitude(),
        config.get_longitude(),
        config.get_altitude()
    );

    let mut clock = SystemClock {
        timezone_offset_hours: config.get_timezone_offset(),
    };
    let now = clock.date_time()?;
    let observer = Observer {
        latitude_deg: config.get_latitude(),
        longitude_deg: config.get_longitude(),
        timezone_offset_hours: config.get_timezone_offset(),
    };
    let zenith = config.tracking.sunrise_zenith;
    match ephemeris::sunrise_and_sunset(now.date(), &observer, zenith, zenith) {
        Ok((rise, set)) => println!("{}: sunrise {:.3} h, sunset {:.3} h", now.date(), rise, set),
        Err(e) => println!("{}: {}", now.date(), e),
    }

    let shared = SharedState::new();
    let mut controller = MotorController::new(&shared, config.motor.clone());
    let mut tracker = SolarTracker::new(&shared, config.tracking.clone());
    let mut drive = DryRunDrive;

    // Homing is cut short by pretending the zero switch is already closed
    tracker.seed_turn_reference(config.location.heading);
    tracker.tracking_cmd(true);
    controller.tick(&mut drive, LimitFlags::B)?.log();
    tracker.tracking_cmd(true);

    let mut gps = GpsFix::fixed(
        config.get_latitude(),
        config.get_longitude(),
        config.get_altitude() as i32,
    );
    let outcome = tracker.task_wakeup(&mut clock, &mut gps);
    println!("{}: {:?} {:?}", now, outcome, tracker.setpoint());
    if outcome != WakeupOutcome::Tracking {
        return Ok(());
    }

    let mut ticks = 0;
    while shared.is_enabled() && ticks < MAX_TICKS {
        controller.tick(&mut drive, LimitFlags::empty())?.log();
        tracker.task_1s();
        ticks += 1;
    }
    println!(
        "Aligned after {} ticks ({} ms each): {:?}",
        ticks,
        controller.config().tick_ms,
        shared.status()
    );
    Ok(())
}
