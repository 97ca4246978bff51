use crate::config::ControllerConfig;
use crate::drive::{Direction, Drive, DriveError};
use crate::shared::{AxisState, LimitFlags, SharedState};
use crate::states::ControllerState;

/// Change of the blocked-tilt anomaly seen by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiltBlock {
    Refused {
        requested: Direction,
        angle: i16,
        target: i16,
    },
    Released,
}

/// Transitions of one tick. The tick itself runs with interrupts masked and
/// never logs; the caller logs the report once the drive is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Turn angle taken from the reference mailbox
    pub referenced: Option<i16>,
    /// Tilt reference set by homing
    pub homed: Option<i16>,
    pub tilt_block: Option<TiltBlock>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        *self == TickReport::default()
    }

    pub fn log(&self) {
        if let Some(angle) = self.referenced {
            log::info!("Turn angle re-referenced to {}", angle);
        }
        if let Some(angle) = self.homed {
            log::info!("Homing complete, tilt referenced to {}", angle);
        }
        match self.tilt_block {
            Some(TiltBlock::Refused {
                requested,
                angle,
                target,
            }) => log::warn!(
                "Tilt {:?} refused by limit switch at {} (target {})",
                requested,
                angle,
                target
            ),
            Some(TiltBlock::Released) => log::info!("Tilt travel no longer blocked"),
            None => {}
        }
    }
}

/// Three-point regulator for both mount axes, run from the periodic tick.
///
/// Angles are advanced open loop by a fixed step for every tick a motor is
/// actually driven, so they drift from the true position over time. The tilt
/// axis is referenced once by homing against a limit switch; the turn axis is
/// re-synchronized through [`SharedState::request_turn_reference`].
pub struct MotorController<'a> {
    shared: &'a SharedState,
    config: ControllerConfig,
    state: ControllerState,
}

impl<'a> MotorController<'a> {
    /// Starts in Homing and publishes the deadbands.
    pub fn new(shared: &'a SharedState, config: ControllerConfig) -> Self {
        shared.turn().set_deadband(config.turn_deadband);
        shared.tilt().set_deadband(config.tilt_deadband);
        shared.set_homing_active(true);
        MotorController {
            shared,
            config,
            state: ControllerState::Homing,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// One controller period. Never reentered.
    ///
    /// `raw` is a fresh read of the tilt limit lines, merged with whatever
    /// the edge interrupt latched since the last tick. On a write failure
    /// all outputs are dropped and the error is handed back for logging.
    pub fn tick<D: Drive>(&mut self, drive: &mut D, raw: LimitFlags) -> Result<TickReport, DriveError> {
        let mut report = TickReport::default();
        if let Some(angle) = self.shared.take_turn_reference() {
            self.shared.turn().set_current(angle);
            report.referenced = Some(angle);
        }

        if !self.shared.drive_permitted() {
            // Latched limit hits stay pending for the next permitted tick
            drive.drive_tilt(Direction::Stop, LimitFlags::empty())?;
            if self.state == ControllerState::Tracking {
                drive.drive_turn(Direction::Stop)?;
            }
            return Ok(report);
        }

        let limits = self.shared.take_limit_hits() | raw;
        let result = match self.state {
            ControllerState::Homing => self.home(drive, limits, &mut report),
            ControllerState::Tracking => self.track(drive, limits, &mut report),
        };
        if result.is_err() {
            let _ = drive.halt();
        }
        result.map(|_| report)
    }

    fn home<D: Drive>(
        &mut self,
        drive: &mut D,
        limits: LimitFlags,
        report: &mut TickReport,
    ) -> Result<(), DriveError> {
        // B wins when both fire: it is the end homing drives toward
        let reference = if limits.contains(LimitFlags::B) {
            Some(self.config.home_b)
        } else if limits.contains(LimitFlags::A) {
            Some(self.config.home_a)
        } else {
            None
        };

        match reference {
            Some(angle) => {
                self.shared.tilt().set_current(angle);
                self.state = self.state.next();
                self.shared.set_homing_active(false);
                report.homed = Some(angle);
                drive.drive_tilt(Direction::Stop, limits)?;
            }
            None => {
                drive.drive_tilt(Direction::Reverse, limits)?;
            }
        }
        Ok(())
    }

    fn track<D: Drive>(
        &mut self,
        drive: &mut D,
        limits: LimitFlags,
        report: &mut TickReport,
    ) -> Result<(), DriveError> {
        let tilt = self.shared.tilt();
        let requested = regulate(tilt);
        let applied = drive.drive_tilt(requested, limits)?;
        if applied == requested {
            advance(tilt, applied, self.config.tilt_step);
        }

        let blocked = requested != applied;
        if self.shared.set_tilt_blocked(blocked) != blocked {
            report.tilt_block = Some(if blocked {
                TiltBlock::Refused {
                    requested,
                    angle: tilt.current(),
                    target: tilt.target(),
                }
            } else {
                TiltBlock::Released
            });
        }

        // Evaluated after the tilt update so the turn gate sees this tick's angle
        let turn = self.shared.turn();
        let requested = regulate(turn);
        let applied = drive.drive_turn(requested)?;
        if applied == requested {
            advance(turn, applied, self.config.turn_step);
        }
        Ok(())
    }
}

/// Three-point decision for one axis
fn regulate(axis: &AxisState) -> Direction {
    let delta = axis.delta();
    let deadband = axis.deadband() as i32;
    if delta > deadband {
        Direction::Forward
    } else if delta < -deadband {
        Direction::Reverse
    } else {
        Direction::Stop
    }
}

fn advance(axis: &AxisState, direction: Direction, step: i16) {
    match direction {
        Direction::Forward => axis.set_current(axis.current().saturating_add(step)),
        Direction::Reverse => axis.set_current(axis.current().saturating_sub(step)),
        Direction::Stop => {}
    }
}
