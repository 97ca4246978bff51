// H-bridge motor drive for the two mount axes.
//
// Each axis has two complementary direction outputs (A raises the angle,
// B lowers it). Both high shorts the bridge on the real board, so every
// transition lowers the opposite output before raising the new one.

use crate::shared::{LimitFlags, SharedState};
use core::cell::RefCell;
use core::fmt;
use critical_section::Mutex;
use embedded_hal::digital::{Error as _, ErrorKind, OutputPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Stop,
    /// Output A high, angle increases
    Forward,
    /// Output B high, angle decreases
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveError {
    Tilt(ErrorKind),
    Turn(ErrorKind),
    Power(ErrorKind),
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveError::Tilt(kind) => write!(f, "tilt output write failed: {:?}", kind),
            DriveError::Turn(kind) => write!(f, "turn output write failed: {:?}", kind),
            DriveError::Power(kind) => write!(f, "motor power output write failed: {:?}", kind),
        }
    }
}

impl std::error::Error for DriveError {}

/// Output stage the controller and the latch talk to.
///
/// Implementations enforce the safety gates themselves; callers only say
/// what they would like. The returned direction is what was actually put on
/// the pins.
pub trait Drive {
    /// `limits` are the latched and live tilt limit switches. A latched
    /// limit refuses travel into it and still allows travel away from it.
    fn drive_tilt(&mut self, direction: Direction, limits: LimitFlags)
        -> Result<Direction, DriveError>;

    /// Moves only once the tilt axis is inside its deadband.
    fn drive_turn(&mut self, direction: Direction) -> Result<Direction, DriveError>;

    /// All direction outputs low, power off. Safe from interrupt context.
    fn halt(&mut self) -> Result<(), DriveError>;
}

/// One axis worth of complementary outputs.
pub struct HBridge<A, B> {
    a: A,
    b: B,
    direction: Direction,
}

impl<A, B> HBridge<A, B>
where
    A: OutputPin,
    B: OutputPin,
{
    pub fn new(a: A, b: B) -> Self {
        HBridge {
            a,
            b,
            direction: Direction::Stop,
        }
    }

    /// Last pattern written successfully
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set(&mut self, direction: Direction) -> Result<(), ErrorKind> {
        let result = match direction {
            Direction::Stop => {
                // Attempt both even if the first write fails
                let a = self.a.set_low().map_err(|e| e.kind());
                let b = self.b.set_low().map_err(|e| e.kind());
                a.and(b)
            }
            Direction::Forward => {
                self.b.set_low().map_err(|e| e.kind())?;
                self.a.set_high().map_err(|e| e.kind())
            }
            Direction::Reverse => {
                self.a.set_low().map_err(|e| e.kind())?;
                self.b.set_high().map_err(|e| e.kind())
            }
        };
        self.direction = match result {
            Ok(()) => direction,
            Err(_) => Direction::Stop,
        };
        result
    }
}

/// The mount's drive: tilt and turn bridges plus the motor power relay,
/// gated by the shared enable and e-stop flags.
pub struct MotorDrive<'a, TA, TB, UA, UB, P> {
    shared: &'a SharedState,
    tilt: HBridge<TA, TB>,
    turn: HBridge<UA, UB>,
    power: P,
}

impl<'a, TA, TB, UA, UB, P> MotorDrive<'a, TA, TB, UA, UB, P>
where
    TA: OutputPin,
    TB: OutputPin,
    UA: OutputPin,
    UB: OutputPin,
    P: OutputPin,
{
    pub fn new(
        shared: &'a SharedState,
        tilt: HBridge<TA, TB>,
        turn: HBridge<UA, UB>,
        power: P,
    ) -> Self {
        MotorDrive {
            shared,
            tilt,
            turn,
            power,
        }
    }

    pub fn tilt_direction(&self) -> Direction {
        self.tilt.direction()
    }

    pub fn turn_direction(&self) -> Direction {
        self.turn.direction()
    }

    fn permitted(&self, requested: Direction) -> Direction {
        if self.shared.drive_permitted() {
            requested
        } else {
            Direction::Stop
        }
    }

    // Relay on before a bridge starts, off once both bridges are stopped
    fn power_up(&mut self) -> Result<(), DriveError> {
        self.power
            .set_high()
            .map_err(|e| DriveError::Power(e.kind()))
    }

    fn power_down_if_idle(&mut self) -> Result<(), DriveError> {
        if self.tilt.direction() == Direction::Stop && self.turn.direction() == Direction::Stop {
            self.power
                .set_low()
                .map_err(|e| DriveError::Power(e.kind()))?;
        }
        Ok(())
    }
}

impl<TA, TB, UA, UB, P> Drive for MotorDrive<'_, TA, TB, UA, UB, P>
where
    TA: OutputPin,
    TB: OutputPin,
    UA: OutputPin,
    UB: OutputPin,
    P: OutputPin,
{
    fn drive_tilt(
        &mut self,
        direction: Direction,
        limits: LimitFlags,
    ) -> Result<Direction, DriveError> {
        let applied = match self.permitted(direction) {
            Direction::Forward if limits.contains(LimitFlags::A) => Direction::Stop,
            Direction::Reverse if limits.contains(LimitFlags::B) => Direction::Stop,
            other => other,
        };
        if applied != Direction::Stop {
            self.power_up()?;
        }
        self.tilt.set(applied).map_err(DriveError::Tilt)?;
        self.power_down_if_idle()?;
        Ok(applied)
    }

    fn drive_turn(&mut self, direction: Direction) -> Result<Direction, DriveError> {
        let applied = match self.permitted(direction) {
            Direction::Stop => Direction::Stop,
            _ if !self.shared.tilt().is_reached() => Direction::Stop,
            other => other,
        };
        if applied != Direction::Stop {
            self.power_up()?;
        }
        self.turn.set(applied).map_err(DriveError::Turn)?;
        self.power_down_if_idle()?;
        Ok(applied)
    }

    fn halt(&mut self) -> Result<(), DriveError> {
        let tilt = self.tilt.set(Direction::Stop).map_err(DriveError::Tilt);
        let turn = self.turn.set(Direction::Stop).map_err(DriveError::Turn);
        let power = self
            .power
            .set_low()
            .map_err(|e| DriveError::Power(e.kind()));
        tilt.and(turn).and(power)
    }
}

/// Home for the one drive instance shared by the timer tick and the edge
/// interrupt. Every access runs inside a critical section, so the latch can
/// never observe a half-written bridge pattern.
pub struct DriveCell<D> {
    inner: Mutex<RefCell<Option<D>>>,
}

impl<D> DriveCell<D> {
    pub const fn new() -> Self {
        DriveCell {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    pub fn install(&self, drive: D) {
        critical_section::with(|cs| {
            *self.inner.borrow_ref_mut(cs) = Some(drive);
        });
    }

    /// Runs `f` on the drive, `None` before [`DriveCell::install`].
    pub fn with<R>(&self, f: impl FnOnce(&mut D) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<D> Default for DriveCell<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Bench, BenchDrive};

    const ALL_DIRECTIONS: [Direction; 3] = [Direction::Stop, Direction::Forward, Direction::Reverse];

    fn all_limits() -> [LimitFlags; 4] {
        [
            LimitFlags::empty(),
            LimitFlags::A,
            LimitFlags::B,
            LimitFlags::A | LimitFlags::B,
        ]
    }

    #[test]
    fn test_patterns_are_complementary() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);

        drive.drive_tilt(Direction::Forward, LimitFlags::empty()).unwrap();
        assert_eq!(bench.tilt(), (true, false));
        assert!(bench.power());

        drive.drive_tilt(Direction::Reverse, LimitFlags::empty()).unwrap();
        assert_eq!(bench.tilt(), (false, true));

        drive.drive_tilt(Direction::Stop, LimitFlags::empty()).unwrap();
        assert_eq!(bench.tilt(), (false, false));
        assert!(!bench.power());
    }

    #[test]
    fn test_never_both_high() {
        // The fake pins panic the moment both outputs of one bridge are high
        for enabled in [false, true] {
            for stopped in [false, true] {
                let shared = SharedState::new();
                shared.set_enabled(enabled);
                if stopped {
                    shared.latch_emergency_stop();
                    shared.set_enabled(enabled);
                }
                let bench = Bench::new();
                let mut drive = bench.drive(&shared);
                for limits in all_limits() {
                    for first in ALL_DIRECTIONS {
                        for second in ALL_DIRECTIONS {
                            drive.drive_tilt(first, limits).unwrap();
                            drive.drive_turn(first).unwrap();
                            drive.drive_tilt(second, limits).unwrap();
                            drive.drive_turn(second).unwrap();
                            assert!(!(bench.tilt().0 && bench.tilt().1));
                            assert!(!(bench.turn().0 && bench.turn().1));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_disabled_forces_stop() {
        let shared = SharedState::new();
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);
        assert_eq!(
            drive.drive_tilt(Direction::Forward, LimitFlags::empty()).unwrap(),
            Direction::Stop
        );
        assert_eq!(drive.drive_turn(Direction::Reverse).unwrap(), Direction::Stop);
        assert!(bench.all_low());
    }

    #[test]
    fn test_emergency_stop_overrides_enable() {
        let shared = SharedState::new();
        shared.latch_emergency_stop();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);
        assert_eq!(
            drive.drive_tilt(Direction::Reverse, LimitFlags::empty()).unwrap(),
            Direction::Stop
        );
        assert!(bench.all_low());
    }

    #[test]
    fn test_latched_limit_refuses_only_its_direction() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);

        assert_eq!(
            drive.drive_tilt(Direction::Forward, LimitFlags::A).unwrap(),
            Direction::Stop
        );
        assert_eq!(
            drive.drive_tilt(Direction::Reverse, LimitFlags::A).unwrap(),
            Direction::Reverse
        );
        assert_eq!(
            drive.drive_tilt(Direction::Reverse, LimitFlags::B).unwrap(),
            Direction::Stop
        );
        assert_eq!(
            drive.drive_tilt(Direction::Forward, LimitFlags::B).unwrap(),
            Direction::Forward
        );
    }

    #[test]
    fn test_turn_waits_for_tilt() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        shared.tilt().set_target(600);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);

        assert_eq!(drive.drive_turn(Direction::Forward).unwrap(), Direction::Stop);
        assert_eq!(bench.turn(), (false, false));

        shared.tilt().set_current(590);
        assert_eq!(drive.drive_turn(Direction::Forward).unwrap(), Direction::Forward);
        assert_eq!(bench.turn(), (true, false));
    }

    #[test]
    fn test_power_follows_motion() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);

        drive.drive_tilt(Direction::Forward, LimitFlags::empty()).unwrap();
        drive.drive_turn(Direction::Forward).unwrap();
        drive.drive_tilt(Direction::Stop, LimitFlags::empty()).unwrap();
        assert!(bench.power());
        drive.drive_turn(Direction::Stop).unwrap();
        assert!(!bench.power());
    }

    #[test]
    fn test_halt_clears_everything() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);
        drive.drive_tilt(Direction::Reverse, LimitFlags::empty()).unwrap();
        drive.drive_turn(Direction::Forward).unwrap();
        drive.halt().unwrap();
        assert!(bench.all_low());
        assert_eq!(drive.tilt_direction(), Direction::Stop);
        assert_eq!(drive.turn_direction(), Direction::Stop);
    }

    #[test]
    fn test_pin_failure_is_reported() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let mut drive = bench.drive(&shared);
        bench.fail_writes(true);
        assert_eq!(
            drive.drive_tilt(Direction::Forward, LimitFlags::empty()),
            Err(DriveError::Power(ErrorKind::Other))
        );
        assert_eq!(drive.tilt_direction(), Direction::Stop);
        assert!(drive.halt().is_err());
    }

    #[test]
    fn test_drive_cell() {
        let shared = SharedState::new();
        shared.set_enabled(true);
        let bench = Bench::new();
        let cell: DriveCell<BenchDrive<'_>> = DriveCell::new();
        assert_eq!(cell.with(|d| d.halt()), None);

        cell.install(bench.drive(&shared));
        let applied = cell.with(|d| d.drive_tilt(Direction::Reverse, LimitFlags::empty()));
        assert_eq!(applied, Some(Ok(Direction::Reverse)));
        assert_eq!(bench.tilt(), (false, true));
    }
}
