// Host-side stand-ins for the board's output pins.

use crate::drive::{HBridge, MotorDrive};
use crate::shared::SharedState;
use embedded_hal::digital::{Error, ErrorKind, ErrorType, OutputPin};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const TILT_A: usize = 0;
const TILT_B: usize = 1;
const TURN_A: usize = 2;
const TURN_B: usize = 3;
const POWER: usize = 4;

#[derive(Debug)]
pub struct PinFault;

impl Error for PinFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Output pin writing into the bench's level table. Panics if it is driven
/// high while its bridge partner is high.
pub struct FakePin {
    levels: Rc<RefCell<[bool; 5]>>,
    fail: Rc<Cell<bool>>,
    index: usize,
    partner: Option<usize>,
}

impl ErrorType for FakePin {
    type Error = PinFault;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(PinFault);
        }
        self.levels.borrow_mut()[self.index] = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(PinFault);
        }
        let mut levels = self.levels.borrow_mut();
        if let Some(partner) = self.partner {
            assert!(!levels[partner], "both H-bridge outputs driven high");
        }
        levels[self.index] = true;
        Ok(())
    }
}

pub type BenchDrive<'a> = MotorDrive<'a, FakePin, FakePin, FakePin, FakePin, FakePin>;

/// Five fake outputs: tilt A/B, turn A/B, motor power.
pub struct Bench {
    levels: Rc<RefCell<[bool; 5]>>,
    fail: Rc<Cell<bool>>,
}

impl Bench {
    pub fn new() -> Self {
        Bench {
            levels: Rc::new(RefCell::new([false; 5])),
            fail: Rc::new(Cell::new(false)),
        }
    }

    fn pin(&self, index: usize, partner: Option<usize>) -> FakePin {
        FakePin {
            levels: self.levels.clone(),
            fail: self.fail.clone(),
            index,
            partner,
        }
    }

    pub fn drive<'a>(&self, shared: &'a SharedState) -> BenchDrive<'a> {
        MotorDrive::new(
            shared,
            HBridge::new(self.pin(TILT_A, Some(TILT_B)), self.pin(TILT_B, Some(TILT_A))),
            HBridge::new(self.pin(TURN_A, Some(TURN_B)), self.pin(TURN_B, Some(TURN_A))),
            self.pin(POWER, None),
        )
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn tilt(&self) -> (bool, bool) {
        let levels = self.levels.borrow();
        (levels[TILT_A], levels[TILT_B])
    }

    pub fn turn(&self) -> (bool, bool) {
        let levels = self.levels.borrow();
        (levels[TURN_A], levels[TURN_B])
    }

    pub fn power(&self) -> bool {
        self.levels.borrow()[POWER]
    }

    /// All four direction outputs low
    pub fn all_low(&self) -> bool {
        let levels = self.levels.borrow();
        !levels[TILT_A] && !levels[TILT_B] && !levels[TURN_A] && !levels[TURN_B]
    }
}
