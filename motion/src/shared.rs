// Process-wide state shared between the three execution contexts of the
// mount: the 100 ms timer tick (controller), the limit/e-stop edge interrupt
// (latch) and the main loop (orchestrator, telemetry).
//
// Every field is a single atomic word, so no access is ever observed half
// written. Each accessor names the context allowed to call it; the rules are
// single-writer, so there are no locks here.

use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU8, Ordering};

/// Marks "no reference pending" in the turn reference mailbox
const NO_REFERENCE: i16 = i16::MIN;

/// Default deadband in tenths of a degree
pub const DEFAULT_DEADBAND: i16 = 50;

bitflags! {
    /// Tilt-axis limit switches latched by the edge interrupt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LimitFlags: u8 {
        /// Upper end of travel (zenith 90.0)
        const A = 0b0000_0001;
        /// Zero-reference end of travel (zenith 0.0)
        const B = 0b0000_0010;
    }
}

/// Current and target angle of one axis, tenths of a degree.
///
/// `current` is written only by the controller tick, `target` only by the
/// orchestrator. Readers may be one tick stale.
#[derive(Debug)]
pub struct AxisState {
    current: AtomicI16,
    target: AtomicI16,
    deadband: AtomicI16,
}

impl AxisState {
    pub const fn new() -> Self {
        AxisState {
            current: AtomicI16::new(0),
            target: AtomicI16::new(0),
            deadband: AtomicI16::new(DEFAULT_DEADBAND),
        }
    }

    /// Any context.
    pub fn current(&self) -> i16 {
        self.current.load(Ordering::SeqCst)
    }

    /// Any context.
    pub fn target(&self) -> i16 {
        self.target.load(Ordering::SeqCst)
    }

    /// Any context.
    pub fn deadband(&self) -> i16 {
        self.deadband.load(Ordering::SeqCst)
    }

    /// Remaining error `target - current`, widened so it cannot overflow.
    pub fn delta(&self) -> i32 {
        self.target() as i32 - self.current() as i32
    }

    /// True inside the deadband.
    pub fn is_reached(&self) -> bool {
        self.delta().abs() <= self.deadband() as i32
    }

    /// Main loop (orchestrator) only.
    pub fn set_target(&self, angle: i16) {
        self.target.store(angle, Ordering::SeqCst);
    }

    /// Controller tick only.
    pub(crate) fn set_current(&self, angle: i16) {
        self.current.store(angle, Ordering::SeqCst);
    }

    /// Controller construction only.
    pub(crate) fn set_deadband(&self, deadband: i16) {
        self.deadband.store(deadband, Ordering::SeqCst);
    }
}

impl Default for AxisState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the mount's contexts share.
#[derive(Debug)]
pub struct SharedState {
    turn: AxisState,
    tilt: AxisState,
    enabled: AtomicBool,
    emergency_stopped: AtomicBool,
    homing_active: AtomicBool,
    limit_hits: AtomicU8,
    turn_reference: AtomicI16,
    tilt_blocked: AtomicBool,
}

impl SharedState {
    /// Power-up state: drive disabled, not e-stopped, homing pending.
    pub const fn new() -> Self {
        SharedState {
            turn: AxisState::new(),
            tilt: AxisState::new(),
            enabled: AtomicBool::new(false),
            emergency_stopped: AtomicBool::new(false),
            homing_active: AtomicBool::new(true),
            limit_hits: AtomicU8::new(0),
            turn_reference: AtomicI16::new(NO_REFERENCE),
            tilt_blocked: AtomicBool::new(false),
        }
    }

    pub fn turn(&self) -> &AxisState {
        &self.turn
    }

    pub fn tilt(&self) -> &AxisState {
        &self.tilt
    }

    // ---- telemetry queries, any context, may be one tick stale ----------

    pub fn turn_angle(&self) -> i16 {
        self.turn.current()
    }

    pub fn tilt_angle(&self) -> i16 {
        self.tilt.current()
    }

    pub fn is_turn_reached(&self) -> bool {
        self.turn.is_reached()
    }

    pub fn is_tilt_reached(&self) -> bool {
        self.tilt.is_reached()
    }

    // ---- drive enable ----------------------------------------------------

    /// Any context.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Main loop, or the latch (which only ever clears it).
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Any context.
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stopped.load(Ordering::SeqCst)
    }

    /// Interrupt latch only. Never auto-clears.
    pub(crate) fn latch_emergency_stop(&self) {
        self.emergency_stopped.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Main loop only; the explicit external clear.
    pub(crate) fn clear_emergency_stop(&self) {
        self.emergency_stopped.store(false, Ordering::SeqCst);
    }

    /// Permission to energize any output.
    pub fn drive_permitted(&self) -> bool {
        self.is_enabled() && !self.is_emergency_stopped()
    }

    /// Any context.
    pub fn is_homing_active(&self) -> bool {
        self.homing_active.load(Ordering::SeqCst)
    }

    /// Controller only.
    pub(crate) fn set_homing_active(&self, active: bool) {
        self.homing_active.store(active, Ordering::SeqCst);
    }

    // ---- limit latch -----------------------------------------------------

    /// Interrupt latch only. ORs, so an unconsumed event is never lost.
    pub(crate) fn latch_limits(&self, limits: LimitFlags) {
        if !limits.is_empty() {
            self.limit_hits.fetch_or(limits.bits(), Ordering::SeqCst);
        }
    }

    /// Controller tick only. Atomic read-and-clear, so an edge landing
    /// between the read and the clear cannot be dropped.
    pub(crate) fn take_limit_hits(&self) -> LimitFlags {
        LimitFlags::from_bits_truncate(self.limit_hits.swap(0, Ordering::SeqCst))
    }

    /// Any context; peeks without consuming.
    pub fn pending_limit_hits(&self) -> LimitFlags {
        LimitFlags::from_bits_truncate(self.limit_hits.load(Ordering::SeqCst))
    }

    // ---- turn drift reference -------------------------------------------

    /// Main loop only. Posts a new turn-axis actual value for the controller
    /// to adopt on its next tick.
    pub fn request_turn_reference(&self, angle: i16) {
        self.turn_reference.store(angle, Ordering::SeqCst);
    }

    /// Controller tick only.
    pub(crate) fn take_turn_reference(&self) -> Option<i16> {
        match self.turn_reference.swap(NO_REFERENCE, Ordering::SeqCst) {
            NO_REFERENCE => None,
            angle => Some(angle),
        }
    }

    /// Any context. Set while the tilt axis wants to move but a latched
    /// limit refuses the direction.
    pub fn is_tilt_blocked(&self) -> bool {
        self.tilt_blocked.load(Ordering::SeqCst)
    }

    /// Controller tick only. Returns the previous value.
    pub(crate) fn set_tilt_blocked(&self, blocked: bool) -> bool {
        self.tilt_blocked.swap(blocked, Ordering::SeqCst)
    }

    /// Telemetry snapshot. Fields are read one by one, so the snapshot may
    /// straddle a tick; good enough for display.
    pub fn status(&self) -> MountStatus {
        MountStatus {
            turn_angle: self.turn.current(),
            turn_target: self.turn.target(),
            tilt_angle: self.tilt.current(),
            tilt_target: self.tilt.target(),
            enabled: self.is_enabled(),
            emergency_stopped: self.is_emergency_stopped(),
            homing_active: self.is_homing_active(),
            tilt_blocked: self.is_tilt_blocked(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view for the AT-command and logging layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountStatus {
    pub turn_angle: i16,
    pub turn_target: i16,
    pub tilt_angle: i16,
    pub tilt_target: i16,
    pub enabled: bool,
    pub emergency_stopped: bool,
    pub homing_active: bool,
    pub tilt_blocked: bool,
}
