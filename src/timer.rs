//! # Timer dispatcher interface
//! This module contains the interface to the external timer collaborator.
//!
//! The scheduler never talks to a concrete timer directly: it arms and
//! cancels callback slots through [`TimerDispatcher`] and exclusively owns
//! the returned handles. The production dispatcher forwards the commands to
//! the wake-timer and ramp run loops; tests substitute a recording mock.

/// What to schedule on the timer dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerSpec {
    /// One-shot wake trigger that fires once after the given delay
    WakeAfter {
        /// Delay until the trigger fires, in seconds
        seconds: u64,
    },
    /// Periodic ramp tick
    RampTick {
        /// Interval between ticks, in seconds
        period_seconds: u64,
    },
}

/// The two callback slots the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// The weekly wake trigger
    WakeTrigger,
    /// The periodic ramp tick
    RampTick,
}

/// Token for an armed callback slot.
///
/// Each arm call yields a handle with a fresh generation; a slot is live
/// only while the scheduler still holds the handle with the current
/// generation, which is what lets a cancellation win against an in-flight
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle {
    /// Which callback slot this handle refers to
    kind: TimerKind,
    /// Generation assigned by the dispatcher at arm time
    generation: u32,
}

impl TimerHandle {
    /// Create a new `TimerHandle`. Called by dispatcher implementations.
    pub const fn new(kind: TimerKind, generation: u32) -> Self {
        Self { kind, generation }
    }

    /// Get the callback slot this handle refers to
    pub const fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Get the generation assigned at arm time
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// The dispatcher could not arm the requested callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmError {
    /// The dispatcher has no free callback resources left
    Exhausted,
}

/// The external timer collaborator.
///
/// `arm` schedules the callback described by the spec and returns a handle;
/// `cancel` revokes a previously armed handle. Cancelling is always
/// accepted, even when the callback already fired.
pub trait TimerDispatcher {
    /// Arm a callback slot, returning its handle
    fn arm(&mut self, spec: TimerSpec) -> Result<TimerHandle, ArmError>;

    /// Cancel a previously armed callback slot
    fn cancel(&mut self, handle: TimerHandle);
}
