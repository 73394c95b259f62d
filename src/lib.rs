//! # Wake light controller core
//! Board-agnostic core of a wake-up light: a weekly alarm schedule, the
//! scheduler that arms a timer for the next occurrence, a sunrise effect
//! that ramps brightness and colour temperature once the trigger fires,
//! and persistence of the schedule across power cycles.
//!
//! This crate contains no hardware dependencies. The device-specific
//! collaborators are trait seams the firmware implements:
//!
//! - [`persist::PersistenceGateway`]: durable load/save of the schedule
//! - [`clock::Clock`]: the wall clock, typically an RTC set over the
//!   network
//! - [`sunrise::LedOutput`]: pushing one solid frame to the LED strip
//! - [`timer::TimerDispatcher`]: arming and cancelling timer callbacks;
//!   the production dispatcher inside [`controller::WakeLight`] drives the
//!   two run loops, tests substitute a recording mock
//!
//! The firmware constructs one [`controller::WakeLight`], calls
//! [`controller::WakeLight::boot`] at startup, spawns
//! [`controller::WakeLight::run_wake_timer`] and
//! [`controller::WakeLight::run_ramp`] as executor tasks and routes the
//! HTTP handlers to the controller operations.

#![no_std]

pub mod clock;
pub mod controller;
pub mod persist;
pub mod schedule;
pub mod scheduler;
pub mod sunrise;
pub mod timer;

pub use clock::{Clock, WallTime};
pub use controller::{BootStatus, DisableError, EditError, EnableError, WakeLight};
pub use persist::{LoadedTable, PersistenceGateway, load_table};
pub use schedule::{
    AlarmEntry, EncodeError, ParseError, TABLE_JSON_MAX, ValidationError, WeeklyAlarmTable,
};
pub use scheduler::{
    AlarmScheduler, DisableOutcome, NextOccurrence, SchedulerError, SchedulerMode, next_occurrence,
};
pub use sunrise::{
    LedOutput, RampConfig, RampFrame, RampState, SunriseRampController, WARMTH, advance_ramp,
};
pub use timer::{ArmError, TimerDispatcher, TimerHandle, TimerKind, TimerSpec};
