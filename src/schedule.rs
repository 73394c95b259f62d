//! # Weekly alarm schedule
//! This module contains the weekly alarm table and its canonical JSON form.
//!
//! The table maps each weekday to at most one alarm time. A day without an
//! entry is represented as absence, so a legitimately configured midnight
//! alarm stays distinguishable from "no alarm that day".

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::clock::DAYS_PER_WEEK;

/// Number of weekdays as usize for compile-time array sizing
const TABLE_DAYS: usize = DAYS_PER_WEEK as usize;

/// Upper bound in bytes for the serialized table document.
///
/// A full document carries seven entries plus the enabled flag, which stays
/// well below this bound.
pub const TABLE_JSON_MAX: usize = 256;

/// Maximum number of elements accepted in one edit batch. Batches may repeat
/// a day (the last write wins), so this is larger than the table itself.
pub const EDIT_BATCH_MAX: usize = 16;

/// Why a day/hour/minute triple was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    /// The day was outside 1..=7
    DayOutOfRange(u8),
    /// The hour was outside 0..=23
    HourOutOfRange(u8),
    /// The minute was outside 0..=59
    MinuteOutOfRange(u8),
}

/// The payload could not be parsed as a canonical schedule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParseError;

/// The serialized document did not fit the provided buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodeError;

/// One scheduled wake-up time for one weekday.
///
/// Immutable once constructed; construction validates all fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmEntry {
    /// The weekday, 1 to 7
    day: u8,
    /// The hour of the alarm, 0 to 23
    hour: u8,
    /// The minute of the alarm, 0 to 59
    minute: u8,
}

impl AlarmEntry {
    /// Create a new `AlarmEntry`, rejecting out-of-range fields
    pub const fn new(day: u8, hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if day < 1 || day > DAYS_PER_WEEK {
            return Err(ValidationError::DayOutOfRange(day));
        }
        if hour > 23 {
            return Err(ValidationError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(ValidationError::MinuteOutOfRange(minute));
        }
        Ok(Self { day, hour, minute })
    }

    /// Get the weekday of the entry
    pub const fn day(&self) -> u8 {
        self.day
    }

    /// Get the hour of the entry
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Get the minute of the entry
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Seconds since local midnight at which this entry fires
    pub const fn seconds_of_day(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60
    }
}

/// One entry of the canonical wire document
#[derive(Serialize, Deserialize, Clone, Copy)]
struct EntryDoc {
    /// The weekday, 1 to 7
    d: u8,
    /// The hour, 0 to 23
    h: u8,
    /// The minute, 0 to 59
    m: u8,
}

/// The canonical wire document. Field order here is the wire order.
#[derive(Serialize, Deserialize)]
struct TableDoc {
    /// Whether the alarm is enabled
    enabled: bool,
    /// The configured entries, one per day at most
    alarms: Vec<EntryDoc, TABLE_DAYS>,
}

/// The weekly alarm table: at most one alarm time per weekday, plus the
/// global enabled flag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WeeklyAlarmTable {
    /// The configured entries, indexed by day - 1
    entries: [Option<AlarmEntry>; TABLE_DAYS],
    /// The alarm is enabled or disabled
    enabled: bool,
}

impl WeeklyAlarmTable {
    /// Create a new empty, disabled table
    pub const fn new_empty() -> Self {
        Self {
            entries: [None; TABLE_DAYS],
            enabled: false,
        }
    }

    /// Set the alarm time for a day, replacing any existing entry.
    ///
    /// Out-of-range input is rejected and leaves the table unchanged.
    pub fn set(&mut self, day: u8, hour: u8, minute: u8) -> Result<(), ValidationError> {
        let entry = AlarmEntry::new(day, hour, minute)?;
        self.entries[(day - 1) as usize] = Some(entry);
        Ok(())
    }

    /// Get the alarm entry for a day, `None` if the day has no alarm or the
    /// day is out of range
    pub fn get(&self, day: u8) -> Option<AlarmEntry> {
        if day < 1 || day > DAYS_PER_WEEK {
            return None;
        }
        self.entries[(day - 1) as usize]
    }

    /// Check whether a day has an alarm configured
    pub fn has_alarm(&self, day: u8) -> bool {
        self.get(day).is_some()
    }

    /// Get the enabled state
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Set the enabled state
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Serialize the table into its canonical JSON form, writing into `buf`
    /// and returning the number of bytes written.
    ///
    /// An empty table serializes to a valid empty-array document, not an
    /// empty string.
    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut doc = TableDoc {
            enabled: self.enabled,
            alarms: Vec::new(),
        };
        for entry in self.entries.iter().flatten() {
            // capacity equals the number of days, so this cannot overflow
            let _ = doc.alarms.push(EntryDoc {
                d: entry.day(),
                h: entry.hour(),
                m: entry.minute(),
            });
        }
        serde_json_core::ser::to_slice(&doc, buf).map_err(|_e| EncodeError)
    }

    /// Deserialize a table from its canonical JSON form.
    ///
    /// Entries with out-of-range fields are dropped; a structurally
    /// malformed payload is an error and the caller decides how to recover.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ParseError> {
        let (doc, _used) =
            serde_json_core::de::from_slice::<TableDoc>(bytes).map_err(|_e| ParseError)?;

        let mut table = Self::new_empty();
        table.set_enabled(doc.enabled);
        for entry in &doc.alarms {
            if let Err(_e) = table.set(entry.d, entry.h, entry.m) {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropping invalid persisted alarm entry: {:?}", _e);
            }
        }
        Ok(table)
    }

    /// Apply a batch of edits, a bare JSON array of `{d,h,m}` objects.
    ///
    /// Entries with out-of-range fields are dropped; a malformed payload is
    /// rejected as a whole and leaves the table unchanged. Returns the
    /// number of entries applied.
    pub fn apply_edits(&mut self, payload: &[u8]) -> Result<usize, ParseError> {
        let (edits, _used) =
            serde_json_core::de::from_slice::<Vec<EntryDoc, EDIT_BATCH_MAX>>(payload)
                .map_err(|_e| ParseError)?;

        let mut applied = 0;
        for edit in &edits {
            match self.set(edit.d, edit.h, edit.m) {
                Ok(()) => applied += 1,
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Dropping invalid alarm edit: {:?}", _e);
                }
            }
        }
        Ok(applied)
    }
}

impl Default for WeeklyAlarmTable {
    fn default() -> Self {
        Self::new_empty()
    }
}
