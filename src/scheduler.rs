//! # Alarm scheduler
//! This module contains the scheduler state machine that turns the weekly
//! alarm table into armed timer callbacks.
//!
//! The scheduler owns the two timer handles (wake trigger and ramp tick)
//! exclusively: no other component arms or cancels them. All transitions
//! are synchronous; persisting the resulting state is the caller's affair.

use crate::clock::{DAYS_PER_WEEK, SECONDS_PER_DAY, WallTime};
use crate::schedule::{AlarmEntry, WeeklyAlarmTable};
use crate::sunrise::SunriseRampController;
use crate::timer::{ArmError, TimerDispatcher, TimerHandle, TimerSpec};

/// The states of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerMode {
    /// No wake trigger is armed
    Disabled,
    /// A wake trigger is armed for the next occurrence
    Enabled,
}

/// Why enabling the scheduler failed. The state stays `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// No day in the table has an alarm configured
    NoAlarmConfigured,
    /// The timer dispatcher rejected the arm request
    ArmFailure(ArmError),
}

/// Result of a disable call, which is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisableOutcome {
    /// The scheduler was enabled or had armed timers and is now disarmed
    Disarmed,
    /// The scheduler was already disabled, nothing was cancelled
    AlreadyDisabled,
}

/// The next time the alarm will fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NextOccurrence {
    /// The entry that fires
    pub entry: AlarmEntry,
    /// How many days ahead it fires: 0 for later today, 7 for the same
    /// weekday next week
    pub days_ahead: u8,
}

impl NextOccurrence {
    /// Seconds from `now` until this occurrence fires
    pub fn seconds_from(&self, now: WallTime) -> u64 {
        let target = u64::from(self.days_ahead) * u64::from(SECONDS_PER_DAY)
            + u64::from(self.entry.seconds_of_day());
        target.saturating_sub(u64::from(now.seconds_of_day()))
    }
}

/// Computes the next occurrence of any alarm in the table.
///
/// An entry for the current day counts only while its time of day is still
/// strictly ahead; an alarm time equal to the current time counts as
/// already passed. Otherwise the search advances day by day, wrapping 7→1,
/// up to the same weekday one week ahead. Returns `None` for a table with
/// no entries.
pub fn next_occurrence(table: &WeeklyAlarmTable, now: WallTime) -> Option<NextOccurrence> {
    let today = now.day_index();

    if let Some(entry) = table.get(today + 1) {
        if entry.seconds_of_day() > now.seconds_of_day() {
            return Some(NextOccurrence {
                entry,
                days_ahead: 0,
            });
        }
    }

    for days_ahead in 1..=DAYS_PER_WEEK {
        let day = (today + days_ahead) % DAYS_PER_WEEK + 1;
        if let Some(entry) = table.get(day) {
            return Some(NextOccurrence { entry, days_ahead });
        }
    }

    None
}

/// The scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmScheduler {
    /// The current mode
    mode: SchedulerMode,
    /// The wake-trigger slot, `Some` while armed
    wake_timer: Option<TimerHandle>,
    /// The ramp-tick slot, `Some` while armed
    ramp_timer: Option<TimerHandle>,
}

impl AlarmScheduler {
    /// Create a new disabled scheduler with both slots unarmed
    pub const fn new() -> Self {
        Self {
            mode: SchedulerMode::Disabled,
            wake_timer: None,
            ramp_timer: None,
        }
    }

    /// Get the current mode
    pub const fn mode(&self) -> SchedulerMode {
        self.mode
    }

    /// Check whether the scheduler is enabled
    pub const fn is_enabled(&self) -> bool {
        matches!(self.mode, SchedulerMode::Enabled)
    }

    /// Get the armed wake-trigger handle, if any
    pub const fn wake_handle(&self) -> Option<TimerHandle> {
        self.wake_timer
    }

    /// Get the armed ramp-tick handle, if any
    pub const fn ramp_handle(&self) -> Option<TimerHandle> {
        self.ramp_timer
    }

    /// Enable the scheduler: compute the next occurrence and arm the wake
    /// trigger for it.
    ///
    /// Fails with the state unchanged when the table has no entries. When
    /// the dispatcher rejects the arm request the scheduler is left
    /// disabled with nothing armed; there is no partial arm. Calling while
    /// already enabled re-arms for the current table, which is the
    /// reschedule path after the table changed.
    pub fn enable(
        &mut self,
        table: &WeeklyAlarmTable,
        now: WallTime,
        dispatcher: &mut impl TimerDispatcher,
    ) -> Result<NextOccurrence, SchedulerError> {
        let next = next_occurrence(table, now).ok_or(SchedulerError::NoAlarmConfigured)?;

        if let Some(old) = self.wake_timer.take() {
            dispatcher.cancel(old);
        }

        match dispatcher.arm(TimerSpec::WakeAfter {
            seconds: next.seconds_from(now),
        }) {
            Ok(handle) => {
                self.wake_timer = Some(handle);
                self.mode = SchedulerMode::Enabled;
                Ok(next)
            }
            Err(e) => {
                self.mode = SchedulerMode::Disabled;
                Err(SchedulerError::ArmFailure(e))
            }
        }
    }

    /// Disable the scheduler.
    ///
    /// Cancels the wake trigger and the ramp tick, but only those that are
    /// actually armed: an unarmed slot is never re-cancelled. Discards any
    /// ramp progress. Safe to call from any state.
    pub fn disable(
        &mut self,
        ramp: &mut SunriseRampController,
        dispatcher: &mut impl TimerDispatcher,
    ) -> DisableOutcome {
        if self.mode == SchedulerMode::Disabled
            && self.wake_timer.is_none()
            && self.ramp_timer.is_none()
        {
            return DisableOutcome::AlreadyDisabled;
        }

        if let Some(handle) = self.wake_timer.take() {
            dispatcher.cancel(handle);
        }
        if let Some(handle) = self.ramp_timer.take() {
            dispatcher.cancel(handle);
        }
        ramp.clear();
        self.mode = SchedulerMode::Disabled;
        DisableOutcome::Disarmed
    }

    /// React to the armed wake trigger firing.
    ///
    /// Starts a fresh sunrise, arms the periodic ramp tick and immediately
    /// re-arms the wake trigger for the next week's occurrence, making the
    /// trigger a repeating weekly one. A failed re-arm leaves the slot
    /// unarmed and is only logged: the sunrise that just started still runs.
    pub fn on_wake_triggered(
        &mut self,
        table: &WeeklyAlarmTable,
        now: Option<WallTime>,
        dispatcher: &mut impl TimerDispatcher,
        ramp: &mut SunriseRampController,
    ) {
        // the one-shot fired, its handle is spent
        self.wake_timer = None;

        ramp.begin();
        match dispatcher.arm(TimerSpec::RampTick {
            period_seconds: ramp.config().tick_period_seconds,
        }) {
            Ok(handle) => self.ramp_timer = Some(handle),
            Err(_e) => {
                ramp.clear();
                #[cfg(feature = "defmt")]
                defmt::warn!("Failed to arm the ramp tick: {:?}", _e);
            }
        }

        let Some(now) = now else {
            #[cfg(feature = "defmt")]
            defmt::warn!("Clock not running, cannot re-arm the wake trigger");
            return;
        };
        match next_occurrence(table, now) {
            Some(next) => match dispatcher.arm(TimerSpec::WakeAfter {
                seconds: next.seconds_from(now),
            }) {
                Ok(handle) => self.wake_timer = Some(handle),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Failed to re-arm the wake trigger: {:?}", _e);
                }
            },
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("No alarm left to re-arm after the wake trigger fired");
            }
        }
    }

    /// Mark the ramp tick as finished after the ramp reached its end
    /// values and cancelled itself
    pub const fn ramp_finished(&mut self) {
        self.ramp_timer = None;
    }
}

impl Default for AlarmScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sunrise::RampConfig;
    use crate::timer::TimerKind;
    use heapless::Vec;

    /// A dispatcher that records arm and cancel calls
    struct MockDispatcher {
        /// Specs of all arm calls in order
        armed: Vec<TimerSpec, 8>,
        /// Handles of all cancel calls in order
        cancelled: Vec<TimerHandle, 8>,
        /// Generation source
        next_generation: u32,
        /// When true, every arm call fails
        fail_arms: bool,
    }

    impl MockDispatcher {
        /// Create a new recording dispatcher
        fn new() -> Self {
            Self {
                armed: Vec::new(),
                cancelled: Vec::new(),
                next_generation: 0,
                fail_arms: false,
            }
        }
    }

    impl TimerDispatcher for MockDispatcher {
        fn arm(&mut self, spec: TimerSpec) -> Result<TimerHandle, ArmError> {
            if self.fail_arms {
                return Err(ArmError::Exhausted);
            }
            self.next_generation += 1;
            let kind = match spec {
                TimerSpec::WakeAfter { .. } => TimerKind::WakeTrigger,
                TimerSpec::RampTick { .. } => TimerKind::RampTick,
            };
            let _ = self.armed.push(spec);
            Ok(TimerHandle::new(kind, self.next_generation))
        }

        fn cancel(&mut self, handle: TimerHandle) {
            let _ = self.cancelled.push(handle);
        }
    }

    /// Builds a table with a single 07:00 alarm on day 3
    fn table_with_wednesday_alarm() -> WeeklyAlarmTable {
        let mut table = WeeklyAlarmTable::new_empty();
        table.set(3, 7, 0).expect("entry is in range");
        table
    }

    #[test]
    fn next_occurrence_today_while_still_upcoming() {
        let table = table_with_wednesday_alarm();
        let now = WallTime::new(3, 6, 30, 0);
        let next = next_occurrence(&table, now).expect("day 3 has an alarm");
        assert_eq!(next.days_ahead, 0);
        assert_eq!(next.entry.day(), 3);
        assert_eq!(next.seconds_from(now), 1800);
    }

    #[test]
    fn next_occurrence_wraps_to_next_week_when_passed() {
        let table = table_with_wednesday_alarm();
        let now = WallTime::new(3, 8, 0, 0);
        let next = next_occurrence(&table, now).expect("day 3 has an alarm");
        assert_eq!(next.days_ahead, 7);
        assert_eq!(next.entry.day(), 3);
        assert_eq!(next.seconds_from(now), 7 * 86_400 + 25_200 - 28_800);
    }

    #[test]
    fn next_occurrence_equal_time_counts_as_passed() {
        let table = table_with_wednesday_alarm();
        let now = WallTime::new(3, 7, 0, 0);
        let next = next_occurrence(&table, now).expect("day 3 has an alarm");
        assert_eq!(next.days_ahead, 7);
        assert_eq!(next.seconds_from(now), 7 * 86_400);
    }

    #[test]
    fn next_occurrence_picks_the_nearest_following_day() {
        let mut table = table_with_wednesday_alarm();
        table.set(5, 6, 0).expect("entry is in range");
        let now = WallTime::new(3, 8, 0, 0);
        let next = next_occurrence(&table, now).expect("two days have alarms");
        assert_eq!(next.entry.day(), 5);
        assert_eq!(next.days_ahead, 2);
    }

    #[test]
    fn next_occurrence_wraps_past_the_end_of_the_week() {
        let mut table = WeeklyAlarmTable::new_empty();
        table.set(1, 5, 45).expect("entry is in range");
        let now = WallTime::new(6, 12, 0, 0);
        let next = next_occurrence(&table, now).expect("day 1 has an alarm");
        assert_eq!(next.entry.day(), 1);
        assert_eq!(next.days_ahead, 2);
    }

    #[test]
    fn next_occurrence_none_for_empty_table() {
        let table = WeeklyAlarmTable::new_empty();
        assert_eq!(next_occurrence(&table, WallTime::new(3, 6, 30, 0)), None);
    }

    #[test]
    fn enable_arms_the_wake_trigger() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut dispatcher = MockDispatcher::new();

        let next = scheduler
            .enable(&table, WallTime::new(3, 6, 30, 0), &mut dispatcher)
            .expect("table has an alarm");
        assert_eq!(next.days_ahead, 0);
        assert_eq!(scheduler.mode(), SchedulerMode::Enabled);
        assert_eq!(
            dispatcher.armed.as_slice(),
            &[TimerSpec::WakeAfter { seconds: 1800 }]
        );
        assert!(scheduler.wake_handle().is_some());
        assert!(scheduler.ramp_handle().is_none());
    }

    #[test]
    fn enable_fails_on_empty_table_and_stays_disabled() {
        let table = WeeklyAlarmTable::new_empty();
        let mut scheduler = AlarmScheduler::new();
        let mut dispatcher = MockDispatcher::new();

        let result = scheduler.enable(&table, WallTime::new(3, 6, 30, 0), &mut dispatcher);
        assert_eq!(result, Err(SchedulerError::NoAlarmConfigured));
        assert_eq!(scheduler.mode(), SchedulerMode::Disabled);
        assert!(dispatcher.armed.is_empty());
        assert!(scheduler.wake_handle().is_none());
    }

    #[test]
    fn enable_fails_cleanly_when_arming_fails() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut dispatcher = MockDispatcher::new();
        dispatcher.fail_arms = true;

        let result = scheduler.enable(&table, WallTime::new(3, 6, 30, 0), &mut dispatcher);
        assert_eq!(
            result,
            Err(SchedulerError::ArmFailure(ArmError::Exhausted))
        );
        assert_eq!(scheduler.mode(), SchedulerMode::Disabled);
        assert!(scheduler.wake_handle().is_none());
    }

    #[test]
    fn enable_while_enabled_reschedules() {
        let mut table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut dispatcher = MockDispatcher::new();
        let now = WallTime::new(3, 6, 30, 0);

        let first = scheduler
            .enable(&table, now, &mut dispatcher)
            .expect("table has an alarm");
        table.set(3, 6, 45).expect("entry is in range");
        let second = scheduler
            .enable(&table, now, &mut dispatcher)
            .expect("table still has an alarm");

        assert_eq!(first.seconds_from(now), 1800);
        assert_eq!(second.seconds_from(now), 900);
        // the stale trigger was cancelled before the new one was armed
        assert_eq!(dispatcher.cancelled.len(), 1);
        assert_eq!(dispatcher.armed.len(), 2);
        assert_eq!(scheduler.mode(), SchedulerMode::Enabled);
    }

    #[test]
    fn disable_is_idempotent_and_never_recancels() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut ramp = SunriseRampController::new(RampConfig::new());
        let mut dispatcher = MockDispatcher::new();

        scheduler
            .enable(&table, WallTime::new(3, 6, 30, 0), &mut dispatcher)
            .expect("table has an alarm");

        assert_eq!(
            scheduler.disable(&mut ramp, &mut dispatcher),
            DisableOutcome::Disarmed
        );
        assert_eq!(dispatcher.cancelled.len(), 1);

        assert_eq!(
            scheduler.disable(&mut ramp, &mut dispatcher),
            DisableOutcome::AlreadyDisabled
        );
        assert_eq!(dispatcher.cancelled.len(), 1);
        assert_eq!(scheduler.mode(), SchedulerMode::Disabled);
    }

    #[test]
    fn disable_before_any_arm_is_a_noop() {
        let mut scheduler = AlarmScheduler::new();
        let mut ramp = SunriseRampController::new(RampConfig::new());
        let mut dispatcher = MockDispatcher::new();

        assert_eq!(
            scheduler.disable(&mut ramp, &mut dispatcher),
            DisableOutcome::AlreadyDisabled
        );
        assert!(dispatcher.cancelled.is_empty());
    }

    #[test]
    fn wake_trigger_starts_the_ramp_and_rearms_next_week() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut ramp = SunriseRampController::new(RampConfig::new());
        let mut dispatcher = MockDispatcher::new();

        scheduler
            .enable(&table, WallTime::new(3, 6, 30, 0), &mut dispatcher)
            .expect("table has an alarm");
        scheduler.on_wake_triggered(
            &table,
            Some(WallTime::new(3, 7, 0, 0)),
            &mut dispatcher,
            &mut ramp,
        );

        assert!(ramp.is_running());
        assert!(scheduler.ramp_handle().is_some());
        assert!(scheduler.wake_handle().is_some());
        assert_eq!(
            dispatcher.armed.as_slice(),
            &[
                TimerSpec::WakeAfter { seconds: 1800 },
                TimerSpec::RampTick { period_seconds: 30 },
                TimerSpec::WakeAfter { seconds: 7 * 86_400 },
            ]
        );
    }

    #[test]
    fn wake_trigger_degrades_without_a_clock() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut ramp = SunriseRampController::new(RampConfig::new());
        let mut dispatcher = MockDispatcher::new();

        scheduler.on_wake_triggered(&table, None, &mut dispatcher, &mut ramp);

        // the sunrise still runs, only the weekly re-arm is skipped
        assert!(ramp.is_running());
        assert!(scheduler.ramp_handle().is_some());
        assert!(scheduler.wake_handle().is_none());
    }

    #[test]
    fn wake_trigger_clears_the_ramp_when_its_tick_cannot_arm() {
        let table = table_with_wednesday_alarm();
        let mut scheduler = AlarmScheduler::new();
        let mut ramp = SunriseRampController::new(RampConfig::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher.fail_arms = true;

        scheduler.on_wake_triggered(
            &table,
            Some(WallTime::new(3, 7, 0, 0)),
            &mut dispatcher,
            &mut ramp,
        );

        assert!(!ramp.is_running());
        assert!(scheduler.ramp_handle().is_none());
        assert!(scheduler.wake_handle().is_none());
    }
}
