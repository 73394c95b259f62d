//! # Wake light controller
//! This module contains the owned context struct that ties the alarm table,
//! the scheduler and the sunrise ramp together, plus the two run loops that
//! realize the armed timer callbacks.
//!
//! All shared state lives behind one mutex, so mutations from the request
//! side and the timer side appear atomic to each other. The run loops are
//! plain async functions: the firmware wraps them in executor tasks and
//! supplies the LED driver, the clock and the durable store.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::clock::Clock;
use crate::persist::{PersistenceGateway, load_table};
use crate::schedule::{EncodeError, TABLE_JSON_MAX, WeeklyAlarmTable};
use crate::scheduler::{AlarmScheduler, DisableOutcome, NextOccurrence, SchedulerError};
use crate::sunrise::{LedOutput, RampConfig, RampFrame, SunriseRampController};
use crate::timer::{ArmError, TimerDispatcher, TimerHandle, TimerKind, TimerSpec};

/// Commands for the wake-timer run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeCommand {
    /// Arm the wake trigger to fire after the given delay
    Arm {
        /// Generation of the handle this arm belongs to
        generation: u32,
        /// Delay until the trigger fires, in seconds
        seconds: u64,
    },
    /// Disarm the wake trigger
    Cancel,
}

/// Commands for the ramp run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RampCommand {
    /// Start ticking a freshly begun sunrise
    Start {
        /// Generation of the handle this start belongs to
        generation: u32,
    },
    /// Stop ticking and render the off frame
    Stop,
}

/// Outcome of one ramp tick attempt
enum TickOutcome {
    /// The ramp advanced, render this frame
    Advanced(RampFrame),
    /// The ramp reached its end values and cancelled its own tick, render
    /// this final frame
    Steady(RampFrame),
    /// The tick lost against a cancellation, render nothing
    Cancelled,
}

/// The shared state: everything the request side and the timer side mutate,
/// guarded by one mutex
struct Core {
    /// The weekly alarm table
    table: WeeklyAlarmTable,
    /// The scheduler state machine
    scheduler: AlarmScheduler,
    /// The sunrise ramp
    ramp: SunriseRampController,
    /// Generation source for timer handles
    next_generation: u32,
}

/// The production timer dispatcher: forwards arm and cancel commands to the
/// run loops through the controller's signals
struct SignalDispatcher<'a> {
    /// Commands to the wake-timer loop
    wake: &'a Signal<CriticalSectionRawMutex, WakeCommand>,
    /// Commands to the ramp loop
    ramp: &'a Signal<CriticalSectionRawMutex, RampCommand>,
    /// Generation source, shared under the core lock
    next_generation: &'a mut u32,
}

impl TimerDispatcher for SignalDispatcher<'_> {
    fn arm(&mut self, spec: TimerSpec) -> Result<TimerHandle, ArmError> {
        *self.next_generation = self.next_generation.wrapping_add(1);
        let generation = *self.next_generation;
        match spec {
            TimerSpec::WakeAfter { seconds } => {
                self.wake.signal(WakeCommand::Arm {
                    generation,
                    seconds,
                });
                Ok(TimerHandle::new(TimerKind::WakeTrigger, generation))
            }
            TimerSpec::RampTick { period_seconds: _ } => {
                // the ramp loop reads its period from the shared ramp config
                self.ramp.signal(RampCommand::Start { generation });
                Ok(TimerHandle::new(TimerKind::RampTick, generation))
            }
        }
    }

    fn cancel(&mut self, handle: TimerHandle) {
        match handle.kind() {
            TimerKind::WakeTrigger => self.wake.signal(WakeCommand::Cancel),
            TimerKind::RampTick => self.ramp.signal(RampCommand::Stop),
        }
    }
}

/// What boot found and armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootStatus {
    /// True when a stored blob existed but was malformed and an empty table
    /// was substituted
    pub recovered: bool,
    /// The occurrence the wake trigger was armed for, if the loaded table
    /// was enabled and arming succeeded
    pub armed: Option<NextOccurrence>,
}

/// Why enabling the alarm failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnableError {
    /// No day in the table has an alarm configured
    NoAlarmConfigured,
    /// The clock is not running yet, the next occurrence cannot be computed
    ClockNotReady,
    /// The timer dispatcher rejected the arm request
    ArmFailure(ArmError),
    /// The alarm is enabled in memory but the save failed; the caller must
    /// retry the save
    NotDurable,
}

impl From<SchedulerError> for EnableError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::NoAlarmConfigured => Self::NoAlarmConfigured,
            SchedulerError::ArmFailure(e) => Self::ArmFailure(e),
        }
    }
}

/// Why disabling the alarm failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisableError {
    /// The alarm was already disabled, nothing was disarmed
    AlreadyDisabled,
    /// The alarm is disabled in memory but the save failed; the caller must
    /// retry the save
    NotDurable,
}

/// Why an edit batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EditError {
    /// The payload could not be parsed, the table is unchanged
    Parse,
    /// The edits are applied in memory but the save failed; the caller must
    /// retry the save
    NotDurable,
}

/// The wake light controller.
///
/// Owns the whole shared-state domain and the command signals of the two
/// run loops. Constructed once and shared by reference between the request
/// handlers and the spawned run loops.
pub struct WakeLight<C: Clock, P: PersistenceGateway> {
    /// The shared state, one mutex for the whole domain
    core: Mutex<CriticalSectionRawMutex, Core>,
    /// The durable store
    store: Mutex<CriticalSectionRawMutex, P>,
    /// The wall clock
    clock: C,
    /// Commands to the wake-timer run loop
    wake_commands: Signal<CriticalSectionRawMutex, WakeCommand>,
    /// Commands to the ramp run loop
    ramp_commands: Signal<CriticalSectionRawMutex, RampCommand>,
}

impl<C: Clock, P: PersistenceGateway> WakeLight<C, P> {
    /// Create a new controller with an empty, disabled schedule
    pub fn new(clock: C, store: P, ramp_config: RampConfig) -> Self {
        Self {
            core: Mutex::new(Core {
                table: WeeklyAlarmTable::new_empty(),
                scheduler: AlarmScheduler::new(),
                ramp: SunriseRampController::new(ramp_config),
                next_generation: 0,
            }),
            store: Mutex::new(store),
            clock,
            wake_commands: Signal::new(),
            ramp_commands: Signal::new(),
        }
    }

    /// Load the persisted table and arm the wake trigger if it was enabled.
    ///
    /// Called once at startup. A table that is enabled but cannot be armed
    /// (no entries left, clock not running) is degraded to disabled with a
    /// warning instead of failing the boot.
    pub async fn boot(&self) -> BootStatus {
        let loaded = {
            let mut store = self.store.lock().await;
            load_table(&mut *store).await
        };

        let mut core = self.core.lock().await;
        core.table = loaded.table;

        let mut armed = None;
        if core.table.enabled() {
            let Core {
                table,
                scheduler,
                next_generation,
                ..
            } = &mut *core;
            let mut dispatcher = SignalDispatcher {
                wake: &self.wake_commands,
                ramp: &self.ramp_commands,
                next_generation,
            };
            match self.clock.now() {
                Some(now) => match scheduler.enable(table, now, &mut dispatcher) {
                    Ok(next) => armed = Some(next),
                    Err(_e) => {
                        table.set_enabled(false);
                        #[cfg(feature = "defmt")]
                        defmt::warn!("Could not arm the persisted alarm: {:?}", _e);
                    }
                },
                None => {
                    table.set_enabled(false);
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Clock not running, persisted alarm stays disabled");
                }
            }
        }

        BootStatus {
            recovered: loaded.recovered,
            armed,
        }
    }

    /// Serialize the current table into `buf`, returning the number of
    /// bytes written
    pub async fn table_json(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let core = self.core.lock().await;
        core.table.to_json(buf)
    }

    /// Apply a batch of alarm edits, a bare JSON array of `{d,h,m}`
    /// objects, then persist.
    ///
    /// Invalid entries are dropped; a malformed payload rejects the whole
    /// batch and leaves the table unchanged. A running wake trigger is
    /// rescheduled because the next occurrence may have moved. Returns the
    /// number of entries applied.
    pub async fn apply_edits(&self, payload: &[u8]) -> Result<usize, EditError> {
        let applied = {
            let mut core = self.core.lock().await;
            let Core {
                table,
                scheduler,
                next_generation,
                ..
            } = &mut *core;

            let applied = table.apply_edits(payload).map_err(|_e| EditError::Parse)?;

            if scheduler.is_enabled() {
                let mut dispatcher = SignalDispatcher {
                    wake: &self.wake_commands,
                    ramp: &self.ramp_commands,
                    next_generation,
                };
                match self.clock.now() {
                    Some(now) => {
                        if let Err(_e) = scheduler.enable(table, now, &mut dispatcher) {
                            table.set_enabled(false);
                            #[cfg(feature = "defmt")]
                            defmt::warn!("Could not reschedule after edits: {:?}", _e);
                        }
                    }
                    None => {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("Clock not running, keeping the previous wake trigger");
                    }
                }
            }
            applied
        };

        if self.persist().await {
            Ok(applied)
        } else {
            Err(EditError::NotDurable)
        }
    }

    /// Enable the alarm: arm the wake trigger for the next occurrence, then
    /// persist.
    ///
    /// On `NotDurable` the alarm is enabled in memory; the durable copy
    /// diverges until the caller retries the save.
    pub async fn enable(&self) -> Result<NextOccurrence, EnableError> {
        let next = {
            let mut core = self.core.lock().await;
            let now = self.clock.now().ok_or(EnableError::ClockNotReady)?;
            let Core {
                table,
                scheduler,
                next_generation,
                ..
            } = &mut *core;
            let mut dispatcher = SignalDispatcher {
                wake: &self.wake_commands,
                ramp: &self.ramp_commands,
                next_generation,
            };
            let next = scheduler.enable(table, now, &mut dispatcher)?;
            table.set_enabled(true);
            next
        };

        #[cfg(feature = "defmt")]
        defmt::info!("Alarm enabled for {:?}", next);

        if self.persist().await {
            Ok(next)
        } else {
            Err(EnableError::NotDurable)
        }
    }

    /// Disable the alarm: disarm both timers, command the LEDs off, then
    /// persist.
    ///
    /// Reports `AlreadyDisabled` without cancelling anything when there is
    /// nothing to disarm, so the request layer can answer accordingly.
    pub async fn disable(&self) -> Result<(), DisableError> {
        {
            let mut core = self.core.lock().await;
            let Core {
                table,
                scheduler,
                ramp,
                next_generation,
            } = &mut *core;
            let mut dispatcher = SignalDispatcher {
                wake: &self.wake_commands,
                ramp: &self.ramp_commands,
                next_generation,
            };
            match scheduler.disable(ramp, &mut dispatcher) {
                DisableOutcome::AlreadyDisabled => return Err(DisableError::AlreadyDisabled),
                DisableOutcome::Disarmed => table.set_enabled(false),
            }
        }

        // always turn the strip off, even when no sunrise was running
        self.ramp_commands.signal(RampCommand::Stop);

        if self.persist().await {
            Ok(())
        } else {
            Err(DisableError::NotDurable)
        }
    }

    /// The wake-timer run loop. Spawn once; it services arm and cancel
    /// commands and fires the wake trigger when an armed deadline elapses.
    pub async fn run_wake_timer(&self) {
        let mut command = self.wake_commands.wait().await;
        loop {
            match command {
                WakeCommand::Cancel => {
                    command = self.wake_commands.wait().await;
                }
                WakeCommand::Arm {
                    generation,
                    seconds,
                } => {
                    match select(
                        Timer::after(Duration::from_secs(seconds)),
                        self.wake_commands.wait(),
                    )
                    .await
                    {
                        Either::First(()) => {
                            self.handle_wake_fired(generation).await;
                            command = self.wake_commands.wait().await;
                        }
                        // a newer command supersedes the armed deadline
                        Either::Second(next) => command = next,
                    }
                }
            }
        }
    }

    /// The ramp run loop. Spawn once with the LED driver; it renders the
    /// sunrise frames and the off frame.
    pub async fn run_ramp<L: LedOutput>(&self, led: &mut L) {
        loop {
            match self.ramp_commands.wait().await {
                RampCommand::Stop => {
                    let off = RampFrame::off();
                    led.show(off.color, off.brightness).await;
                }
                RampCommand::Start { generation } => {
                    self.run_sunrise(generation, led).await;
                }
            }
        }
    }

    /// Ticks one sunrise until it is stopped, superseded or steady
    async fn run_sunrise<L: LedOutput>(&self, mut generation: u32, led: &mut L) {
        'sunrise: loop {
            // the freshly begun sunrise renders its zero frame right away
            let Some(frame) = self.current_frame(generation).await else {
                return;
            };
            led.show(frame.color, frame.brightness).await;

            let period = self.tick_period().await;
            loop {
                match select(Timer::after(period), self.ramp_commands.wait()).await {
                    Either::First(()) => match self.step_ramp(generation).await {
                        TickOutcome::Advanced(frame) => {
                            led.show(frame.color, frame.brightness).await;
                        }
                        TickOutcome::Steady(frame) => {
                            led.show(frame.color, frame.brightness).await;
                            #[cfg(feature = "defmt")]
                            defmt::info!("Sunrise steady, ramp tick stops");
                            return;
                        }
                        TickOutcome::Cancelled => return,
                    },
                    Either::Second(RampCommand::Stop) => {
                        let off = RampFrame::off();
                        led.show(off.color, off.brightness).await;
                        return;
                    }
                    Either::Second(RampCommand::Start { generation: next }) => {
                        generation = next;
                        continue 'sunrise;
                    }
                }
            }
        }
    }

    /// Reacts to an elapsed wake deadline. A cancel or re-arm that raced
    /// the deadline wins: a stale generation does nothing.
    async fn handle_wake_fired(&self, generation: u32) {
        let mut core = self.core.lock().await;
        if core.scheduler.wake_handle().map(|handle| handle.generation()) != Some(generation) {
            return;
        }

        #[cfg(feature = "defmt")]
        defmt::info!("Wake trigger fired, starting sunrise");

        let now = self.clock.now();
        let Core {
            table,
            scheduler,
            ramp,
            next_generation,
        } = &mut *core;
        let mut dispatcher = SignalDispatcher {
            wake: &self.wake_commands,
            ramp: &self.ramp_commands,
            next_generation,
        };
        scheduler.on_wake_triggered(table, now, &mut dispatcher, ramp);
    }

    /// The frame of the current ramp state, `None` when the generation is
    /// stale or no ramp is running
    async fn current_frame(&self, generation: u32) -> Option<RampFrame> {
        let core = self.core.lock().await;
        if core.scheduler.ramp_handle().map(|handle| handle.generation()) != Some(generation) {
            return None;
        }
        core.ramp.frame()
    }

    /// Advances the ramp by one tick, checking the armed generation first
    /// so a racing disable wins
    async fn step_ramp(&self, generation: u32) -> TickOutcome {
        let mut core = self.core.lock().await;
        if core.scheduler.ramp_handle().map(|handle| handle.generation()) != Some(generation) {
            return TickOutcome::Cancelled;
        }
        let Some(frame) = core.ramp.on_tick() else {
            return TickOutcome::Cancelled;
        };
        if core.ramp.is_steady() {
            core.scheduler.ramp_finished();
            TickOutcome::Steady(frame)
        } else {
            TickOutcome::Advanced(frame)
        }
    }

    /// The configured interval between ramp ticks
    async fn tick_period(&self) -> Duration {
        let core = self.core.lock().await;
        Duration::from_secs(core.ramp.config().tick_period_seconds)
    }

    /// Serializes the table and saves it, returning whether the save made
    /// it to the store. Failures are logged here; callers surface them as
    /// durability errors.
    async fn persist(&self) -> bool {
        let mut buf = [0u8; TABLE_JSON_MAX];
        let len = {
            let core = self.core.lock().await;
            core.table.to_json(&mut buf)
        };

        match len {
            Ok(len) => match self.store.lock().await.save(&buf[..len]).await {
                Ok(()) => true,
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "Failed to persist the alarm table: {:?}",
                        defmt::Debug2Format(&_e)
                    );
                    false
                }
            },
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Failed to serialize the alarm table: {:?}", _e);
                false
            }
        }
    }
}
