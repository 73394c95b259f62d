//! # Sunrise ramp
//! This module contains the sunrise effect: a slow brightness ramp combined
//! with a colour-temperature shift over a fixed warm palette.
//!
//! The per-tick step is a pure function of the previous state, so the whole
//! ramp is a reproducible function of the tick count. Pushing frames to the
//! actual strip happens behind the [`LedOutput`] boundary.

use smart_leds::RGB8;

/// The warm colour palette the ramp walks through, cold to warm white
/// (approximately 2200 K, 3000 K and 3300 K)
pub const WARMTH: [RGB8; 3] = [
    RGB8::new(255, 147, 44),
    RGB8::new(255, 190, 126),
    RGB8::new(255, 190, 126),
];

/// Index of the last palette entry
const FINAL_COLOR_INDEX: u8 = (WARMTH.len() - 1) as u8;

/// Tuning of the sunrise ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampConfig {
    /// Brightness added per tick
    pub step: u8,
    /// Number of ticks between colour advances
    pub group_size: u32,
    /// Brightness ceiling
    pub max_brightness: u8,
    /// Seconds between ramp ticks
    pub tick_period_seconds: u64,
}

impl RampConfig {
    /// Creates the standard ramp parameters: +2 brightness every 30 seconds
    /// up to 80, advancing the colour every 5 ticks.
    pub const fn new() -> Self {
        Self {
            step: 2,
            group_size: 5,
            max_brightness: 80,
            tick_period_seconds: 30,
        }
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of one running sunrise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampState {
    /// Current global brightness
    brightness: u8,
    /// Current index into the warm palette
    color_index: u8,
    /// Number of ticks applied since the ramp started
    ticks_elapsed: u32,
}

impl RampState {
    /// The state a freshly triggered sunrise starts from
    pub const fn zero() -> Self {
        Self {
            brightness: 0,
            color_index: 0,
            ticks_elapsed: 0,
        }
    }

    /// Get the current brightness
    pub const fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Get the current palette index
    pub const fn color_index(&self) -> u8 {
        self.color_index
    }

    /// Get the number of ticks applied so far
    pub const fn ticks_elapsed(&self) -> u32 {
        self.ticks_elapsed
    }

    /// Closed form of the state after `n` ticks from the zero state.
    /// Equal to applying [`advance_ramp`] `n` times.
    pub fn after_ticks(config: &RampConfig, n: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let brightness =
            (u32::from(config.step) * n).min(u32::from(config.max_brightness)) as u8;
        #[allow(clippy::cast_possible_truncation)]
        let color_index = (n / config.group_size.max(1)).min(u32::from(FINAL_COLOR_INDEX)) as u8;
        Self {
            brightness,
            color_index,
            ticks_elapsed: n,
        }
    }

    /// Check whether the ramp has reached its end values
    pub const fn is_steady(&self, config: &RampConfig) -> bool {
        self.brightness == config.max_brightness && self.color_index == FINAL_COLOR_INDEX
    }
}

/// Advances the ramp by one tick.
///
/// Brightness grows by `step` up to the ceiling. The colour index advances
/// by one, capped at the final palette entry, whenever the tick count is a
/// positive multiple of `group_size`.
pub fn advance_ramp(config: &RampConfig, state: RampState) -> RampState {
    let ticks_elapsed = state.ticks_elapsed.saturating_add(1);

    let brightness = state
        .brightness
        .saturating_add(config.step)
        .min(config.max_brightness);

    let group_size = config.group_size.max(1);
    let color_index = if ticks_elapsed % group_size == 0 && state.color_index < FINAL_COLOR_INDEX {
        state.color_index + 1
    } else {
        state.color_index
    };

    RampState {
        brightness,
        color_index,
        ticks_elapsed,
    }
}

/// What one render pushes to the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampFrame {
    /// The fill colour for all pixels
    pub color: RGB8,
    /// The global brightness
    pub brightness: u8,
}

impl RampFrame {
    /// The all-off frame rendered when the alarm is disarmed
    pub const fn off() -> Self {
        Self {
            color: RGB8::new(0, 0, 0),
            brightness: 0,
        }
    }
}

/// The LED strip boundary.
///
/// One call fills all pixels with a single colour at a global brightness.
/// This is a collaborator seam, not part of the core logic under test.
#[allow(async_fn_in_trait)]
pub trait LedOutput {
    /// Fill the whole strip with `color` at `brightness`
    async fn show(&mut self, color: RGB8, brightness: u8);
}

/// Drives the sunrise ramp: owns the tuning and the progress of the
/// currently running sunrise, if any.
#[derive(Debug, Clone)]
pub struct SunriseRampController {
    /// The ramp tuning
    config: RampConfig,
    /// Progress of the running sunrise, `None` while idle
    state: Option<RampState>,
}

impl SunriseRampController {
    /// Create a new idle controller with the given tuning
    pub const fn new(config: RampConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Get the ramp tuning
    pub const fn config(&self) -> &RampConfig {
        &self.config
    }

    /// Check whether a sunrise is currently running
    pub const fn is_running(&self) -> bool {
        self.state.is_some()
    }

    /// Start a fresh sunrise from the zero state
    pub const fn begin(&mut self) {
        self.state = Some(RampState::zero());
    }

    /// Discard any progress and go idle
    pub const fn clear(&mut self) {
        self.state = None;
    }

    /// The frame for the current state, `None` while idle
    pub fn frame(&self) -> Option<RampFrame> {
        self.state.map(|state| RampFrame {
            color: WARMTH[usize::from(state.color_index().min(FINAL_COLOR_INDEX))],
            brightness: state.brightness(),
        })
    }

    /// Advance the running sunrise by one tick and return the frame to
    /// render, `None` while idle
    pub fn on_tick(&mut self) -> Option<RampFrame> {
        let state = self.state.as_mut()?;
        *state = advance_ramp(&self.config, *state);
        self.frame()
    }

    /// Check whether the running sunrise has reached its end values
    pub fn is_steady(&self) -> bool {
        self.state
            .is_some_and(|state| state.is_steady(&self.config))
    }
}
