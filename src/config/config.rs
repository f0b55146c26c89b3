//! # Capture Configuration
//!
//! Configuration for the capture driver: the requested capture rate and the
//! depth of the tick handoff queue between the capture clock and the render
//! context.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Range | Description |
//! |-----------|------|-------|-------------|
//! | `capture_rate` | `u32` | clamped to 1-30 | Captures per second requested from the clock |
//! | `queue_depth` | `usize` | >= 1 | Ticks that may wait for the next end-of-frame |
//! | `clock` | `ClockMode` | `Background`/`Manual` | Whether a timer thread drives ticks |
//!
//! The capture rate is deliberately capped well below typical render rates to
//! bound memory and device-copy pressure. Out-of-range rates are clamped, not
//! rejected; [`CaptureConfig::validate_strict`] exists for front ends that
//! prefer to reject them.
//!
//! ## Derived Values
//!
//! - `effective_rate = clamp(capture_rate, 1, 30)`
//! - `slot_count = max(1, ceil(effective_rate / 10))`
//! - `tick_interval = 1000 / effective_rate` milliseconds
//!
//! ## Examples
//!
//! ```rust
//! use async_capture::config::CaptureConfig;
//!
//! let config = CaptureConfig::new(15);
//! assert_eq!(config.effective_rate(), 15);
//! assert_eq!(config.slot_count(), 2);
//!
//! // Rates above the cap are clamped
//! let config = CaptureConfig::new(120);
//! assert_eq!(config.effective_rate(), 30);
//! assert_eq!(config.slot_count(), 3);
//! ```

use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};

/// Lowest capture rate the clock will run at.
pub const MIN_CAPTURE_RATE: u32 = 1;
/// Highest capture rate the clock will run at.
pub const MAX_CAPTURE_RATE: u32 = 30;
/// Captures per second each readback slot is expected to absorb.
pub const RATE_PER_SLOT: u32 = 10;

/// Where capture ticks come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// A dedicated timer thread fires ticks at the effective rate.
    #[default]
    Background,
    /// No timer thread; the host fires ticks through a `TickGate`.
    Manual,
}

/// Configuration structure for the capture driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Requested captures per second.
    ///
    /// Clamped into `MIN_CAPTURE_RATE..=MAX_CAPTURE_RATE` when used.
    pub capture_rate: u32,

    /// Capacity of the tick handoff queue.
    ///
    /// Ticks that arrive while the queue is full are dropped, the same way a
    /// tick for a busy slot is dropped.
    pub queue_depth: usize,

    /// Tick source.
    pub clock: ClockMode,
}

impl Default for CaptureConfig {
    /// Default values:
    /// - `capture_rate`: 30
    /// - `queue_depth`: 8
    /// - `clock`: `ClockMode::Background`
    fn default() -> Self {
        Self {
            capture_rate: MAX_CAPTURE_RATE,
            queue_depth: 8,
            clock: ClockMode::Background,
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration with the given capture rate and default queue depth.
    pub fn new(capture_rate: u32) -> Self {
        Self {
            capture_rate,
            ..Self::default()
        }
    }

    /// Sets the tick handoff queue depth.
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Sets the tick source.
    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    /// The capture rate actually used by the clock.
    pub fn effective_rate(&self) -> u32 {
        effective_rate(self.capture_rate)
    }

    /// Number of readback slots in the ring.
    pub fn slot_count(&self) -> usize {
        slot_count(self.effective_rate())
    }

    /// Period of the capture clock.
    pub fn tick_interval(&self) -> Duration {
        tick_interval(self.effective_rate())
    }

    /// Validates the parameters the driver cannot clamp.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.queue_depth == 0 {
            return Err(CaptureError::config(
                "queue_depth",
                "0",
                "tick queue must hold at least one tick",
            ));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), but also rejects out-of-range rates
    /// instead of clamping them.
    pub fn validate_strict(&self) -> CaptureResult<()> {
        self.validate()?;
        if !(MIN_CAPTURE_RATE..=MAX_CAPTURE_RATE).contains(&self.capture_rate) {
            return Err(CaptureError::config(
                "capture_rate",
                self.capture_rate.to_string(),
                format!(
                    "must be between {} and {}",
                    MIN_CAPTURE_RATE, MAX_CAPTURE_RATE
                ),
            ));
        }
        Ok(())
    }
}

/// `clamp(requested, 1, 30)`
pub fn effective_rate(requested: u32) -> u32 {
    requested.clamp(MIN_CAPTURE_RATE, MAX_CAPTURE_RATE)
}

/// `max(1, ceil(rate / 10))`
pub fn slot_count(effective_rate: u32) -> usize {
    effective_rate.div_ceil(RATE_PER_SLOT).max(1) as usize
}

/// `1000 / rate` milliseconds, kept at microsecond precision.
pub fn tick_interval(effective_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(effective_rate.max(MIN_CAPTURE_RATE)))
}
