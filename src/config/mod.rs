//! # Configuration Module
//!
//! This module provides the capture driver's configuration and the rate and
//! ring-size derivations shared with the driver.

#[allow(clippy::module_inception)]
pub mod config;

pub use config::{
    CaptureConfig, ClockMode, MAX_CAPTURE_RATE, MIN_CAPTURE_RATE, RATE_PER_SLOT, effective_rate,
    slot_count, tick_interval,
};
