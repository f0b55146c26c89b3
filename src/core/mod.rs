//! # Core Infrastructure Module
//!
//! The building blocks the capture driver is assembled from: the readback
//! slot ring, the independent capture clock with its tick handoff, and the
//! counters that make silent drops observable.

pub mod clock;
pub mod slot;
pub mod stats;
