//! # Async Capture Library
//!
//! Continuous frame capture from a live rendering surface without stalling
//! the render pipeline. Device-to-host copies are overlapped with rendering
//! through a small ring of in-flight readback slots, issued at a capture rate
//! decoupled from the render frame rate, and handed to consumers exactly once.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `format`: Source format negotiation and buffer sizing
//! - `config`: Capture rate, ring size and tick queue configuration
//! - `core`: Slot ring, capture clock and counters
//! - `driver`: The capture driver (scheduler, poller, lifecycle)
//! - `backend`: The host engine seam, plus an in-process software backend
//! - `sink`: Consumer registration
//! - `export`: PNG encoding and file persistence (feature `png-export`)
//!
//! ## Data Flow
//!
//! ```text
//! CaptureClock ─▶ TickGate ─▶ end_of_frame() ─▶ request_capture() ─▶ CapturePool
//!                                                                      │
//!            consumers ◀── Capture ◀── update() (once per frame) ◀─────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_capture::backend::software::SoftwareBackend;
//! use async_capture::driver::{CaptureDriver, CaptureSource};
//! use async_capture::sink::ChannelSink;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut driver = CaptureDriver::new(SoftwareBackend::new(1280, 720));
//! driver.initialize(CaptureSource::Screen, 15)?;
//!
//! let (sink, captures) = ChannelSink::bounded(16);
//! driver.subscribe(sink);
//! driver.start_auto_capture();
//!
//! loop {
//!     // render the frame ...
//!     driver.update();
//!     driver.end_of_frame();
//!     driver.backend_mut().present();
//!     # break;
//! }
//! # drop(captures);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod driver;
pub mod error;
#[cfg(feature = "png-export")]
pub mod export;
pub mod format;
pub mod frame;
pub mod sink;

/// Re-export error types for convenience
pub use error::{CaptureError, CaptureResult, HasRecoverySuggestion, HasSeverity};

pub use config::{CaptureConfig, ClockMode};
pub use crate::core::stats::CaptureStats;
pub use driver::{CaptureDriver, CaptureSource, DriverState, RequestOutcome};
pub use format::{CaptureFormat, SourceFormat, negotiate};
pub use frame::Capture;
pub use sink::{CaptureSink, ChannelSink, SubscriptionId};
