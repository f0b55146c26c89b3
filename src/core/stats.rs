// # Capture Statistics
//
// Counters for the events the capture core otherwise handles silently:
// dropped ticks, backpressure skips and failed readbacks. Counting never
// changes behavior; the consumer still only sees successful captures.
//
// The clock thread and the render context both update these, so the live
// counters are atomics shared behind an `Arc`, and callers read a plain
// `CaptureStats` snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the driver's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Ticks handed off to the render context
    pub ticks_accepted: u64,
    /// Ticks dropped because auto capture was off or the handoff queue was full
    pub ticks_dropped: u64,
    /// Readback requests issued into a slot
    pub requests_issued: u64,
    /// Requests skipped because the selected slot was still pending
    pub backpressure_skips: u64,
    /// Readbacks that resolved with an error
    pub transfer_errors: u64,
    /// Captures delivered to consumers
    pub captures_emitted: u64,
}

/// Shared, lock-free counters behind [`CaptureStats`].
#[derive(Debug, Default)]
pub struct StatsCounters {
    ticks_accepted: AtomicU64,
    ticks_dropped: AtomicU64,
    requests_issued: AtomicU64,
    backpressure_skips: AtomicU64,
    transfer_errors: AtomicU64,
    captures_emitted: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_accepted(&self) {
        self.ticks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_dropped(&self) {
        self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backpressure_skip(&self) {
        self.backpressure_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_error(&self) {
        self.transfer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capture_emitted(&self) {
        self.captures_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            ticks_accepted: self.ticks_accepted.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            backpressure_skips: self.backpressure_skips.load(Ordering::Relaxed),
            transfer_errors: self.transfer_errors.load(Ordering::Relaxed),
            captures_emitted: self.captures_emitted.load(Ordering::Relaxed),
        }
    }
}
