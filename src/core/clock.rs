// # Capture Clock
//
// Periodic capture trigger that runs on its own thread, independent of the
// render loop's frame cadence.
//
// ## Handoff
//
// A tick never touches render resources itself. The clock thread pushes a
// `CaptureTick` through a bounded crossbeam channel; the render-synchronized
// context drains that channel at its next end-of-frame and issues the actual
// readback requests there.
//
// ```text
// ┌──────────────┐  fire()  ┌──────────┐  bounded queue  ┌────────────────┐
// │ Clock thread │────────▶│ TickGate │────────────────▶│ Render context │
// └──────────────┘          └──────────┘                 └────────────────┘
//                            auto_drive?                   end_of_frame()
// ```
//
// The gate checks the shared auto-drive flag when a tick arrives. Ticks that
// arrive while auto capture is off, or while the queue is full, are dropped
// rather than queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select, tick};
use tracing::{debug, trace};

use crate::core::stats::StatsCounters;
use crate::error::{CaptureError, CaptureResult};

/// One scheduled opportunity to issue a capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTick {
    pub fired_at: Instant,
}

/// What happened to a fired tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queued for the next end-of-frame
    Accepted,
    /// Auto capture was off
    DroppedInactive,
    /// The handoff queue was full
    DroppedQueueFull,
    /// The render context is gone
    Closed,
}

/// Producer side of the tick handoff.
///
/// Cheap to clone; the clock thread holds one and hosts can hold more for
/// manual triggering.
#[derive(Clone)]
pub struct TickGate {
    auto_drive: Arc<AtomicBool>,
    sender: Sender<CaptureTick>,
    stats: Arc<StatsCounters>,
}

impl TickGate {
    /// Creates a gate and the receiver the render context drains.
    pub fn channel(
        auto_drive: Arc<AtomicBool>,
        stats: Arc<StatsCounters>,
        queue_depth: usize,
    ) -> (Self, Receiver<CaptureTick>) {
        let (sender, receiver) = bounded(queue_depth.max(1));
        (
            Self {
                auto_drive,
                sender,
                stats,
            },
            receiver,
        )
    }

    /// Offers one tick to the render context.
    pub fn fire(&self) -> TickOutcome {
        if !self.auto_drive.load(Ordering::Acquire) {
            self.stats.tick_dropped();
            return TickOutcome::DroppedInactive;
        }

        match self.sender.try_send(CaptureTick {
            fired_at: Instant::now(),
        }) {
            Ok(()) => {
                self.stats.tick_accepted();
                TickOutcome::Accepted
            }
            Err(TrySendError::Full(_)) => {
                self.stats.tick_dropped();
                TickOutcome::DroppedQueueFull
            }
            Err(TrySendError::Disconnected(_)) => TickOutcome::Closed,
        }
    }
}

/// Background timer firing a [`TickGate`] at a fixed interval.
///
/// Stops when dropped.
pub struct CaptureClock {
    interval: Duration,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureClock {
    /// Starts the timer thread.
    pub fn spawn(interval: Duration, gate: TickGate) -> CaptureResult<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("capture-clock".into())
            .spawn(move || run(interval, gate, shutdown_rx))
            .map_err(|e| CaptureError::io("spawn capture clock", e))?;

        debug!(interval_ms = interval.as_secs_f64() * 1000.0, "capture clock started");

        Ok(Self {
            interval,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the timer thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the select below
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("capture clock thread panicked");
            }
            debug!("capture clock stopped");
        }
    }
}

impl Drop for CaptureClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(interval: Duration, gate: TickGate, shutdown: Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                let outcome = gate.fire();
                trace!(?outcome, "capture tick");
                if outcome == TickOutcome::Closed {
                    break;
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(active: bool, depth: usize) -> (TickGate, Receiver<CaptureTick>, Arc<StatsCounters>) {
        let stats = Arc::new(StatsCounters::new());
        let (gate, rx) = TickGate::channel(Arc::new(AtomicBool::new(active)), stats.clone(), depth);
        (gate, rx, stats)
    }

    #[test]
    fn test_inactive_ticks_are_dropped() {
        let (gate, rx, stats) = gate(false, 4);
        assert_eq!(gate.fire(), TickOutcome::DroppedInactive);
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().ticks_dropped, 1);
    }

    #[test]
    fn test_queue_overflow_drops() {
        let (gate, rx, stats) = gate(true, 2);
        assert_eq!(gate.fire(), TickOutcome::Accepted);
        assert_eq!(gate.fire(), TickOutcome::Accepted);
        assert_eq!(gate.fire(), TickOutcome::DroppedQueueFull);
        assert_eq!(rx.try_iter().count(), 2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks_accepted, 2);
        assert_eq!(snapshot.ticks_dropped, 1);
    }

    #[test]
    fn test_closed_receiver() {
        let (gate, rx, _) = gate(true, 1);
        drop(rx);
        assert_eq!(gate.fire(), TickOutcome::Closed);
    }

    #[test]
    fn test_clock_fires_and_stops() {
        let (gate, rx, _) = gate(true, 64);
        let mut clock = CaptureClock::spawn(Duration::from_millis(5), gate).unwrap();
        assert!(clock.is_running());

        let first = rx.recv_timeout(Duration::from_secs(2));
        assert!(first.is_ok(), "clock never fired");

        clock.stop();
        assert!(!clock.is_running());
        clock.stop();

        // Drain whatever was in flight; nothing new arrives after stop
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
