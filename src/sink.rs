//! # Capture Consumers
//!
//! Consumers register a [`CaptureSink`] with the driver and receive every
//! emitted [`Capture`], synchronously, on the render-synchronized context,
//! zero or more times per rendered frame.
//!
//! Sinks must return quickly. Encoding, file I/O and other CPU-heavy work
//! belong on a worker: [`ChannelSink`] forwards captures through a bounded
//! crossbeam channel for exactly that purpose, dropping captures (with a
//! warning) instead of blocking the render context when the worker falls
//! behind.
//!
//! ```rust
//! use async_capture::sink::ChannelSink;
//!
//! let (sink, receiver) = ChannelSink::bounded(4);
//! std::thread::spawn(move || {
//!     for capture in receiver {
//!         // encode and persist off the render context
//!         let _ = capture.data.len();
//!     }
//! });
//! # drop(sink);
//! ```

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::warn;

use crate::frame::Capture;

/// Receives captures on the render-synchronized context.
pub trait CaptureSink: Send {
    fn on_capture(&mut self, capture: Capture);
}

impl<F> CaptureSink for F
where
    F: FnMut(Capture) + Send,
{
    fn on_capture(&mut self, capture: Capture) {
        self(capture)
    }
}

/// Forwards captures to a bounded channel without blocking.
pub struct ChannelSink {
    sender: Sender<Capture>,
    dropped: u64,
}

impl ChannelSink {
    /// Creates a sink and the receiver a worker drains.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Capture>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (Self::new(sender), receiver)
    }

    pub fn new(sender: Sender<Capture>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Captures discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl CaptureSink for ChannelSink {
    fn on_capture(&mut self, capture: Capture) {
        match self.sender.try_send(capture) {
            Ok(()) => {}
            Err(TrySendError::Full(capture)) => {
                self.dropped += 1;
                warn!(
                    sequence = capture.sequence,
                    dropped = self.dropped,
                    "capture consumer is behind, dropping frame"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered sinks, notified in registration order.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<(SubscriptionId, Box<dyn CaptureSink>)>,
    next_id: u64,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Box<dyn CaptureSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.sinks.push((id, sink));
        id
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hands `capture` to every sink. Clones share the frame bytes.
    pub fn emit(&mut self, capture: Capture) {
        let Some(((_, last), rest)) = self.sinks.split_last_mut() else {
            return;
        };
        for (_, sink) in rest {
            sink.on_capture(capture.clone());
        }
        last.on_capture(capture);
    }
}
