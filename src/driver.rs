//! # Capture Driver
//!
//! Root of the capture core. The driver owns the readback slot ring, the
//! capture clock and the registered consumers, and runs the two halves of the
//! readback pipeline on the render-synchronized context:
//!
//! - **Readback Scheduler** ([`CaptureDriver::request_capture`]): picks the
//!   next slot round-robin, skips the tick if that slot's transfer is still
//!   pending, otherwise blits the source into the forward-facing target and
//!   issues a fresh readback into the slot.
//! - **Completion Poller** ([`CaptureDriver::update`]): once per render frame,
//!   consumes every resolved transfer and emits a [`Capture`] for each
//!   successful one.
//!
//! ## Architecture
//!
//! ```text
//!  clock thread                  render-synchronized context
//! ┌─────────────┐  tick   ┌──────────────────────────────────────────────┐
//! │CaptureClock │───────▶│ end_of_frame() ─▶ request_capture() ─▶ slots │
//! └─────────────┘ (queue) │ update()       ◀─ harvest ◀──────────── slots │
//!                         │    └─▶ sinks (Capture)                        │
//!                         └──────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Uninitialized → Stopped ⇄ Started → Disposed`. Initialization happens at
//! most once. Starting and stopping only gate whether clock ticks turn into
//! requests; transfers already in flight still complete and still emit.
//! Disposal waits for every outstanding transfer before releasing buffers and
//! also runs when the driver is dropped.
//!
//! ## Examples
//!
//! ```rust
//! use async_capture::backend::software::SoftwareBackend;
//! use async_capture::config::{CaptureConfig, ClockMode};
//! use async_capture::driver::{CaptureDriver, CaptureSource};
//!
//! let mut driver = CaptureDriver::new(SoftwareBackend::new(64, 32));
//! driver
//!     .initialize_with_config(
//!         CaptureSource::Screen,
//!         CaptureConfig::new(15).with_clock(ClockMode::Manual),
//!     )
//!     .unwrap();
//! driver.subscribe(|capture: async_capture::Capture| {
//!     assert_eq!(capture.data.len(), 64 * 32 * 4);
//! });
//!
//! driver.start_auto_capture();
//! driver.request_capture();
//! driver.backend_mut().present();
//! assert_eq!(driver.update(), 1);
//! driver.dispose();
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace};

use crate::backend::{BlitTransform, ReadbackRequest, RenderBackend};
use crate::config::{CaptureConfig, ClockMode};
use crate::core::clock::{CaptureClock, CaptureTick, TickGate};
use crate::core::slot::{CapturePool, CaptureSlot, Harvest, SlotStatus};
use crate::core::stats::{CaptureStats, StatsCounters};
use crate::error::{CaptureError, CaptureResult};
use crate::format::{CaptureFormat, negotiate};
use crate::frame::Capture;
use crate::sink::{CaptureSink, SinkRegistry, SubscriptionId};

/// What the driver captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource<T> {
    /// The whole rendering surface
    Screen,
    /// A specific texture owned by the host
    Texture(T),
}

/// Lifecycle state of a [`CaptureDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    /// Initialized, auto capture off
    Stopped,
    /// Initialized, auto capture on
    Started,
    Disposed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Uninitialized => "uninitialized",
            DriverState::Stopped => "stopped",
            DriverState::Started => "started",
            DriverState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Result of one [`CaptureDriver::request_capture`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The driver has no slot pool (not initialized, or disposed)
    NotInitialized,
    /// The selected slot's transfer was still pending; the capture was dropped
    Skipped { slot: usize },
    /// A readback was issued into `slot`
    Issued { slot: usize, sequence: u64 },
}

#[derive(Debug, Clone, Copy)]
struct FrameShape {
    width: u32,
    height: u32,
    format: CaptureFormat,
}

/// Where the forward-facing target's contents come from.
enum Surface<T> {
    /// Screen grabs land in `grab` first and are flipped into the target
    Screen { grab: T },
    Texture(T),
}

/// Everything allocated by a successful initialization.
struct Session<B: RenderBackend> {
    surface: Surface<B::Texture>,
    target: B::Texture,
    transform: BlitTransform,
    pool: CapturePool<B::Staging, B::Request>,
    clock: Option<CaptureClock>,
    gate: TickGate,
    ticks: Receiver<CaptureTick>,
    shape: FrameShape,
    capture_rate: u32,
}

/// Asynchronous readback driver over a [`RenderBackend`].
pub struct CaptureDriver<B: RenderBackend> {
    backend: B,
    initialized: bool,
    disposed: bool,
    auto_drive: Arc<AtomicBool>,
    processed_frame_count: u64,
    session: Option<Session<B>>,
    sinks: SinkRegistry,
    stats: Arc<StatsCounters>,
}

impl<B: RenderBackend> CaptureDriver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            initialized: false,
            disposed: false,
            auto_drive: Arc::new(AtomicBool::new(false)),
            processed_frame_count: 0,
            session: None,
            sinks: SinkRegistry::new(),
            stats: Arc::new(StatsCounters::new()),
        }
    }

    /// Initializes with a capture rate and the default configuration otherwise.
    pub fn initialize(
        &mut self,
        source: CaptureSource<B::Texture>,
        capture_rate: u32,
    ) -> CaptureResult<()> {
        self.initialize_with_config(source, CaptureConfig::new(capture_rate))
    }

    /// Negotiates the capture format, allocates the render targets and slot
    /// ring, and starts the capture clock.
    ///
    /// An unsupported source format fails before anything is allocated. A
    /// second call fails with a state error and leaves the existing session
    /// untouched.
    pub fn initialize_with_config(
        &mut self,
        source: CaptureSource<B::Texture>,
        config: CaptureConfig,
    ) -> CaptureResult<()> {
        if self.disposed || self.initialized {
            return Err(CaptureError::state(
                self.state().to_string(),
                "initialize",
                "driver can only be initialized once",
            ));
        }
        config.validate()?;

        let (width, height, source_format) = match &source {
            CaptureSource::Screen => {
                let (width, height) = self.backend.screen_size();
                (width, height, self.backend.screen_format())
            }
            CaptureSource::Texture(texture) => {
                let info = self.backend.texture_info(texture)?;
                (info.width, info.height, info.format)
            }
        };
        let negotiated = negotiate(source_format).map_err(|e| e.with_operation("initialize"))?;
        if width == 0 || height == 0 {
            return Err(CaptureError::config(
                "dimensions",
                format!("{}x{}", width, height),
                "capture source has no pixels",
            ));
        }

        let shape = FrameShape {
            width,
            height,
            format: negotiated.format,
        };
        let capture_rate = config.effective_rate();
        let slot_count = config.slot_count();
        let frame_len = shape.format.frame_len(width, height);

        let target = self
            .backend
            .create_render_target(width, height, shape.format)?;
        let surface = match source {
            CaptureSource::Texture(texture) => Surface::Texture(texture),
            CaptureSource::Screen => {
                match self.backend.create_render_target(width, height, shape.format) {
                    Ok(grab) => Surface::Screen { grab },
                    Err(error) => {
                        self.backend.release_render_target(target);
                        return Err(error);
                    }
                }
            }
        };
        let transform = match surface {
            Surface::Screen { .. } => BlitTransform::FLIP_Y,
            Surface::Texture(_) => BlitTransform::IDENTITY,
        };

        let pool = match CapturePool::allocate(&mut self.backend, slot_count, frame_len) {
            Ok(pool) => pool,
            Err(error) => {
                release_targets(&mut self.backend, surface, target);
                return Err(error);
            }
        };

        let (gate, ticks) =
            TickGate::channel(self.auto_drive.clone(), self.stats.clone(), config.queue_depth);
        let clock = match config.clock {
            ClockMode::Manual => None,
            ClockMode::Background => match CaptureClock::spawn(config.tick_interval(), gate.clone())
            {
                Ok(clock) => Some(clock),
                Err(error) => {
                    pool.release(&mut self.backend);
                    release_targets(&mut self.backend, surface, target);
                    return Err(error);
                }
            },
        };

        info!(
            capture_rate,
            interval_ms = config.tick_interval().as_secs_f64() * 1000.0,
            width,
            height,
            format = ?shape.format,
            slots = slot_count,
            "[driver] initialized"
        );

        self.session = Some(Session {
            surface,
            target,
            transform,
            pool,
            clock,
            gate,
            ticks,
            shape,
            capture_rate,
        });
        self.initialized = true;
        Ok(())
    }

    /// Lets clock ticks issue requests. No effect when already started.
    pub fn start_auto_capture(&mut self) {
        if !self.auto_drive.swap(true, Ordering::AcqRel) {
            info!("[driver] auto capture started");
        }
    }

    /// Stops new requests. In-flight transfers still complete and emit.
    /// No effect when already stopped.
    pub fn stop_auto_capture(&mut self) {
        if self.auto_drive.swap(false, Ordering::AcqRel) {
            info!("[driver] auto capture stopped");
        }
    }

    /// Issues one readback into the next slot of the ring.
    ///
    /// The slot index advances on every call, including skipped ones. A slot
    /// whose previous transfer is still pending is left alone and the capture
    /// is dropped. A slot whose transfer resolved but was not polled yet is
    /// harvested first, so the finished frame is still delivered.
    pub fn request_capture(&mut self) -> RequestOutcome {
        let Some(session) = self.session.as_mut() else {
            return RequestOutcome::NotInitialized;
        };

        let sequence = self.processed_frame_count;
        self.processed_frame_count += 1;
        let index = session.pool.select(sequence);

        let slot = session.pool.slot_mut(index);
        match slot.status() {
            SlotStatus::Pending => {
                self.stats.backpressure_skip();
                debug!(slot = index, sequence, "slot busy, skipping capture");
                return RequestOutcome::Skipped { slot: index };
            }
            SlotStatus::Done | SlotStatus::Error => {
                harvest_slot(slot, session.shape, &mut self.sinks, &self.stats);
            }
            SlotStatus::Idle => {}
        }

        match &session.surface {
            Surface::Screen { grab } => {
                self.backend.capture_screen_into(grab);
                self.backend.blit(grab, &session.target, session.transform);
            }
            Surface::Texture(texture) => {
                self.backend
                    .blit(texture, &session.target, session.transform);
            }
        }

        let slot = session.pool.slot_mut(index);
        let request = self
            .backend
            .request_readback(&session.target, slot.staging_mut());
        slot.begin(request, sequence);
        self.stats.request_issued();
        trace!(slot = index, sequence, "readback issued");

        RequestOutcome::Issued {
            slot: index,
            sequence,
        }
    }

    /// Completion Poller. Call once per rendered frame.
    ///
    /// Returns how many captures were emitted.
    pub fn update(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let shape = session.shape;

        let mut emitted = 0;
        for slot in session.pool.slots_mut() {
            if harvest_slot(slot, shape, &mut self.sinks, &self.stats) {
                emitted += 1;
            }
        }
        emitted
    }

    /// Applies the ticks the clock handed off since the last call, one
    /// request per tick. Call at the end of every rendered frame.
    ///
    /// Ticks still queued when auto capture was stopped are discarded.
    /// Returns how many readbacks were issued.
    pub fn end_of_frame(&mut self) -> usize {
        let Some(session) = &self.session else {
            return 0;
        };
        let ticks = session.ticks.try_iter().count();
        if ticks == 0 {
            return 0;
        }

        if !self.auto_drive.load(Ordering::Acquire) {
            debug!(ticks, "auto capture stopped, discarding queued ticks");
            return 0;
        }

        (0..ticks)
            .filter(|_| matches!(self.request_capture(), RequestOutcome::Issued { .. }))
            .count()
    }

    /// Waits for every outstanding transfer, then releases all buffers and
    /// render targets. Idempotent; also run on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.auto_drive.store(false, Ordering::Release);

        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(mut clock) = session.clock.take() {
            clock.stop();
        }

        self.backend.wait_all_requests();
        let discarded = session.pool.release(&mut self.backend);
        release_targets(&mut self.backend, session.surface, session.target);

        if discarded > 0 {
            debug!(discarded, "unpolled transfers discarded on dispose");
        }
        info!("[driver] disposed");
    }

    /// Registers a consumer. Sinks run on the render-synchronized context.
    pub fn subscribe<S>(&mut self, sink: S) -> SubscriptionId
    where
        S: CaptureSink + 'static,
    {
        self.sinks.subscribe(Box::new(sink))
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.sinks.unsubscribe(id)
    }

    /// Producer handle for delivering ticks without the background clock.
    pub fn tick_handle(&self) -> Option<TickGate> {
        self.session.as_ref().map(|session| session.gate.clone())
    }

    pub fn state(&self) -> DriverState {
        if self.disposed {
            DriverState::Disposed
        } else if !self.initialized {
            DriverState::Uninitialized
        } else if self.is_auto_drive() {
            DriverState::Started
        } else {
            DriverState::Stopped
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_auto_drive(&self) -> bool {
        self.auto_drive.load(Ordering::Acquire)
    }

    /// Slots in the ring; 0 without a session.
    pub fn slot_count(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.pool.len())
    }

    pub fn slot_status(&self, index: usize) -> Option<SlotStatus> {
        let session = self.session.as_ref()?;
        (index < session.pool.len()).then(|| session.pool.slot(index).status())
    }

    /// Effective (clamped) capture rate.
    pub fn capture_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.capture_rate)
    }

    pub fn format(&self) -> Option<CaptureFormat> {
        self.session.as_ref().map(|session| session.shape.format)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.session
            .as_ref()
            .map(|session| (session.shape.width, session.shape.height))
    }

    /// Requests attempted so far, skipped ones included.
    pub fn processed_frame_count(&self) -> u64 {
        self.processed_frame_count
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend> Drop for CaptureDriver<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Consumes a slot's resolved transfer. Returns whether a capture was emitted.
fn harvest_slot<S, R: ReadbackRequest>(
    slot: &mut CaptureSlot<S, R>,
    shape: FrameShape,
    sinks: &mut SinkRegistry,
    stats: &StatsCounters,
) -> bool {
    match slot.harvest() {
        Harvest::Idle | Harvest::Pending => false,
        Harvest::Failed { sequence, error } => {
            stats.transfer_error();
            debug!(slot = slot.index(), sequence, %error, "readback failed, dropping capture");
            false
        }
        Harvest::Ready { sequence } => {
            let capture = Capture::new(
                slot.output().to_vec(),
                shape.width,
                shape.height,
                shape.format,
                sequence,
            );
            sinks.emit(capture);
            stats.capture_emitted();
            trace!(slot = slot.index(), sequence, "capture emitted");
            true
        }
    }
}

fn release_targets<B: RenderBackend>(backend: &mut B, surface: Surface<B::Texture>, target: B::Texture) {
    backend.release_render_target(target);
    match surface {
        Surface::Screen { grab } => backend.release_render_target(grab),
        // Host-owned
        Surface::Texture(_) => {}
    }
}
