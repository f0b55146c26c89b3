//! # Capture Slot Ring
//!
//! A fixed ring of readback slots, each owning every buffer one in-flight
//! device-to-host copy needs. The ring is allocated once at initialization and
//! reused for the driver's lifetime, so the capture hot path never allocates
//! slot buffers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌───────────────────────────────────────────┐
//! │   Scheduler     │───▶│ Slot 0: staging │ host │ output │ request │
//! │ (issues copies) │    │ Slot 1: staging │ host │ output │ request │──▶ Poller
//! └─────────────────┘    │ Slot N: ...                               │  (copies out)
//!                        └───────────────────────────────────────────┘
//! ```
//!
//! - **staging**: device-side buffer the transport copies into
//! - **host**: host-visible bytes mapped from the staging buffer once done
//! - **output**: stable buffer a capture is snapshotted from
//! - **request**: the slot's current transfer handle, if any
//!
//! ## Slot Ownership
//!
//! A slot holds at most one request. The scheduler only replaces it after the
//! previous one resolved, and the poller moves the slot back to idle as soon
//! as it consumes a resolved request, so a completed copy is observed exactly
//! once.

use std::mem;

use crate::backend::{ReadbackRequest, RenderBackend, TransferStatus};
use crate::error::{CaptureError, CaptureResult};

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// No request, free for the scheduler
    Idle,
    /// A request is in flight
    Pending,
    /// The request finished but has not been consumed yet
    Done,
    /// The request failed and has not been consumed yet
    Error,
}

enum SlotState<R> {
    Idle,
    InFlight { request: R, sequence: u64 },
}

/// Result of consuming a slot's request.
#[derive(Debug)]
pub enum Harvest {
    /// No request in the slot
    Idle,
    /// The request has not resolved yet
    Pending,
    /// The mapped bytes were copied into the slot's output buffer
    Ready { sequence: u64 },
    /// The request resolved with an error; nothing was copied
    Failed { sequence: u64, error: CaptureError },
}

/// One ring element.
pub struct CaptureSlot<S, R> {
    index: usize,
    staging: S,
    host: Vec<u8>,
    output: Vec<u8>,
    state: SlotState<R>,
}

impl<S, R: ReadbackRequest> CaptureSlot<S, R> {
    fn new(index: usize, staging: S, frame_len: usize) -> Self {
        Self {
            index,
            staging,
            host: vec![0u8; frame_len],
            output: vec![0u8; frame_len],
            state: SlotState::Idle,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> SlotStatus {
        match &self.state {
            SlotState::Idle => SlotStatus::Idle,
            SlotState::InFlight { request, .. } => match request.status() {
                TransferStatus::Pending => SlotStatus::Pending,
                TransferStatus::Done => SlotStatus::Done,
                TransferStatus::Error => SlotStatus::Error,
            },
        }
    }

    /// Sequence number of the request currently held, if any.
    pub fn sequence(&self) -> Option<u64> {
        match &self.state {
            SlotState::Idle => None,
            SlotState::InFlight { sequence, .. } => Some(*sequence),
        }
    }

    /// The device-side staging buffer requests are issued into.
    pub fn staging_mut(&mut self) -> &mut S {
        &mut self.staging
    }

    /// Stable output buffer filled by the last successful [`harvest`](Self::harvest).
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Stores a freshly issued request.
    ///
    /// The caller must have consumed any previous request first; a slot never
    /// holds two transfers.
    pub fn begin(&mut self, request: R, sequence: u64) {
        debug_assert!(
            matches!(self.state, SlotState::Idle),
            "slot {} still holds a request",
            self.index
        );
        self.state = SlotState::InFlight { request, sequence };
    }

    /// Consumes the slot's request if it has resolved.
    ///
    /// On success the mapped bytes are copied into the host buffer and then
    /// into the stable output buffer. A resolved request, successful or not,
    /// leaves the slot idle.
    pub fn harvest(&mut self) -> Harvest {
        let (request, sequence) = match mem::replace(&mut self.state, SlotState::Idle) {
            SlotState::Idle => return Harvest::Idle,
            SlotState::InFlight { request, sequence } => (request, sequence),
        };

        match request.status() {
            TransferStatus::Pending => {
                self.state = SlotState::InFlight { request, sequence };
                Harvest::Pending
            }
            TransferStatus::Error => Harvest::Failed {
                sequence,
                error: CaptureError::transfer(self.index, "transport reported an error"),
            },
            TransferStatus::Done => match request.read_mapped(&mut self.host) {
                Ok(()) => {
                    self.output.copy_from_slice(&self.host);
                    Harvest::Ready { sequence }
                }
                Err(error) => Harvest::Failed { sequence, error },
            },
        }
    }

    /// Drops the held request without reading it.
    fn discard(&mut self) -> bool {
        !matches!(mem::replace(&mut self.state, SlotState::Idle), SlotState::Idle)
    }
}

/// Fixed-size ring of [`CaptureSlot`]s.
pub struct CapturePool<S, R> {
    slots: Vec<CaptureSlot<S, R>>,
    frame_len: usize,
}

impl<S, R: ReadbackRequest> CapturePool<S, R> {
    /// Allocates `count` slots of `frame_len` bytes each.
    ///
    /// If the backend fails partway through, the staging buffers allocated so
    /// far are handed back before the error is returned.
    pub fn allocate<B>(backend: &mut B, count: usize, frame_len: usize) -> CaptureResult<Self>
    where
        B: RenderBackend<Staging = S, Request = R>,
    {
        if count == 0 {
            return Err(CaptureError::config(
                "slot_count",
                "0",
                "capture pool needs at least one slot",
            ));
        }

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            match backend.create_staging(frame_len) {
                Ok(staging) => slots.push(CaptureSlot::new(index, staging, frame_len)),
                Err(error) => {
                    for slot in slots {
                        backend.release_staging(slot.staging);
                    }
                    return Err(error.with_context(format!("allocating capture slot {}", index)));
                }
            }
        }

        Ok(Self { slots, frame_len })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes per slot buffer.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Ring position for the `sequence`-th capture request.
    pub fn select(&self, sequence: u64) -> usize {
        (sequence % self.slots.len() as u64) as usize
    }

    pub fn slot(&self, index: usize) -> &CaptureSlot<S, R> {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut CaptureSlot<S, R> {
        &mut self.slots[index]
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut CaptureSlot<S, R>> {
        self.slots.iter_mut()
    }

    /// Number of slots whose transfer has not resolved.
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status() == SlotStatus::Pending)
            .count()
    }

    /// Returns every staging buffer to the backend.
    ///
    /// The caller must have waited for all outstanding requests first.
    /// Returns how many unconsumed requests were discarded.
    pub fn release<B>(self, backend: &mut B) -> usize
    where
        B: RenderBackend<Staging = S, Request = R>,
    {
        let mut discarded = 0;
        for mut slot in self.slots {
            if slot.discard() {
                discarded += 1;
            }
            backend.release_staging(slot.staging);
        }
        discarded
    }
}
