//! Ready-made [`EventSink`] implementations.
//!
//! - [`TracingSink`] forwards events to the `tracing` ecosystem.
//! - [`ChannelSink`] hands events to another thread without blocking.
//! - [`NullSink`] discards everything.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use guardheap_core::{EventSink, HeapEvent, Outcome};

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &HeapEvent) {}
}

/// Emits each event as a `tracing` event under the `guardheap` target.
///
/// Rejected handles log at `WARN`, null returns at `DEBUG`, everything
/// else at `TRACE`. Fields: `op`, `requested`, `outcome`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &HeapEvent) {
        let op = event.operation.name();
        let requested = event.requested;
        if event.outcome.is_anomaly() {
            tracing::warn!(target: "guardheap", op, requested, outcome = %event.outcome, "heap anomaly");
        } else if matches!(event.outcome, Outcome::Null(_)) {
            tracing::debug!(target: "guardheap", op, requested, outcome = %event.outcome, "null return");
        } else {
            tracing::trace!(target: "guardheap", op, requested, outcome = %event.outcome);
        }
    }
}

/// Sends events over a `crossbeam-channel` without ever blocking the heap.
///
/// Events that do not fit (bounded channel full) or have nowhere to go
/// (receiver dropped) are counted in [`dropped`](ChannelSink::dropped).
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<HeapEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// A sink over a bounded channel of `capacity` events, with its
    /// receiving end.
    pub fn bounded(capacity: usize) -> (Self, Receiver<HeapEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::from_sender(tx), rx)
    }

    /// A sink over an unbounded channel, with its receiving end.
    pub fn unbounded() -> (Self, Receiver<HeapEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::from_sender(tx), rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: Sender<HeapEvent>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Events discarded because the channel was full or disconnected.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn record(&self, event: &HeapEvent) {
        match self.tx.try_send(*event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
