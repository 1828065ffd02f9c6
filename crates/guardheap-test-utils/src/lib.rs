//! Test utilities for guardheap development.
//!
//! Provides a [`RecordingSink`] that captures every [`HeapEvent`],
//! [`assert_heap_invariants`] for checking a heap after each step, guard
//! corruption helpers in [`fault`], and a seeded [`ChurnWorkload`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fault;
pub mod workload;

use std::sync::{Arc, Mutex, PoisonError};

use guardheap_arena::{Heap, HeapConfig, StoreState};
use guardheap_core::{EventSink, HeapEvent, Operation, Outcome};

pub use workload::{ChurnStep, ChurnWorkload};

/// Captures every event into a shared buffer.
///
/// Clones share the buffer, so keep one clone and hand the other to the
/// heap.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<HeapEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<HeapEvent> {
        self.lock().clone()
    }

    /// The most recent event.
    pub fn last(&self) -> Option<HeapEvent> {
        self.lock().last().copied()
    }

    /// Recorded outcomes for one operation, in order.
    pub fn outcomes(&self, operation: Operation) -> Vec<Outcome> {
        self.lock()
            .iter()
            .filter(|e| e.operation == operation)
            .map(|e| e.outcome)
            .collect()
    }

    /// Number of anomalous events.
    pub fn anomalies(&self) -> usize {
        self.lock().iter().filter(|e| e.outcome.is_anomaly()).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HeapEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &HeapEvent) {
        self.lock().push(*event);
    }
}

/// A heap of `capacity` bytes with a [`RecordingSink`] attached.
pub fn recorded_heap(capacity: usize) -> (Heap, RecordingSink) {
    let sink = RecordingSink::new();
    let heap = Heap::new(HeapConfig::new(capacity))
        .expect("test capacity must be valid")
        .with_sink(sink.clone());
    (heap, sink)
}

/// Assert every structural invariant of `heap`.
///
/// - the audit walk finds nothing;
/// - carved bytes add up to the capacity;
/// - the statistics agree with the audit.
///
/// # Panics
///
/// On the first violated invariant, with the audit findings in the message.
pub fn assert_heap_invariants(heap: &Heap) {
    let report = heap.audit();
    assert!(
        report.is_clean(),
        "heap audit failed: {:?}",
        report.findings
    );

    let stats = heap.stats();
    if heap.store_state() == StoreState::Uninitialized {
        assert_eq!(report.blocks, 0);
        return;
    }
    let carved = stats.live_usable_bytes
        + stats.free_bytes
        + stats.quarantined_bytes
        + stats.overhead_bytes;
    assert_eq!(carved, stats.capacity, "conservation violated: {stats:?}");
    assert_eq!(stats.live_allocations, report.allocations.len());
    assert_eq!(stats.free_blocks, report.free_blocks);
    assert_eq!(stats.quarantined, report.quarantined);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_captures_in_order() {
        let (mut heap, sink) = recorded_heap(1024);
        let p = heap.allocate(8);
        heap.deallocate(p);
        heap.deallocate(p);
        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.anomalies(), 1);
        assert_eq!(
            sink.outcomes(Operation::Deallocate)[0],
            Outcome::Released
        );
        sink.clear();
        assert!(sink.last().is_none());
    }

    #[test]
    fn deallocate_events_carry_the_released_size() {
        let (mut heap, sink) = recorded_heap(1024);
        let p = heap.allocate(40);
        heap.deallocate(p);
        heap.deallocate(p);
        heap.deallocate(None);
        let sizes: Vec<_> = sink
            .events()
            .iter()
            .filter(|e| e.operation == Operation::Deallocate)
            .map(|e| e.requested)
            .collect();
        assert_eq!(sizes, vec![40, 0, 0]);
    }

    #[test]
    fn invariants_hold_for_fresh_and_used_heaps() {
        let (mut heap, _sink) = recorded_heap(1024);
        assert_heap_invariants(&heap);
        let p = heap.allocate(100);
        assert_heap_invariants(&heap);
        heap.deallocate(p);
        assert_heap_invariants(&heap);
    }
}
