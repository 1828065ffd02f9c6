//! Heap occupancy and operation counters.
//!
//! [`HeapStats`] is a point-in-time snapshot: cumulative operation counts
//! kept by the engine, plus occupancy figures computed by walking the
//! store when the snapshot is taken.

use guardheap_core::{HeapEvent, NullReason, Operation, Outcome};

use crate::audit::BlockWalk;
use crate::block::{BlockState, OVERHEAD};
use crate::heap::Heap;
use crate::store::StoreState;

/// Cumulative counters updated on every emitted event.
#[derive(Clone, Debug, Default)]
pub(crate) struct Counters {
    pub(crate) allocate_calls: u64,
    pub(crate) deallocate_calls: u64,
    pub(crate) zero_allocate_calls: u64,
    pub(crate) reallocate_calls: u64,
    pub(crate) null_returns: u64,
    pub(crate) exhausted: u64,
    pub(crate) anomalies: u64,
    pub(crate) moves: u64,
}

impl Counters {
    pub(crate) fn record(&mut self, event: &HeapEvent) {
        match event.operation {
            Operation::Allocate => self.allocate_calls += 1,
            Operation::Deallocate => self.deallocate_calls += 1,
            Operation::ZeroAllocate => self.zero_allocate_calls += 1,
            Operation::Reallocate => self.reallocate_calls += 1,
        }
        if event.outcome.is_anomaly() {
            self.anomalies += 1;
        }
        match event.outcome {
            Outcome::Null(reason) => {
                self.null_returns += 1;
                if matches!(reason, NullReason::Exhausted { .. } | NullReason::TooLarge { .. }) {
                    self.exhausted += 1;
                }
            }
            Outcome::Resized { moved: true, .. } => self.moves += 1,
            _ => {}
        }
    }
}

/// Snapshot of heap activity and occupancy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total arena capacity in bytes.
    pub capacity: usize,
    /// Whether the backing store is currently held.
    pub store_active: bool,
    /// Number of times the store has been acquired.
    pub store_acquisitions: u64,
    /// Number of times the store has been released.
    pub store_releases: u64,
    /// Cumulative `allocate` calls.
    pub allocate_calls: u64,
    /// Cumulative `deallocate` calls.
    pub deallocate_calls: u64,
    /// Cumulative `zero_allocate` calls.
    pub zero_allocate_calls: u64,
    /// Cumulative `reallocate` calls.
    pub reallocate_calls: u64,
    /// Cumulative operations that returned no handle.
    pub null_returns: u64,
    /// Of those, how many failed for lack of space.
    pub exhausted: u64,
    /// Cumulative rejected handles (double frees, wild pointers, corruption).
    pub anomalies: u64,
    /// Cumulative reallocations that had to move the payload.
    pub moves: u64,
    /// Allocated blocks currently live.
    pub live_allocations: usize,
    /// Sum of requested sizes over live allocations.
    pub live_requested_bytes: usize,
    /// Sum of usable sizes over live allocations.
    pub live_usable_bytes: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Sum of free block payload sizes.
    pub free_bytes: usize,
    /// Largest single free payload; an upper bound on the next allocation.
    pub largest_free: usize,
    /// Blocks held in quarantine.
    pub quarantined: usize,
    /// Payload bytes withheld by quarantined blocks.
    pub quarantined_bytes: usize,
    /// Bytes consumed by headers and trailers.
    pub overhead_bytes: usize,
}

impl Heap {
    /// Take a statistics snapshot. Walks the store; O(blocks).
    pub fn stats(&self) -> HeapStats {
        let c = &self.counters;
        let mut stats = HeapStats {
            capacity: self.capacity(),
            store_active: self.store_state() == StoreState::Active,
            store_acquisitions: self.store.acquisitions(),
            store_releases: self.store.releases(),
            allocate_calls: c.allocate_calls,
            deallocate_calls: c.deallocate_calls,
            zero_allocate_calls: c.zero_allocate_calls,
            reallocate_calls: c.reallocate_calls,
            null_returns: c.null_returns,
            exhausted: c.exhausted,
            anomalies: c.anomalies,
            moves: c.moves,
            quarantined: self.quarantine.len(),
            ..HeapStats::default()
        };

        for (block, size) in BlockWalk::new(&self.store) {
            stats.overhead_bytes += OVERHEAD;
            match block.state(&self.store) {
                Some(BlockState::Free) => {
                    stats.free_blocks += 1;
                    stats.free_bytes += size;
                    stats.largest_free = stats.largest_free.max(size);
                }
                Some(BlockState::Allocated) => {
                    stats.live_allocations += 1;
                    stats.live_usable_bytes += size;
                    stats.live_requested_bytes += block.requested(&self.store, size);
                }
                Some(BlockState::Poisoned) => stats.quarantined_bytes += size,
                None => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;

    #[test]
    fn fresh_heap_is_empty() {
        let heap = Heap::new(HeapConfig::new(1024)).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.capacity, 1024);
        assert!(!stats.store_active);
        assert_eq!(stats.free_blocks, 0);
        assert_eq!(stats.overhead_bytes, 0);
    }

    #[test]
    fn occupancy_accounts_for_every_byte() {
        let mut heap = Heap::new(HeapConfig::new(1024)).unwrap();
        let _a = heap.allocate(100).unwrap();
        let b = heap.allocate(10).unwrap();
        heap.deallocate(Some(b));
        let stats = heap.stats();
        assert!(stats.store_active);
        assert_eq!(stats.live_allocations, 1);
        assert_eq!(stats.live_requested_bytes, 100);
        assert_eq!(stats.live_usable_bytes, 112);
        assert_eq!(
            stats.live_usable_bytes + stats.free_bytes + stats.overhead_bytes,
            1024
        );
        assert_eq!(stats.allocate_calls, 2);
        assert_eq!(stats.deallocate_calls, 1);
    }

    #[test]
    fn failures_are_counted() {
        let mut heap = Heap::new(HeapConfig::new(256)).unwrap();
        assert!(heap.allocate(0).is_none());
        assert!(heap.allocate(4096).is_none());
        heap.deallocate(Some(guardheap_core::PayloadPtr::from_offset(8)));
        let stats = heap.stats();
        assert_eq!(stats.null_returns, 2);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.anomalies, 1);
    }
}
