//! Benchmark fixtures for the guardheap allocator.
//!
//! - [`fragmented_heap`]: a heap whose free list is a long run of small
//!   holes, the worst case for first-fit search.
//! - [`packed_heap`]: a heap filled with equal-size allocations.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use guardheap_arena::{Heap, HeapConfig};
use guardheap_core::PayloadPtr;

/// Arena size used by the standard profiles (1 MiB).
pub const BENCH_CAPACITY: usize = 1 << 20;

/// Fill a heap of `capacity` bytes with `size`-byte allocations until it
/// refuses, returning the live handles in address order.
pub fn packed_heap(capacity: usize, size: usize) -> (Heap, Vec<PayloadPtr>) {
    let mut heap = Heap::new(HeapConfig::new(capacity)).expect("bench capacity must be valid");
    let mut live = Vec::new();
    while let Some(p) = heap.allocate(size) {
        live.push(p);
    }
    (heap, live)
}

/// A packed heap of `size`-byte allocations with every other one freed,
/// leaving `live.len()` non-adjacent holes none of which fits more than
/// `size` bytes.
pub fn fragmented_heap(capacity: usize, size: usize) -> (Heap, Vec<PayloadPtr>) {
    let (mut heap, all) = packed_heap(capacity, size);
    let mut kept = Vec::with_capacity(all.len() / 2 + 1);
    for (i, p) in all.into_iter().enumerate() {
        if i % 2 == 0 {
            heap.deallocate(Some(p));
        } else {
            kept.push(p);
        }
    }
    (heap, kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragmented_heap_has_one_hole_per_kept_block() {
        let (heap, kept) = fragmented_heap(64 * 1024, 48);
        let stats = heap.stats();
        assert!(stats.free_blocks >= kept.len());
        assert_eq!(stats.live_allocations, kept.len());
        assert!(heap.audit().is_clean());
    }

    #[test]
    fn packed_heap_is_full() {
        let (mut heap, live) = packed_heap(4096, 100);
        assert!(!live.is_empty());
        assert!(heap.allocate(100).is_none());
    }
}
