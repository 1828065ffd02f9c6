//! `calloc` and `realloc` built on the two engines.

use guardheap_core::{NullReason, Operation, Outcome, PayloadPtr};

use crate::alloc::granted;
use crate::block::{align_up, SLACK_BYTE};
use crate::heap::{Heap, LiveBlock};

impl Heap {
    /// Allocate zeroed storage for `count` elements of `elem_size` bytes.
    ///
    /// Returns `None` if either argument is zero, if the product overflows,
    /// or if the allocation itself fails.
    pub fn zero_allocate(&mut self, count: usize, elem_size: usize) -> Option<PayloadPtr> {
        let (requested, result) = if count == 0 || elem_size == 0 {
            (0, Err(NullReason::ZeroSize))
        } else {
            match count.checked_mul(elem_size) {
                Some(total) => (total, self.allocate_block(total)),
                None => (usize::MAX, Err(NullReason::Overflow)),
            }
        };
        if let Ok(ptr) = result {
            // Fresh blocks come from zeroed storage; this keeps the
            // contract independent of that.
            let payload = ptr.offset();
            self.store.fill(payload..payload + requested, 0);
        }
        self.emit(Operation::ZeroAllocate, requested, granted(result));
        result.ok()
    }

    /// Resize an allocation, preserving its contents up to the smaller of
    /// the old and new sizes.
    ///
    /// - `None` behaves like [`allocate`](Heap::allocate).
    /// - A `new_size` of zero frees the allocation and returns `None`.
    /// - A handle that fails validation is reported and `None` returned;
    ///   the heap is left as it was, except that a block with damaged
    ///   guards is quarantined.
    /// - If the rounded new size fits the current block, the resize happens
    ///   in place and the same handle is returned.
    /// - Otherwise the data moves to a new block. If that allocation fails
    ///   the original allocation is untouched.
    ///
    /// Bytes gained by growing are zero.
    pub fn reallocate(&mut self, ptr: Option<PayloadPtr>, new_size: usize) -> Option<PayloadPtr> {
        let Some(ptr) = ptr else {
            let result = self.allocate_block(new_size);
            self.emit(Operation::Reallocate, new_size, granted(result));
            return result.ok();
        };

        if new_size == 0 {
            let outcome = match self.release(ptr) {
                Ok(_) => Outcome::Released,
                Err(anomaly) => Outcome::Rejected(anomaly),
            };
            self.emit(Operation::Reallocate, 0, outcome);
            return None;
        }

        let live = match self.inspect(ptr) {
            Ok(live) => live,
            Err(rejection) => {
                self.quarantine_rejected(&rejection);
                let reason = NullReason::InvalidHandle(rejection.anomaly);
                self.emit(Operation::Reallocate, new_size, Outcome::Null(reason));
                return None;
            }
        };

        if align_up(new_size).is_some_and(|rounded| rounded <= live.size) {
            self.resize_in_place(live, new_size);
            let outcome = Outcome::Resized { ptr, moved: false };
            self.emit(Operation::Reallocate, new_size, outcome);
            return Some(ptr);
        }

        match self.allocate_block(new_size) {
            Ok(moved_to) => {
                let src = live.block.payload_range(live.requested);
                self.store.copy_within(src, moved_to.offset());
                self.release_live(live);
                let outcome = Outcome::Resized {
                    ptr: moved_to,
                    moved: true,
                };
                self.emit(Operation::Reallocate, new_size, outcome);
                Some(moved_to)
            }
            Err(reason) => {
                self.emit(Operation::Reallocate, new_size, Outcome::Null(reason));
                None
            }
        }
    }

    fn resize_in_place(&mut self, live: LiveBlock, new_size: usize) {
        let LiveBlock {
            block,
            size,
            requested,
        } = live;
        let payload = block.payload_offset();
        if new_size < requested {
            self.store
                .fill(payload + new_size..payload + requested, SLACK_BYTE);
        } else {
            self.store.fill(payload + requested..payload + new_size, 0);
        }
        block.set_requested(&mut self.store, size, new_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::OVERHEAD;
    use crate::config::HeapConfig;
    use guardheap_core::{CanarySite, FreeAnomaly};

    fn heap(capacity: usize) -> Heap {
        Heap::new(HeapConfig::new(capacity)).unwrap()
    }

    #[test]
    fn zero_allocate_rejects_zero_and_overflow() {
        let mut h = heap(1024);
        assert_eq!(h.zero_allocate(0, 8), None);
        assert_eq!(h.zero_allocate(8, 0), None);
        assert_eq!(h.zero_allocate(usize::MAX, 2), None);
        assert_eq!(h.stats().null_returns, 3);
    }

    #[test]
    fn zero_allocate_returns_zeroed_product() {
        let mut h = heap(1024);
        let p = h.allocate(64).unwrap();
        h.payload_mut(p).unwrap().fill(0xEE);
        h.deallocate(Some(p));
        let q = h.zero_allocate(8, 8).unwrap();
        assert_eq!(q, p);
        assert_eq!(h.payload(q).unwrap(), &[0u8; 64]);
    }

    #[test]
    fn null_handle_allocates() {
        let mut h = heap(1024);
        let p = h.reallocate(None, 24).unwrap();
        assert_eq!(h.requested_size(p), Some(24));
        assert_eq!(h.reallocate(None, 0), None);
    }

    #[test]
    fn zero_size_frees() {
        let mut h = heap(1024);
        let p = h.allocate(24).unwrap();
        assert_eq!(h.reallocate(Some(p), 0), None);
        assert_eq!(h.usable_size(p), None);
        assert_eq!(h.stats().free_blocks, 1);
    }

    #[test]
    fn shrink_in_place_guards_released_tail() {
        let mut h = heap(1024);
        let p = h.allocate(30).unwrap();
        h.payload_mut(p).unwrap().copy_from_slice(&[9u8; 30]);
        assert_eq!(h.reallocate(Some(p), 10), Some(p));
        assert_eq!(h.payload(p).unwrap(), &[9u8; 10]);
        // Writing into the former tail is now an overflow.
        h.raw_store_mut()[p.offset() + 12] = 9;
        assert_eq!(
            h.release(p),
            Err(FreeAnomaly::Corruption {
                offset: p.offset(),
                site: CanarySite::Slack,
            })
        );
    }

    #[test]
    fn grow_within_block_zeroes_new_bytes() {
        let mut h = heap(1024);
        let p = h.allocate(20).unwrap();
        h.payload_mut(p).unwrap().fill(3);
        assert_eq!(h.reallocate(Some(p), 32), Some(p));
        let bytes = h.payload(p).unwrap();
        assert_eq!(&bytes[..20], &[3u8; 20]);
        assert_eq!(&bytes[20..], &[0u8; 12]);
    }

    #[test]
    fn grow_past_block_moves_and_frees_old() {
        let mut h = heap(1024);
        let p = h.allocate(16).unwrap();
        let _fence = h.allocate(16).unwrap();
        h.payload_mut(p).unwrap().copy_from_slice(b"0123456789abcdef");
        let q = h.reallocate(Some(p), 64).unwrap();
        assert_ne!(q, p);
        assert_eq!(&h.payload(q).unwrap()[..16], b"0123456789abcdef");
        assert_eq!(&h.payload(q).unwrap()[16..], &[0u8; 48]);
        assert_eq!(h.usable_size(p), None);
        assert_eq!(h.stats().moves, 1);
    }

    #[test]
    fn failed_move_leaves_original_intact() {
        let mut h = heap(256);
        let p = h.allocate(100).unwrap();
        h.payload_mut(p).unwrap().fill(5);
        assert_eq!(h.reallocate(Some(p), 256 - OVERHEAD), None);
        assert_eq!(h.payload(p).unwrap(), &[5u8; 100]);
    }

    #[test]
    fn invalid_handle_returns_null() {
        let mut h = heap(1024);
        let p = h.allocate(16).unwrap();
        h.deallocate(Some(p));
        assert_eq!(h.reallocate(Some(p), 32), None);
        assert_eq!(h.stats().anomalies, 1);
        assert!(h.audit().is_clean());
    }
}
