//! Deallocation engine: validation, sorted reinsertion, coalescing.

use guardheap_core::{FreeAnomaly, Operation, Outcome, PayloadPtr};

use crate::block::{Block, BlockState, OVERHEAD, TRAILER_SIZE};
use crate::config::ReleasePolicy;
use crate::heap::{Heap, LiveBlock};

impl Heap {
    /// Return an allocation to the heap.
    ///
    /// Never fails from the caller's point of view. `None` is a no-op.
    /// Handles that are out of bounds, misaligned, already freed, or whose
    /// guards are damaged are reported through the event sink and otherwise
    /// ignored; a block with damaged guards is quarantined and never
    /// reused.
    pub fn deallocate(&mut self, ptr: Option<PayloadPtr>) {
        let (requested, outcome) = match ptr {
            None => (0, Outcome::Ignored),
            Some(ptr) => match self.release(ptr) {
                Ok(requested) => (requested, Outcome::Released),
                Err(anomaly) => (0, Outcome::Rejected(anomaly)),
            },
        };
        self.emit(Operation::Deallocate, requested, outcome);
    }

    /// Validate and release without event emission. Returns the requested
    /// size of the released allocation.
    pub(crate) fn release(&mut self, ptr: PayloadPtr) -> Result<usize, FreeAnomaly> {
        match self.inspect(ptr) {
            Ok(live) => {
                self.release_live(live);
                Ok(live.requested)
            }
            Err(rejection) => {
                self.quarantine_rejected(&rejection);
                Err(rejection.anomaly)
            }
        }
    }

    /// Release a block that already passed validation.
    pub(crate) fn release_live(&mut self, live: LiveBlock) {
        let LiveBlock { block, size, .. } = live;
        self.scrub_free_list();
        self.store.fill(block.payload_range(size), 0);
        block.install(&mut self.store, size, BlockState::Free, None);

        let neighbors = self.free.insert_sorted(&mut self.store, block);
        if let Some(next) = neighbors.next {
            if block.end(&self.store) == Some(next.offset()) {
                self.absorb(block, next);
            }
        }
        if let Some(prev) = neighbors.prev {
            if prev.end(&self.store) == Some(block.offset()) {
                self.absorb(prev, block);
            }
        }
        self.apply_release_policy();
    }

    /// Merge free block `right` into its address-order predecessor `left`.
    /// The two must be adjacent and consecutive on the free list.
    fn absorb(&mut self, left: Block, right: Block) {
        let Some(end) = right.end(&self.store) else {
            return;
        };
        let seam_start = left.payload_offset() + left.size(&self.store);
        let after = right.next(&self.store);
        // Left trailer and right header become payload.
        self.store.fill(seam_start..right.payload_offset(), 0);
        let merged = end - left.payload_offset() - TRAILER_SIZE;
        left.install(&mut self.store, merged, BlockState::Free, after);
    }

    fn apply_release_policy(&mut self) {
        if self.config.release_policy != ReleasePolicy::WhenEmpty || !self.quarantine.is_empty() {
            return;
        }
        let whole = Block::at(0);
        let empty = self.free.head() == Some(whole)
            && whole.size(&self.store) == self.capacity() - OVERHEAD;
        if empty {
            self.free.clear();
            self.store.release();
            tracing::debug!(capacity = self.capacity(), "backing store released");
        }
    }
}
