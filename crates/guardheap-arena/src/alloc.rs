//! Allocation engine: first-fit search, splitting, guard installation.

use guardheap_core::{NullReason, Operation, Outcome, PayloadPtr};

use crate::block::{align_up, Block, BlockState, OVERHEAD, SLACK_BYTE, TRAILER_SIZE};
use crate::heap::Heap;

impl Heap {
    /// Allocate `size` bytes and return a handle to zeroed storage.
    ///
    /// Returns `None` for a zero size, a request larger than the arena, or
    /// when no free block is large enough. The usable size is rounded up to
    /// the 16-byte granule; the bytes between the request and the usable
    /// size are guard bytes and must not be written.
    pub fn allocate(&mut self, size: usize) -> Option<PayloadPtr> {
        let result = self.allocate_block(size);
        self.emit(Operation::Allocate, size, granted(result));
        result.ok()
    }

    /// Allocation without event emission, shared by the derived operations.
    pub(crate) fn allocate_block(&mut self, requested: usize) -> Result<PayloadPtr, NullReason> {
        if requested == 0 {
            return Err(NullReason::ZeroSize);
        }
        let capacity = self.capacity();
        let rounded = align_up(requested)
            .filter(|&r| r.checked_add(OVERHEAD).is_some_and(|total| total <= capacity))
            .ok_or(NullReason::TooLarge {
                requested,
                capacity,
            })?;

        if !self.ensure_store() {
            return Err(NullReason::Exhausted { requested });
        }
        self.scrub_free_list();
        let (block, prev) = self
            .free
            .find_first_fit(&self.store, rounded)
            .ok_or(NullReason::Exhausted { requested })?;

        let mut size = block.size(&self.store);
        if size > rounded + OVERHEAD {
            // Carve the tail into a new free node that takes this block's
            // place in the list.
            let rest = Block::at(block.payload_offset() + rounded + TRAILER_SIZE);
            let next = block.next(&self.store);
            rest.install(&mut self.store, size - rounded - OVERHEAD, BlockState::Free, next);
            block.set_next(&mut self.store, Some(rest));
            size = rounded;
        }
        self.free.remove(&mut self.store, block, prev);

        block.install(&mut self.store, size, BlockState::Allocated, None);
        block.set_requested(&mut self.store, size, requested);
        let payload = block.payload_offset();
        self.store.fill(payload..payload + requested, 0);
        self.store.fill(payload + requested..payload + size, SLACK_BYTE);
        Ok(block.payload_ptr())
    }

    /// Acquire the store on first use and carve it into one free block.
    pub(crate) fn ensure_store(&mut self) -> bool {
        if self.store.is_active() {
            return true;
        }
        if !self.store.acquire() {
            tracing::error!(capacity = self.capacity(), "backing store acquisition failed");
            return false;
        }
        let whole = Block::at(0);
        let span = self.capacity() - OVERHEAD;
        whole.install(&mut self.store, span, BlockState::Free, None);
        self.free.reset_to(whole);
        true
    }
}

pub(crate) fn granted(result: Result<PayloadPtr, NullReason>) -> Outcome {
    match result {
        Ok(ptr) => Outcome::Granted { ptr },
        Err(reason) => Outcome::Null(reason),
    }
}
