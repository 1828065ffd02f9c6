//! Guard corruption helpers.
//!
//! Each helper damages the store the way a specific caller bug would.
//! They panic if `ptr` is not a live allocation, since a test that
//! corrupts nothing proves nothing.

use guardheap_arena::{Heap, HEADER_SIZE, TRAILER_SIZE};
use guardheap_core::PayloadPtr;

fn live(heap: &Heap, ptr: PayloadPtr) -> (usize, usize) {
    let requested = heap
        .requested_size(ptr)
        .unwrap_or_else(|| panic!("{ptr} is not a live allocation"));
    let usable = heap.usable_size(ptr).unwrap_or(requested);
    (requested, usable)
}

/// Write `len` bytes of `byte` starting right after the requested bytes:
/// a buffer overflow of `len` bytes.
pub fn overflow(heap: &mut Heap, ptr: PayloadPtr, len: usize, byte: u8) {
    let (requested, _) = live(heap, ptr);
    let start = ptr.offset() + requested;
    heap.raw_store_mut()[start..start + len].fill(byte);
}

/// Overflow from the end of the requested bytes through this block's
/// trailer and into the size word of the block that follows it. The
/// neighbour is usually free, so the damage lands on a free-list node.
pub fn overflow_into_next_header(heap: &mut Heap, ptr: PayloadPtr, byte: u8) {
    let (requested, usable) = live(heap, ptr);
    overflow(heap, ptr, usable - requested + TRAILER_SIZE + 8, byte);
}

/// Overwrite the first byte of the trailing canary.
pub fn smash_trailing_canary(heap: &mut Heap, ptr: PayloadPtr) {
    let (_, usable) = live(heap, ptr);
    heap.raw_store_mut()[ptr.offset() + usable] ^= 0xFF;
}

/// Overwrite the last byte of the leading canary: a one-byte underflow.
pub fn smash_leading_canary(heap: &mut Heap, ptr: PayloadPtr) {
    live(heap, ptr);
    heap.raw_store_mut()[ptr.offset() - 1] ^= 0xFF;
}

/// Replace the header size word with `size`.
pub fn forge_size(heap: &mut Heap, ptr: PayloadPtr, size: u64) {
    live(heap, ptr);
    let header = ptr.offset() - HEADER_SIZE;
    heap.raw_store_mut()[header..header + 8].copy_from_slice(&size.to_le_bytes());
}
