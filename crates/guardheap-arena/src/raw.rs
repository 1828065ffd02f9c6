//! Low-level primitives for arena memory.
//!
//! The only module in this crate allowed to use `unsafe`. It owns the
//! acquisition and release of the backing store's memory: a single
//! zero-initialised, 16-byte aligned region obtained from the global
//! allocator and returned to it in `Drop`, so release happens on every
//! exit path.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of the backing store. Every block boundary is a multiple of
/// this relative to the base, so every payload is aligned to it as well.
pub(crate) const STORE_ALIGN: usize = 16;

/// An owned, aligned, zero-initialised byte region.
pub(crate) struct AlignedStore {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedStore {
    /// Acquire `len` zeroed bytes. Returns `None` if `len` is zero, the
    /// layout is invalid, or the global allocator is out of memory.
    pub(crate) fn acquire(len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let layout = Layout::from_size_align(len, STORE_ALIGN).ok()?;
        // SAFETY: `layout` has non-zero size (checked above).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;
        Some(Self { ptr, layout })
    }

    /// Length of the region in bytes.
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Base address of the region.
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialised bytes for as long as
        // `self` lives, and the returned borrow is tied to `&self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` guarantees the borrow is unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }
}

impl Drop for AlignedStore {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with exactly this
        // layout and has not been freed.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the region is exclusively owned; no other handle aliases it
// from the Rust side.
unsafe impl Send for AlignedStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_region_is_zeroed_and_aligned() {
        let store = AlignedStore::acquire(256).unwrap();
        assert_eq!(store.len(), 256);
        assert_eq!(store.base().as_ptr() as usize % STORE_ALIGN, 0);
        assert!(store.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_length_is_refused() {
        assert!(AlignedStore::acquire(0).is_none());
    }

    #[test]
    fn writes_are_visible_through_shared_view() {
        let mut store = AlignedStore::acquire(64).unwrap();
        store.as_mut_slice()[63] = 0xAB;
        assert_eq!(store.as_slice()[63], 0xAB);
    }
}
