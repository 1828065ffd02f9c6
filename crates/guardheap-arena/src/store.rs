//! The backing store and its lifecycle.
//!
//! A [`BackingStore`] is a fixed-capacity byte region acquired lazily on
//! first use. It owns no allocation logic; the engine interprets its bytes
//! through the block layout in [`block`](crate::block).

use std::ops::Range;
use std::ptr::NonNull;

use crate::raw::AlignedStore;

/// Lifecycle of the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// No memory held. Initial state, and the state after a release.
    Uninitialized,
    /// Memory acquired and carved into blocks.
    Active,
}

/// Fixed-capacity byte region with lazy acquisition.
pub(crate) struct BackingStore {
    capacity: usize,
    region: Option<AlignedStore>,
    acquisitions: u64,
    releases: u64,
}

impl BackingStore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            region: None,
            acquisitions: 0,
            releases: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn state(&self) -> StoreState {
        if self.region.is_some() {
            StoreState::Active
        } else {
            StoreState::Uninitialized
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.region.is_some()
    }

    /// Acquire the region if not already held. Returns `false` only when
    /// the global allocator refused.
    pub(crate) fn acquire(&mut self) -> bool {
        if self.region.is_some() {
            return true;
        }
        match AlignedStore::acquire(self.capacity) {
            Some(region) => {
                self.region = Some(region);
                self.acquisitions += 1;
                true
            }
            None => false,
        }
    }

    /// Return the region to the global allocator.
    pub(crate) fn release(&mut self) {
        if self.region.take().is_some() {
            self.releases += 1;
        }
    }

    pub(crate) fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub(crate) fn releases(&self) -> u64 {
        self.releases
    }

    pub(crate) fn base(&self) -> Option<NonNull<u8>> {
        self.region.as_ref().map(AlignedStore::base)
    }

    /// The whole region, or an empty slice while uninitialised.
    pub(crate) fn bytes(&self) -> &[u8] {
        match self.region.as_ref() {
            Some(region) => region.as_slice(),
            None => &[],
        }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        match self.region.as_mut() {
            Some(region) => region.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Whether `range` lies entirely inside the active region.
    pub(crate) fn contains(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.end <= self.bytes().len()
    }

    /// Read a little-endian word, or `None` if it is not fully in bounds.
    pub(crate) fn read_word(&self, offset: usize) -> Option<u64> {
        let end = offset.checked_add(8)?;
        let bytes: [u8; 8] = self.bytes().get(offset..end)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    /// Read a word the engine itself placed. Out-of-bounds reads yield 0,
    /// which no header field treats as valid.
    pub(crate) fn word(&self, offset: usize) -> u64 {
        self.read_word(offset).unwrap_or(0)
    }

    pub(crate) fn write_word(&mut self, offset: usize, value: u64) {
        let Some(end) = offset.checked_add(8) else {
            return;
        };
        if let Some(slot) = self.bytes_mut().get_mut(offset..end) {
            slot.copy_from_slice(&value.to_le_bytes());
        } else {
            debug_assert!(false, "word write at {offset:#x} out of bounds");
        }
    }

    pub(crate) fn fill(&mut self, range: Range<usize>, byte: u8) {
        if let Some(slot) = self.bytes_mut().get_mut(range) {
            slot.fill(byte);
        }
    }

    /// Whether every byte of `range` equals `byte`. Out-of-bounds is `false`.
    pub(crate) fn all_equal(&self, range: Range<usize>, byte: u8) -> bool {
        self.bytes()
            .get(range)
            .is_some_and(|slot| slot.iter().all(|&b| b == byte))
    }

    pub(crate) fn copy_within(&mut self, src: Range<usize>, dest: usize) {
        let len = src.end.saturating_sub(src.start);
        if self.contains(&src) && dest.checked_add(len).is_some_and(|end| end <= self.capacity) {
            self.bytes_mut().copy_within(src, dest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_acquisition() {
        let mut store = BackingStore::new(128);
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert!(store.bytes().is_empty());
        assert!(store.acquire());
        assert_eq!(store.state(), StoreState::Active);
        assert_eq!(store.bytes().len(), 128);
        // Second acquire is a no-op.
        assert!(store.acquire());
        assert_eq!(store.acquisitions(), 1);
    }

    #[test]
    fn release_returns_to_uninitialized() {
        let mut store = BackingStore::new(64);
        store.acquire();
        store.release();
        store.release();
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert_eq!(store.releases(), 1);
        assert!(store.base().is_none());
    }

    #[test]
    fn word_round_trip() {
        let mut store = BackingStore::new(64);
        store.acquire();
        store.write_word(8, 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(store.read_word(8), Some(0xDEAD_BEEF_CAFE_F00D));
        assert_eq!(store.word(8), 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn out_of_bounds_reads_are_refused() {
        let mut store = BackingStore::new(64);
        assert_eq!(store.read_word(0), None);
        store.acquire();
        assert_eq!(store.read_word(57), None);
        assert_eq!(store.read_word(usize::MAX - 3), None);
        assert_eq!(store.word(60), 0);
        assert!(!store.all_equal(60..72, 0));
    }

    #[test]
    fn fill_and_copy() {
        let mut store = BackingStore::new(64);
        store.acquire();
        store.fill(0..4, 7);
        store.copy_within(0..4, 16);
        assert!(store.all_equal(16..20, 7));
        assert!(store.all_equal(20..24, 0));
    }
}
