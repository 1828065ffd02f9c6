//! Block header model.
//!
//! Every block, free or allocated, has the same layout:
//!
//! ```text
//!  offset  0        8        16       24       32                 32+size   +8       +16
//!          ┌────────┬────────┬────────┬────────┬──────────────────┬────────┬────────┐
//!          │  size  │  next  │  tag   │ canary │  payload (size)  │ canary │  req   │
//!          └────────┴────────┴────────┴────────┴──────────────────┴────────┴────────┘
//!          └──────────── header (32) ──────────┘                  └─ trailer (16) ─┘
//! ```
//!
//! All words are little-endian `u64`. `size` is the usable payload length,
//! always a multiple of [`GRANULE`]. `next` links free blocks (all ones
//! when unused). `tag` is the explicit [`BlockState`]. `req` is the byte
//! count the caller asked for; the bytes between `req` and `size` hold
//! [`SLACK_BYTE`] while the block is allocated.

use std::ops::Range;

use guardheap_core::{CanarySite, PayloadPtr};

use crate::store::BackingStore;

/// Allocation granule. Payload sizes and block boundaries are multiples.
pub const GRANULE: usize = 16;

/// Bytes of metadata before the payload.
pub const HEADER_SIZE: usize = 32;

/// Bytes of metadata after the payload.
pub const TRAILER_SIZE: usize = 16;

/// Per-block overhead not available to callers.
pub const OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Smallest possible block: overhead plus one granule of payload.
pub const MIN_BLOCK_SPAN: usize = OVERHEAD + GRANULE;

/// Guard value on both sides of every payload: `0xDEADBEEF` sign-extended.
pub const CANARY: u64 = 0xDEAD_BEEF_u32 as i32 as i64 as u64;

/// Fill pattern for allocated-but-unrequested payload bytes.
pub const SLACK_BYTE: u8 = 0xA5;

const SIZE_AT: usize = 0;
const NEXT_AT: usize = 8;
const TAG_AT: usize = 16;
const LEADING_AT: usize = 24;
const TRAILING_AT: usize = 0;
const REQUESTED_AT: usize = 8;

const NIL: u64 = u64::MAX;

/// Round `n` up to the granule, or `None` on overflow.
pub fn align_up(n: usize) -> Option<usize> {
    Some(n.checked_add(GRANULE - 1)? & !(GRANULE - 1))
}

/// Explicit per-block state, stored as a tag word in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Linked into the free list.
    Free,
    /// Handed out to a caller.
    Allocated,
    /// Rejected for corruption; never reused.
    Poisoned,
}

impl BlockState {
    const FREE_TAG: u64 = u64::from_be_bytes(*b"FREEFREE");
    const ALLOCATED_TAG: u64 = u64::from_be_bytes(*b"ALLOCATE");
    const POISONED_TAG: u64 = u64::from_be_bytes(*b"POISONED");

    fn tag(self) -> u64 {
        match self {
            Self::Free => Self::FREE_TAG,
            Self::Allocated => Self::ALLOCATED_TAG,
            Self::Poisoned => Self::POISONED_TAG,
        }
    }

    fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            Self::FREE_TAG => Some(Self::Free),
            Self::ALLOCATED_TAG => Some(Self::Allocated),
            Self::POISONED_TAG => Some(Self::Poisoned),
            _ => None,
        }
    }
}

/// A block, named by the store offset of its header.
///
/// A `Block` is only an index. Accessors read and write the store; callers
/// are responsible for having validated the offset first when it came
/// from outside the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
    pub(crate) fn at(offset: usize) -> Self {
        Self(offset)
    }

    /// The block owning `ptr`, if the subtraction does not underflow.
    pub(crate) fn owning(ptr: PayloadPtr) -> Option<Self> {
        ptr.offset().checked_sub(HEADER_SIZE).map(Self)
    }

    pub(crate) fn offset(self) -> usize {
        self.0
    }

    pub(crate) fn payload_offset(self) -> usize {
        self.field(HEADER_SIZE)
    }

    /// Store offset of a header word. Saturates, so a block named by a
    /// garbage link reads as out of bounds instead of wrapping.
    fn field(self, at: usize) -> usize {
        self.0.saturating_add(at)
    }

    pub(crate) fn payload_ptr(self) -> PayloadPtr {
        PayloadPtr::from_offset(self.payload_offset())
    }

    pub(crate) fn size(self, store: &BackingStore) -> usize {
        usize::try_from(store.word(self.field(SIZE_AT))).unwrap_or(0)
    }

    pub(crate) fn set_size(self, store: &mut BackingStore, size: usize) {
        store.write_word(self.field(SIZE_AT), size as u64);
    }

    /// First byte past this block's trailer, or `None` if the size word
    /// cannot describe a real block.
    pub(crate) fn end(self, store: &BackingStore) -> Option<usize> {
        self.0.checked_add(OVERHEAD)?.checked_add(self.size(store))
    }

    pub(crate) fn next(self, store: &BackingStore) -> Option<Block> {
        match store.word(self.field(NEXT_AT)) {
            NIL => None,
            raw => usize::try_from(raw).ok().map(Block),
        }
    }

    pub(crate) fn set_next(self, store: &mut BackingStore, next: Option<Block>) {
        let raw = next.map_or(NIL, |b| b.0 as u64);
        store.write_word(self.field(NEXT_AT), raw);
    }

    pub(crate) fn state(self, store: &BackingStore) -> Option<BlockState> {
        store
            .read_word(self.field(TAG_AT))
            .and_then(BlockState::from_tag)
    }

    pub(crate) fn set_state(self, store: &mut BackingStore, state: BlockState) {
        store.write_word(self.field(TAG_AT), state.tag());
    }

    /// Offset of the trailer for a block of `size`, or `None` on overflow.
    fn trailer_offset(self, size: usize) -> Option<usize> {
        self.0.checked_add(HEADER_SIZE)?.checked_add(size)
    }

    fn trailer_word(self, size: usize, at: usize) -> Option<usize> {
        self.trailer_offset(size)?.checked_add(at)
    }

    pub(crate) fn requested(self, store: &BackingStore, size: usize) -> usize {
        self.trailer_word(size, REQUESTED_AT)
            .and_then(|offset| store.read_word(offset))
            .and_then(|raw| usize::try_from(raw).ok())
            .unwrap_or(0)
    }

    pub(crate) fn set_requested(self, store: &mut BackingStore, size: usize, requested: usize) {
        if let Some(offset) = self.trailer_word(size, REQUESTED_AT) {
            store.write_word(offset, requested as u64);
        }
    }

    /// Byte range of the payload for a block of `size`.
    pub(crate) fn payload_range(self, size: usize) -> Range<usize> {
        self.payload_offset()..self.payload_offset() + size
    }

    /// Write a complete header and trailer: size, link, tag, both canaries,
    /// and a zero requested length.
    pub(crate) fn install(
        self,
        store: &mut BackingStore,
        size: usize,
        state: BlockState,
        next: Option<Block>,
    ) {
        self.set_size(store, size);
        self.set_next(store, next);
        self.set_state(store, state);
        store.write_word(self.field(LEADING_AT), CANARY);
        if let Some(trailing) = self.trailer_word(size, TRAILING_AT) {
            store.write_word(trailing, CANARY);
        }
        self.set_requested(store, size, 0);
    }

    /// Whether a block of this `size` fits inside the store.
    pub(crate) fn fits(self, store: &BackingStore, size: usize) -> bool {
        size != 0
            && size % GRANULE == 0
            && self
                .0
                .checked_add(OVERHEAD)
                .and_then(|s| s.checked_add(size))
                .is_some_and(|end| end <= store.capacity())
    }

    /// Validate the canaries around a block whose size is already known to
    /// fit. Does not inspect slack bytes.
    pub(crate) fn check_canaries(self, store: &BackingStore, size: usize) -> Result<(), CanarySite> {
        if store.read_word(self.field(LEADING_AT)) != Some(CANARY) {
            return Err(CanarySite::Leading);
        }
        let trailing = self
            .trailer_word(size, TRAILING_AT)
            .and_then(|offset| store.read_word(offset));
        if trailing != Some(CANARY) {
            return Err(CanarySite::Trailing);
        }
        Ok(())
    }

    /// Validate the requested length and the slack pattern of an allocated
    /// block.
    pub(crate) fn check_slack(self, store: &BackingStore, size: usize) -> Result<usize, CanarySite> {
        let requested = self.requested(store, size);
        if requested == 0 || requested > size {
            return Err(CanarySite::Trailing);
        }
        let payload = self.payload_offset();
        if !store.all_equal(payload + requested..payload + size, SLACK_BYTE) {
            return Err(CanarySite::Slack);
        }
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_store(capacity: usize) -> BackingStore {
        let mut store = BackingStore::new(capacity);
        assert!(store.acquire());
        store
    }

    #[test]
    fn canary_is_sign_extended() {
        assert_eq!(CANARY, 0xFFFF_FFFF_DEAD_BEEF);
    }

    #[test]
    fn layout_is_granule_aligned() {
        assert_eq!(HEADER_SIZE % GRANULE, 0);
        assert_eq!(TRAILER_SIZE % GRANULE, 0);
        assert_eq!(OVERHEAD, 48);
    }

    #[test]
    fn align_up_rounds_to_granule() {
        assert_eq!(align_up(1), Some(16));
        assert_eq!(align_up(16), Some(16));
        assert_eq!(align_up(17), Some(32));
        assert_eq!(align_up(usize::MAX), None);
    }

    #[test]
    fn install_writes_readable_header() {
        let mut store = active_store(256);
        let block = Block::at(0);
        block.install(&mut store, 64, BlockState::Free, Some(Block::at(112)));
        assert_eq!(block.size(&store), 64);
        assert_eq!(block.next(&store), Some(Block::at(112)));
        assert_eq!(block.state(&store), Some(BlockState::Free));
        assert_eq!(block.end(&store), Some(112));
        assert!(block.check_canaries(&store, 64).is_ok());
    }

    #[test]
    fn nil_link_reads_as_none() {
        let mut store = active_store(128);
        let block = Block::at(0);
        block.install(&mut store, 64, BlockState::Allocated, None);
        assert_eq!(block.next(&store), None);
    }

    #[test]
    fn unknown_tag_has_no_state() {
        let store = active_store(128);
        // Fresh store is all zero.
        assert_eq!(Block::at(0).state(&store), None);
    }

    #[test]
    fn damaged_canaries_are_located() {
        let mut store = active_store(128);
        let block = Block::at(0);
        block.install(&mut store, 32, BlockState::Allocated, None);
        store.fill(block.payload_offset() + 32..block.payload_offset() + 33, 0);
        assert_eq!(block.check_canaries(&store, 32), Err(CanarySite::Trailing));
        store.fill(block.payload_offset() - 1..block.payload_offset(), 0);
        assert_eq!(block.check_canaries(&store, 32), Err(CanarySite::Leading));
    }

    #[test]
    fn slack_check_detects_overflow() {
        let mut store = active_store(128);
        let block = Block::at(0);
        block.install(&mut store, 32, BlockState::Allocated, None);
        block.set_requested(&mut store, 32, 20);
        let payload = block.payload_offset();
        store.fill(payload + 20..payload + 32, SLACK_BYTE);
        assert_eq!(block.check_slack(&store, 32), Ok(20));
        store.fill(payload + 20..payload + 21, 0x41);
        assert_eq!(block.check_slack(&store, 32), Err(CanarySite::Slack));
    }

    #[test]
    fn fits_rejects_oversized_and_unaligned() {
        let store = active_store(128);
        let block = Block::at(0);
        assert!(block.fits(&store, 80));
        assert!(!block.fits(&store, 96));
        assert!(!block.fits(&store, 40));
        assert!(!block.fits(&store, 0));
        assert!(!Block::at(usize::MAX - 8).fits(&store, 16));
    }

    #[test]
    fn forged_size_never_wraps() {
        let mut store = active_store(128);
        let block = Block::at(0);
        block.install(&mut store, 32, BlockState::Free, None);
        block.set_size(&mut store, usize::MAX - 8);
        assert_eq!(block.end(&store), None);
        assert_eq!(block.requested(&store, usize::MAX - 8), 0);
        assert_eq!(
            block.check_canaries(&store, usize::MAX - 8),
            Err(CanarySite::Trailing)
        );
        // Writes that would land past the store are dropped.
        block.set_requested(&mut store, usize::MAX - 8, 5);
        let far = Block::at(usize::MAX - 4);
        assert_eq!(far.state(&store), None);
        assert_eq!(far.size(&store), 0);
    }
}
