//! Payload handles.
//!
//! A [`PayloadPtr`] is the caller-visible name of an allocation: the byte
//! offset of its first payload byte within the backing store. It is an
//! opaque index, not an address, so recovering the owning block is plain
//! index arithmetic that the engine validates against the store bounds
//! before it reads anything.

use std::fmt;

/// Opaque handle to the payload of an allocation.
///
/// Handles are plain offsets and can be forged with
/// [`from_offset`](PayloadPtr::from_offset); the engine treats every
/// incoming handle as untrusted and rejects wild ones without touching
/// the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct PayloadPtr(usize);

impl PayloadPtr {
    /// Build a handle from a raw store offset.
    ///
    /// Used by the engine when granting memory and by the C ABI when
    /// translating a foreign pointer back into an offset.
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    /// Byte offset of the first payload byte within the backing store.
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Handle displaced by `delta` bytes, or `None` on overflow.
    ///
    /// Mostly useful for fault-injection tests that free interior or
    /// misaligned pointers.
    pub fn checked_add(self, delta: usize) -> Option<Self> {
        self.0.checked_add(delta).map(Self)
    }

    /// Handle displaced backwards by `delta` bytes, or `None` on underflow.
    pub fn checked_sub(self, delta: usize) -> Option<Self> {
        self.0.checked_sub(delta).map(Self)
    }
}

impl fmt::Display for PayloadPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_round_trip() {
        let p = PayloadPtr::from_offset(48);
        assert_eq!(p.offset(), 48);
    }

    #[test]
    fn displacement_is_checked() {
        let p = PayloadPtr::from_offset(16);
        assert_eq!(p.checked_sub(16), Some(PayloadPtr::from_offset(0)));
        assert_eq!(p.checked_sub(17), None);
        assert_eq!(PayloadPtr::from_offset(usize::MAX).checked_add(1), None);
    }

    #[test]
    fn display_is_hex_offset() {
        assert_eq!(PayloadPtr::from_offset(255).to_string(), "+0xff");
    }
}
