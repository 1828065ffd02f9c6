//! Reported failure taxonomy.
//!
//! Nothing in the allocator raises an error to its caller: allocation
//! failures surface as a null return and deallocation anomalies as a
//! no-op. These enums describe *why*, and travel inside
//! [`Outcome`](crate::Outcome) to whichever [`EventSink`](crate::EventSink)
//! is attached.

use std::error::Error;
use std::fmt;

/// Why an allocation-path operation returned null.
///
/// At the API boundary all variants look the same; callers that need to
/// distinguish them should check their inputs before calling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NullReason {
    /// A zero byte count (or zero element count/size) was requested.
    ZeroSize,
    /// `count * elem_size` overflowed `usize`.
    Overflow,
    /// The request plus block overhead can never fit in the arena.
    TooLarge {
        /// Number of bytes requested.
        requested: usize,
        /// Total arena capacity in bytes.
        capacity: usize,
    },
    /// No free block is large enough right now.
    Exhausted {
        /// Number of bytes requested.
        requested: usize,
    },
    /// A resize was asked of a handle that failed validation.
    InvalidHandle(FreeAnomaly),
}

impl fmt::Display for NullReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "zero-sized request"),
            Self::Overflow => write!(f, "element count times size overflows"),
            Self::TooLarge {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "request too large: {requested} bytes exceeds arena capacity {capacity} bytes"
                )
            }
            Self::Exhausted { requested } => {
                write!(f, "no free block fits {requested} bytes")
            }
            Self::InvalidHandle(anomaly) => write!(f, "invalid handle: {anomaly}"),
        }
    }
}

impl Error for NullReason {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidHandle(anomaly) => Some(anomaly),
            _ => None,
        }
    }
}

/// Which guard structure failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanarySite {
    /// The state tag in the block header is not a known value.
    Header,
    /// The sentinel immediately before the payload.
    Leading,
    /// The recorded payload size runs past the end of the arena.
    Size,
    /// The sentinel immediately after the payload.
    Trailing,
    /// Guard bytes between the requested length and the block's capacity.
    Slack,
}

impl fmt::Display for CanarySite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header tag",
            Self::Leading => "leading canary",
            Self::Size => "size field",
            Self::Trailing => "trailing canary",
            Self::Slack => "slack guard bytes",
        };
        f.write_str(name)
    }
}

/// A deallocation anomaly. Every variant is absorbed as a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FreeAnomaly {
    /// The recovered header lies outside the arena, or no arena is active.
    OutOfBounds {
        /// The offending payload offset.
        offset: usize,
    },
    /// The recovered header is not on a block boundary.
    Misaligned {
        /// The offending payload offset.
        offset: usize,
    },
    /// The block is already free.
    DoubleFree {
        /// The offending payload offset.
        offset: usize,
    },
    /// The block was previously rejected for corruption and quarantined.
    Quarantined {
        /// The offending payload offset.
        offset: usize,
    },
    /// A guard value around the block was overwritten.
    Corruption {
        /// The offending payload offset.
        offset: usize,
        /// The first guard found damaged.
        site: CanarySite,
    },
}

impl FreeAnomaly {
    /// The payload offset the anomaly was reported against.
    pub fn offset(&self) -> usize {
        match *self {
            Self::OutOfBounds { offset }
            | Self::Misaligned { offset }
            | Self::DoubleFree { offset }
            | Self::Quarantined { offset }
            | Self::Corruption { offset, .. } => offset,
        }
    }

    /// Whether this anomaly indicates overwritten guard memory.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

impl fmt::Display for FreeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset } => write!(f, "out-of-bounds free at +{offset:#x}"),
            Self::Misaligned { offset } => write!(f, "misaligned free at +{offset:#x}"),
            Self::DoubleFree { offset } => write!(f, "double free at +{offset:#x}"),
            Self::Quarantined { offset } => {
                write!(f, "free of quarantined block at +{offset:#x}")
            }
            Self::Corruption { offset, site } => {
                write!(f, "corruption detected at +{offset:#x}: {site} damaged")
            }
        }
    }
}

impl Error for FreeAnomaly {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_offset_is_uniform() {
        let anomalies = [
            FreeAnomaly::OutOfBounds { offset: 7 },
            FreeAnomaly::Misaligned { offset: 7 },
            FreeAnomaly::DoubleFree { offset: 7 },
            FreeAnomaly::Quarantined { offset: 7 },
            FreeAnomaly::Corruption {
                offset: 7,
                site: CanarySite::Trailing,
            },
        ];
        assert!(anomalies.iter().all(|a| a.offset() == 7));
        assert_eq!(anomalies.iter().filter(|a| a.is_corruption()).count(), 1);
    }

    #[test]
    fn invalid_handle_exposes_source() {
        let reason = NullReason::InvalidHandle(FreeAnomaly::DoubleFree { offset: 32 });
        assert!(reason.source().is_some());
        assert!(NullReason::ZeroSize.source().is_none());
    }

    #[test]
    fn corruption_message_names_site() {
        let a = FreeAnomaly::Corruption {
            offset: 0x30,
            site: CanarySite::Trailing,
        };
        assert_eq!(
            a.to_string(),
            "corruption detected at +0x30: trailing canary damaged"
        );
    }
}
