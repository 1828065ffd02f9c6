//! Structured per-operation events.
//!
//! The engine emits exactly one [`HeapEvent`] per public operation,
//! preceded by one [`Outcome::Rejected`] event for each damaged free block
//! it had to cut from the free list while serving that operation. Events
//! are observational: whether a sink is attached never changes what the
//! engine does.

use std::fmt;

use crate::error::{FreeAnomaly, NullReason};
use crate::handle::PayloadPtr;

/// The public operation that produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `malloc`-style allocation.
    Allocate,
    /// `free`-style deallocation.
    Deallocate,
    /// `calloc`-style zeroed array allocation.
    ZeroAllocate,
    /// `realloc`-style resize.
    Reallocate,
}

impl Operation {
    /// Stable lowercase name, used as the `op` field by log sinks.
    pub fn name(self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Deallocate => "deallocate",
            Self::ZeroAllocate => "zero_allocate",
            Self::Reallocate => "reallocate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an operation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Memory was handed out.
    Granted {
        /// The new allocation.
        ptr: PayloadPtr,
    },
    /// A live allocation was resized.
    Resized {
        /// The allocation after the resize.
        ptr: PayloadPtr,
        /// `true` if the data was copied to a new block.
        moved: bool,
    },
    /// A live allocation was returned to the free list.
    Released,
    /// Deallocation of a null handle; nothing to do.
    Ignored,
    /// The allocation path returned null.
    Null(NullReason),
    /// Deallocation was refused and absorbed.
    Rejected(FreeAnomaly),
}

impl Outcome {
    /// Whether this outcome reports a caller or heap defect rather than
    /// an ordinary success or capacity miss.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::Null(NullReason::InvalidHandle(_))
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted { ptr } => write!(f, "granted {ptr}"),
            Self::Resized { ptr, moved: true } => write!(f, "moved to {ptr}"),
            Self::Resized { ptr, moved: false } => write!(f, "resized in place at {ptr}"),
            Self::Released => write!(f, "released"),
            Self::Ignored => write!(f, "ignored null"),
            Self::Null(reason) => write!(f, "null: {reason}"),
            Self::Rejected(anomaly) => write!(f, "rejected: {anomaly}"),
        }
    }
}

/// One structured record of a public heap operation, or of damage found
/// while running one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapEvent {
    /// Which operation ran.
    pub operation: Operation,
    /// Bytes requested by the caller. For zero-allocate this is the
    /// product of count and element size (`usize::MAX` on overflow).
    /// For deallocate it is the requested size of the released
    /// allocation, or zero when nothing was released. Damage reports
    /// carry zero.
    pub requested: usize,
    /// What happened.
    pub outcome: Outcome,
}

impl HeapEvent {
    /// Construct an event.
    pub fn new(operation: Operation, requested: usize, outcome: Outcome) -> Self {
        Self {
            operation,
            requested,
            outcome,
        }
    }
}

impl fmt::Display for HeapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.operation, self.requested, self.outcome
        )
    }
}
