//! Heap construction errors.
//!
//! Runtime anomalies are never raised; see
//! [`FreeAnomaly`](guardheap_core::FreeAnomaly) and
//! [`NullReason`](guardheap_core::NullReason) for the reported taxonomy.

use std::error::Error;
use std::fmt;

/// Errors detected by [`HeapConfig::validate`](crate::HeapConfig::validate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Capacity cannot hold a single minimal block.
    CapacityTooSmall {
        /// The configured capacity.
        capacity: usize,
        /// Smallest usable capacity.
        minimum: usize,
    },
    /// Capacity exceeds the supported maximum.
    CapacityTooLarge {
        /// The configured capacity.
        capacity: usize,
        /// Largest accepted capacity.
        maximum: usize,
    },
    /// Capacity is not a whole number of granules.
    UnalignedCapacity {
        /// The configured capacity.
        capacity: usize,
        /// Required multiple.
        granule: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityTooSmall { capacity, minimum } => {
                write!(
                    f,
                    "heap capacity {capacity} bytes is below the minimum of {minimum} bytes"
                )
            }
            Self::CapacityTooLarge { capacity, maximum } => {
                write!(
                    f,
                    "heap capacity {capacity} bytes exceeds the maximum of {maximum} bytes"
                )
            }
            Self::UnalignedCapacity { capacity, granule } => {
                write!(
                    f,
                    "heap capacity {capacity} bytes is not a multiple of {granule}"
                )
            }
        }
    }
}

impl Error for ConfigError {}
