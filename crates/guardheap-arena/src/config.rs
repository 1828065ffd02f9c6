//! Heap configuration parameters.

use crate::block::{GRANULE, MIN_BLOCK_SPAN};
use crate::error::ConfigError;

/// What happens to the backing store once every block is free again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Keep the store for the lifetime of the heap.
    #[default]
    Retain,
    /// Release the store as soon as the whole arena coalesces back into a
    /// single free block with nothing quarantined; the next allocation
    /// acquires a fresh one.
    WhenEmpty,
}

/// Configuration for a [`Heap`](crate::Heap).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Total size of the backing store in bytes, overhead included.
    ///
    /// Default: 10_000. Must be a multiple of the 16-byte granule and
    /// large enough for one minimal block.
    pub capacity: usize,

    /// Store release behaviour. Default: [`ReleasePolicy::Retain`].
    pub release_policy: ReleasePolicy,
}

impl HeapConfig {
    /// Default arena capacity in bytes.
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Largest accepted arena capacity (1 TiB).
    pub const MAX_CAPACITY: usize = 1 << 40;

    /// Create a config with the given capacity and default policy.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            release_policy: ReleasePolicy::default(),
        }
    }

    /// Replace the release policy.
    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < MIN_BLOCK_SPAN {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.capacity,
                minimum: MIN_BLOCK_SPAN,
            });
        }
        if self.capacity > Self::MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.capacity,
                maximum: Self::MAX_CAPACITY,
            });
        }
        if self.capacity % GRANULE != 0 {
            return Err(ConfigError::UnalignedCapacity {
                capacity: self.capacity,
                granule: GRANULE,
            });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HeapConfig::default();
        assert_eq!(config.capacity, 10_000);
        assert_eq!(config.release_policy, ReleasePolicy::Retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tiny_capacity_rejected() {
        let err = HeapConfig::new(32).validate().unwrap_err();
        assert!(matches!(err, ConfigError::CapacityTooSmall { .. }));
    }

    #[test]
    fn unaligned_capacity_rejected() {
        let err = HeapConfig::new(1001).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnalignedCapacity {
                capacity: 1001,
                granule: 16
            }
        );
    }

    #[test]
    fn huge_capacity_rejected() {
        let err = HeapConfig::new(HeapConfig::MAX_CAPACITY + GRANULE)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CapacityTooLarge { .. }));
    }

    #[test]
    fn minimal_block_capacity_accepted() {
        assert!(HeapConfig::new(MIN_BLOCK_SPAN).validate().is_ok());
    }

    #[test]
    fn builder_sets_policy() {
        let config = HeapConfig::new(4096).with_release_policy(ReleasePolicy::WhenEmpty);
        assert_eq!(config.release_policy, ReleasePolicy::WhenEmpty);
    }
}
