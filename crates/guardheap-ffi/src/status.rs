//! C-compatible status codes.

use guardheap_arena::{ConfigError, ReleasePolicy};

/// Status code returned by the non-allocating FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardheapStatus {
    /// Success.
    Ok = 0,
    /// An argument is null, out of range, or otherwise invalid.
    InvalidArgument = -1,
    /// Heap configuration failed validation.
    ConfigError = -2,
    /// The heap already holds memory and cannot be reconfigured.
    Busy = -3,
    /// The consistency audit found damage or leaks.
    Corrupted = -4,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -5,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&ConfigError> for GuardheapStatus {
    fn from(_: &ConfigError) -> Self {
        GuardheapStatus::ConfigError
    }
}

/// C mirror of [`ReleasePolicy`].
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardheapReleasePolicy {
    /// Keep the store until shutdown.
    Retain = 0,
    /// Release the store whenever the heap becomes empty.
    WhenEmpty = 1,
}

impl GuardheapReleasePolicy {
    /// Decode a raw C value; unknown values are `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Retain),
            1 => Some(Self::WhenEmpty),
            _ => None,
        }
    }
}

impl From<GuardheapReleasePolicy> for ReleasePolicy {
    fn from(policy: GuardheapReleasePolicy) -> Self {
        match policy {
            GuardheapReleasePolicy::Retain => ReleasePolicy::Retain,
            GuardheapReleasePolicy::WhenEmpty => ReleasePolicy::WhenEmpty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(GuardheapStatus::Ok as i32, 0);
        assert_eq!(GuardheapStatus::Busy as i32, -3);
        assert_eq!(GuardheapStatus::Panicked as i32, -128);
    }

    #[test]
    fn release_policy_decoding() {
        assert_eq!(
            GuardheapReleasePolicy::from_raw(1),
            Some(GuardheapReleasePolicy::WhenEmpty)
        );
        assert_eq!(GuardheapReleasePolicy::from_raw(7), None);
        assert_eq!(
            ReleasePolicy::from(GuardheapReleasePolicy::Retain),
            ReleasePolicy::Retain
        );
    }
}
