//! C ABI for the guardheap hardened allocator.
//!
//! Exposes `guardheap_malloc`, `guardheap_free`, `guardheap_calloc`, and
//! `guardheap_realloc` over one process-wide [`Heap`](guardheap_arena::Heap)
//! behind a `Mutex`, plus configuration, statistics, and audit entry
//! points. The header is generated into `include/guardheap.h` at build
//! time. This crate is one of two that may contain `unsafe` code (along
//! with `guardheap-arena`).
//!
//! Every entry point catches panics at the boundary; an allocating call
//! that panics returns null, a status-returning call returns
//! [`GuardheapStatus::Panicked`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run `$body` with panics caught, yielding `$default` on panic.
macro_rules! ffi_guard_or {
    ($default:expr, $body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => $default,
        }
    };
}

/// Run a status-returning `$body` with panics caught.
macro_rules! ffi_guard {
    ($body:block) => {
        ffi_guard_or!($crate::status::GuardheapStatus::Panicked as i32, $body)
    };
}

/// Lock a mutex or return early, with `InternalError` by default.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        ffi_lock!($mutex, $crate::status::GuardheapStatus::InternalError as i32)
    };
    ($mutex:expr, $on_poison:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $on_poison,
        }
    };
}

pub mod heap;
pub mod stats;
pub mod status;

pub use stats::GuardheapStats;
pub use status::{GuardheapReleasePolicy, GuardheapStatus};

/// Serialises tests that share the process-wide heap.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
