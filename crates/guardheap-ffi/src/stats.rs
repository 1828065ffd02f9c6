//! C-compatible heap statistics.

use guardheap_arena::HeapStats;

use crate::heap::global;
use crate::status::GuardheapStatus;

/// C-compatible snapshot of [`HeapStats`].
///
/// All fields are fixed-width `u64` for ABI portability.
#[repr(C)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardheapStats {
    /// Total arena capacity in bytes.
    pub capacity: u64,
    /// 1 if the arena is currently held, else 0.
    pub store_active: u64,
    /// Allocations currently live.
    pub live_allocations: u64,
    /// Sum of requested sizes over live allocations.
    pub live_requested_bytes: u64,
    /// Sum of free payload bytes.
    pub free_bytes: u64,
    /// Number of free blocks.
    pub free_blocks: u64,
    /// Largest single free payload.
    pub largest_free: u64,
    /// Blocks quarantined for corruption.
    pub quarantined: u64,
    /// Cumulative `guardheap_malloc` calls.
    pub malloc_calls: u64,
    /// Cumulative `guardheap_free` calls.
    pub free_calls: u64,
    /// Cumulative `guardheap_calloc` calls.
    pub calloc_calls: u64,
    /// Cumulative `guardheap_realloc` calls.
    pub realloc_calls: u64,
    /// Cumulative calls that returned null.
    pub null_returns: u64,
    /// Cumulative rejected pointers (double frees, wild pointers, corruption).
    pub anomalies: u64,
    /// Number of times the arena was acquired.
    pub store_acquisitions: u64,
}

// 15×u64 = 120 bytes, align 8.
const _: () = assert!(std::mem::size_of::<GuardheapStats>() == 120);
const _: () = assert!(std::mem::align_of::<GuardheapStats>() == 8);

impl GuardheapStats {
    pub(crate) fn from_rust(s: &HeapStats) -> Self {
        Self {
            capacity: s.capacity as u64,
            store_active: u64::from(s.store_active),
            live_allocations: s.live_allocations as u64,
            live_requested_bytes: s.live_requested_bytes as u64,
            free_bytes: s.free_bytes as u64,
            free_blocks: s.free_blocks as u64,
            largest_free: s.largest_free as u64,
            quarantined: s.quarantined as u64,
            malloc_calls: s.allocate_calls,
            free_calls: s.deallocate_calls,
            calloc_calls: s.zero_allocate_calls,
            realloc_calls: s.reallocate_calls,
            null_returns: s.null_returns,
            anomalies: s.anomalies,
            store_acquisitions: s.store_acquisitions,
        }
    }
}

/// Write a statistics snapshot of the process-wide heap into `out`.
///
/// Before the first allocation every field is zero.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_stats(out: *mut GuardheapStats) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return GuardheapStatus::InvalidArgument as i32;
        }
        let global = ffi_lock!(global());
        let stats = global
            .existing()
            .map(|heap| GuardheapStats::from_rust(&heap.stats()))
            .unwrap_or_default();
        // SAFETY: out is non-null and valid for writes per caller contract.
        unsafe { out.write(stats) };
        GuardheapStatus::Ok as i32
    })
}
