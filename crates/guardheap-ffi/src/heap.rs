//! The process-wide heap and the malloc-family entry points.
//!
//! All calls serialise on one `Mutex`. The heap is created on first use
//! with the configuration set by [`guardheap_configure`] (or the default)
//! and a [`TracingSink`] attached, so anomalies reach whatever `tracing`
//! subscriber the host installs.
//!
//! Pointers are translated to [`PayloadPtr`] offsets relative to the
//! store base before the engine sees them; a pointer outside the store
//! becomes an out-of-bounds offset and is rejected like any wild handle.

use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

use guardheap_arena::{Heap, HeapConfig, TracingSink};
use guardheap_core::PayloadPtr;

use crate::status::{GuardheapReleasePolicy, GuardheapStatus};

pub(crate) struct GlobalHeap {
    config: Option<HeapConfig>,
    heap: Option<Heap>,
}

impl GlobalHeap {
    /// The heap, created on first use.
    pub(crate) fn get(&mut self) -> &mut Heap {
        let config = self.config.clone().unwrap_or_default();
        self.heap.get_or_insert_with(|| {
            // Configs are validated when stored, so this cannot fail.
            Heap::new(config).unwrap_or_default().with_sink(TracingSink)
        })
    }

    pub(crate) fn existing(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }
}

static HEAP: Mutex<GlobalHeap> = Mutex::new(GlobalHeap {
    config: None,
    heap: None,
});

pub(crate) fn global() -> &'static Mutex<GlobalHeap> {
    &HEAP
}

fn to_raw(heap: &Heap, handle: Option<PayloadPtr>) -> *mut c_void {
    match (handle, heap.store_base()) {
        (Some(handle), Some(base)) => base.as_ptr().wrapping_add(handle.offset()).cast(),
        _ => ptr::null_mut(),
    }
}

fn to_handle(heap: &Heap, raw: *const c_void) -> Option<PayloadPtr> {
    if raw.is_null() {
        return None;
    }
    let base = heap.store_base().map_or(0, |b| b.as_ptr() as usize);
    Some(PayloadPtr::from_offset((raw as usize).wrapping_sub(base)))
}

/// Set the arena capacity and release policy for the process-wide heap.
///
/// Must be called before the first allocation, or after
/// [`guardheap_shutdown`]. Returns `BUSY` if the heap already holds
/// memory, `INVALID_ARGUMENT` for an unknown policy, and `CONFIG_ERROR`
/// if the capacity is rejected.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_configure(capacity: usize, release_policy: i32) -> i32 {
    ffi_guard!({
        let Some(policy) = GuardheapReleasePolicy::from_raw(release_policy) else {
            return GuardheapStatus::InvalidArgument as i32;
        };
        let config = HeapConfig::new(capacity).with_release_policy(policy.into());
        if let Err(e) = config.validate() {
            tracing::warn!(capacity, error = %e, "rejected heap configuration");
            return GuardheapStatus::from(&e) as i32;
        }

        let mut global = ffi_lock!(global());
        if global.heap.as_ref().is_some_and(|h| h.store_base().is_some()) {
            return GuardheapStatus::Busy as i32;
        }
        global.heap = None;
        global.config = Some(config);
        GuardheapStatus::Ok as i32
    })
}

/// Allocate `size` bytes of zeroed memory, 16-byte aligned.
///
/// Returns null for a zero size or when the arena cannot satisfy the
/// request.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_malloc(size: usize) -> *mut c_void {
    ffi_guard_or!(ptr::null_mut(), {
        let mut global = ffi_lock!(global(), ptr::null_mut());
        let heap = global.get();
        let handle = heap.allocate(size);
        to_raw(heap, handle)
    })
}

/// Release memory obtained from this allocator.
///
/// Null is ignored. Pointers this allocator did not hand out, pointers
/// already freed, and blocks whose guards were overwritten are reported
/// through `tracing` and otherwise ignored.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_free(ptr: *mut c_void) {
    ffi_guard_or!((), {
        let mut global = ffi_lock!(global(), ());
        let heap = global.get();
        let handle = to_handle(heap, ptr);
        heap.deallocate(handle);
    })
}

/// Allocate zeroed memory for `count` elements of `size` bytes.
///
/// Returns null if either argument is zero or the product overflows.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_calloc(count: usize, size: usize) -> *mut c_void {
    ffi_guard_or!(ptr::null_mut(), {
        let mut global = ffi_lock!(global(), ptr::null_mut());
        let heap = global.get();
        let handle = heap.zero_allocate(count, size);
        to_raw(heap, handle)
    })
}

/// Resize an allocation.
///
/// Null `ptr` allocates; zero `size` frees and returns null. On failure
/// null is returned and the original allocation is left untouched.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    ffi_guard_or!(ptr::null_mut(), {
        let mut global = ffi_lock!(global(), ptr::null_mut());
        let heap = global.get();
        let handle = to_handle(heap, ptr);
        let resized = heap.reallocate(handle, size);
        to_raw(heap, resized)
    })
}

/// Usable bytes behind a live allocation, or 0 for anything else.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_usable_size(ptr: *const c_void) -> usize {
    ffi_guard_or!(0, {
        let global = ffi_lock!(global(), 0);
        let Some(heap) = global.existing() else {
            return 0;
        };
        to_handle(heap, ptr)
            .and_then(|handle| heap.usable_size(handle))
            .unwrap_or(0)
    })
}

/// Audit the heap. Returns `OK` for a consistent heap, `CORRUPTED` if any
/// damage was found; each finding is logged at `ERROR`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_check() -> i32 {
    ffi_guard!({
        let global = ffi_lock!(global());
        let Some(heap) = global.existing() else {
            return GuardheapStatus::Ok as i32;
        };
        let report = heap.audit();
        for finding in &report.findings {
            tracing::error!(target: "guardheap", %finding, "heap audit finding");
        }
        if report.is_clean() {
            GuardheapStatus::Ok as i32
        } else {
            GuardheapStatus::Corrupted as i32
        }
    })
}

/// Tear down the process-wide heap, logging every allocation still live
/// as a leak and releasing the arena.
///
/// Returns `CORRUPTED` if there were leaks, quarantined blocks, or audit
/// findings. Every pointer previously returned becomes invalid. The next
/// allocation starts a fresh heap with the last configuration.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn guardheap_shutdown() -> i32 {
    ffi_guard!({
        let mut global = ffi_lock!(global());
        let Some(heap) = global.heap.take() else {
            return GuardheapStatus::Ok as i32;
        };
        let report = heap.audit();
        for leak in report.leaks() {
            tracing::warn!(
                target: "guardheap",
                ptr = %leak.ptr,
                requested = leak.requested,
                "leaked allocation"
            );
        }
        for finding in &report.findings {
            tracing::error!(target: "guardheap", %finding, "heap audit finding");
        }
        if report.quarantined > 0 {
            tracing::warn!(target: "guardheap", blocks = report.quarantined, "quarantined blocks discarded");
        }
        if report.is_clean() && report.leaks().is_empty() && report.quarantined == 0 {
            GuardheapStatus::Ok as i32
        } else {
            GuardheapStatus::Corrupted as i32
        }
    })
}
