//! Thread-safe heap handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use guardheap_core::PayloadPtr;

use crate::audit::AuditReport;
use crate::config::HeapConfig;
use crate::error::ConfigError;
use crate::heap::Heap;
use crate::stats::HeapStats;

/// A [`Heap`] behind `Arc<Mutex<_>>`, cloneable across threads.
///
/// Each operation holds the lock for its whole duration, so operations
/// are linearisable. A panic while the lock is held (only possible from
/// caller closures passed to [`with_payload`](SharedHeap::with_payload)
/// and friends) does not disable the heap: the engine's own state is
/// never left half-updated by caller code.
#[derive(Clone, Debug)]
pub struct SharedHeap {
    inner: Arc<Mutex<Heap>>,
}

impl SharedHeap {
    /// Create a shared heap from a configuration.
    pub fn new(config: HeapConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_heap(Heap::new(config)?))
    }

    /// Share an existing heap.
    pub fn from_heap(heap: Heap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(heap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Heap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`Heap::allocate`].
    pub fn allocate(&self, size: usize) -> Option<PayloadPtr> {
        self.lock().allocate(size)
    }

    /// See [`Heap::deallocate`].
    pub fn deallocate(&self, ptr: Option<PayloadPtr>) {
        self.lock().deallocate(ptr);
    }

    /// See [`Heap::zero_allocate`].
    pub fn zero_allocate(&self, count: usize, elem_size: usize) -> Option<PayloadPtr> {
        self.lock().zero_allocate(count, elem_size)
    }

    /// See [`Heap::reallocate`].
    pub fn reallocate(&self, ptr: Option<PayloadPtr>, new_size: usize) -> Option<PayloadPtr> {
        self.lock().reallocate(ptr, new_size)
    }

    /// See [`Heap::usable_size`].
    pub fn usable_size(&self, ptr: PayloadPtr) -> Option<usize> {
        self.lock().usable_size(ptr)
    }

    /// Run `f` over the requested bytes of a live allocation.
    pub fn with_payload<R>(&self, ptr: PayloadPtr, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.lock().payload(ptr).map(f)
    }

    /// Run `f` over the requested bytes of a live allocation, mutably.
    pub fn with_payload_mut<R>(
        &self,
        ptr: PayloadPtr,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        self.lock().payload_mut(ptr).map(f)
    }

    /// See [`Heap::stats`].
    pub fn stats(&self) -> HeapStats {
        self.lock().stats()
    }

    /// See [`Heap::audit`].
    pub fn audit(&self) -> AuditReport {
        self.lock().audit()
    }

    /// Run `f` with exclusive access to the underlying heap.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn concurrent_churn_keeps_heap_consistent() {
        let heap = SharedHeap::new(HeapConfig::new(64 * 1024)).unwrap();
        let workers: Vec<_> = (0..4u8)
            .map(|id| {
                let heap = heap.clone();
                thread::spawn(move || {
                    for round in 0..200usize {
                        let size = 1 + (round * 7 + id as usize * 13) % 200;
                        let Some(p) = heap.allocate(size) else {
                            continue;
                        };
                        heap.with_payload_mut(p, |bytes| bytes.fill(id)).unwrap();
                        let intact = heap
                            .with_payload(p, |bytes| bytes.iter().all(|&b| b == id))
                            .unwrap();
                        assert!(intact);
                        heap.deallocate(Some(p));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        let report = heap.audit();
        assert!(report.is_clean(), "{:?}", report.findings);
        assert!(report.leaks().is_empty());
        assert_eq!(heap.stats().anomalies, 0);
    }

    #[test]
    fn panic_in_closure_does_not_disable_heap() {
        let heap = SharedHeap::new(HeapConfig::new(1024)).unwrap();
        let p = heap.allocate(8).unwrap();
        let cloned = heap.clone();
        let result = thread::spawn(move || {
            cloned.with_payload(p, |_| panic!("caller bug"));
        })
        .join();
        assert!(result.is_err());
        assert_eq!(heap.usable_size(p), Some(16));
    }
}
