//! Seeded random allocation churn.
//!
//! [`ChurnWorkload`] drives a heap through a reproducible mix of all four
//! operations, stamping each live allocation with a fill byte and checking
//! that the bytes survive until the allocation is freed or resized.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use guardheap_arena::Heap;
use guardheap_core::{Operation, PayloadPtr};

/// What one workload step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChurnStep {
    Allocated { ptr: PayloadPtr, size: usize },
    ZeroAllocated { ptr: PayloadPtr, size: usize },
    Reallocated { from: PayloadPtr, to: PayloadPtr, size: usize },
    Freed { ptr: PayloadPtr },
    /// The heap returned null.
    Refused { operation: Operation, size: usize },
}

#[derive(Clone, Copy, Debug)]
struct Tracked {
    ptr: PayloadPtr,
    len: usize,
    fill: u8,
}

/// Reproducible random workload.
#[derive(Debug)]
pub struct ChurnWorkload {
    rng: ChaCha8Rng,
    max_size: usize,
    live: Vec<Tracked>,
    stamp: u8,
}

impl ChurnWorkload {
    /// A workload drawing request sizes from `1..=max_size`.
    pub fn new(seed: u64, max_size: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_size: max_size.max(1),
            live: Vec::new(),
            stamp: 0,
        }
    }

    /// Handles currently held by the workload.
    pub fn live(&self) -> Vec<PayloadPtr> {
        self.live.iter().map(|t| t.ptr).collect()
    }

    fn below(&mut self, n: usize) -> usize {
        (self.rng.next_u64() % n as u64) as usize
    }

    fn size(&mut self) -> usize {
        1 + self.below(self.max_size)
    }

    fn next_stamp(&mut self) -> u8 {
        self.stamp = self.stamp.wrapping_add(1).max(1);
        self.stamp
    }

    fn verify(heap: &Heap, tracked: &Tracked) {
        let bytes = heap
            .payload(tracked.ptr)
            .unwrap_or_else(|| panic!("{} vanished", tracked.ptr));
        assert_eq!(bytes.len(), tracked.len, "{} changed length", tracked.ptr);
        assert!(
            bytes.iter().all(|&b| b == tracked.fill),
            "{} contents clobbered",
            tracked.ptr
        );
    }

    fn adopt(&mut self, heap: &mut Heap, ptr: PayloadPtr, len: usize) {
        let bytes = heap.payload(ptr).unwrap_or_else(|| panic!("{ptr} unusable"));
        assert!(bytes.iter().all(|&b| b == 0), "{ptr} not zeroed");
        let fill = self.next_stamp();
        if let Some(bytes) = heap.payload_mut(ptr) {
            bytes.fill(fill);
        }
        self.live.push(Tracked { ptr, len, fill });
    }

    /// Perform one random operation.
    ///
    /// # Panics
    ///
    /// If a live allocation's contents were disturbed or a new one is not
    /// zeroed.
    pub fn step(&mut self, heap: &mut Heap) -> ChurnStep {
        let roll = self.below(10);
        if self.live.is_empty() || roll < 4 {
            let size = self.size();
            let zeroed = roll == 0;
            let result = if zeroed {
                heap.zero_allocate(size, 1)
            } else {
                heap.allocate(size)
            };
            return match result {
                Some(ptr) => {
                    self.adopt(heap, ptr, size);
                    if zeroed {
                        ChurnStep::ZeroAllocated { ptr, size }
                    } else {
                        ChurnStep::Allocated { ptr, size }
                    }
                }
                None => ChurnStep::Refused {
                    operation: if zeroed {
                        Operation::ZeroAllocate
                    } else {
                        Operation::Allocate
                    },
                    size,
                },
            };
        }

        let index = self.below(self.live.len());
        let tracked = self.live[index];
        Self::verify(heap, &tracked);

        if roll < 8 {
            self.live.swap_remove(index);
            heap.deallocate(Some(tracked.ptr));
            return ChurnStep::Freed { ptr: tracked.ptr };
        }

        let size = self.size();
        match heap.reallocate(Some(tracked.ptr), size) {
            Some(to) => {
                let kept = tracked.len.min(size);
                let bytes = heap.payload(to).unwrap_or_else(|| panic!("{to} unusable"));
                assert!(bytes[..kept].iter().all(|&b| b == tracked.fill));
                assert!(bytes[kept..].iter().all(|&b| b == 0));
                if let Some(bytes) = heap.payload_mut(to) {
                    bytes.fill(tracked.fill);
                }
                self.live[index] = Tracked {
                    ptr: to,
                    len: size,
                    fill: tracked.fill,
                };
                ChurnStep::Reallocated {
                    from: tracked.ptr,
                    to,
                    size,
                }
            }
            None => {
                // Failure leaves the original intact.
                Self::verify(heap, &tracked);
                ChurnStep::Refused {
                    operation: Operation::Reallocate,
                    size,
                }
            }
        }
    }

    /// Run `steps` operations, calling `check` after each.
    pub fn run(&mut self, heap: &mut Heap, steps: usize, mut check: impl FnMut(&Heap, ChurnStep)) {
        for _ in 0..steps {
            let step = self.step(heap);
            check(heap, step);
        }
    }

    /// Verify and free everything still live.
    pub fn drain(&mut self, heap: &mut Heap) {
        for tracked in std::mem::take(&mut self.live) {
            Self::verify(heap, &tracked);
            heap.deallocate(Some(tracked.ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardheap_arena::HeapConfig;

    #[test]
    fn same_seed_same_steps() {
        let run = |seed| {
            let mut heap = Heap::new(HeapConfig::new(8192)).unwrap();
            let mut workload = ChurnWorkload::new(seed, 300);
            (0..200).map(|_| workload.step(&mut heap)).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn drain_empties_the_heap() {
        let mut heap = Heap::new(HeapConfig::new(8192)).unwrap();
        let mut workload = ChurnWorkload::new(42, 500);
        workload.run(&mut heap, 300, |h, _| crate::assert_heap_invariants(h));
        workload.drain(&mut heap);
        assert!(workload.live().is_empty());
        assert_eq!(heap.stats().live_allocations, 0);
        assert_eq!(heap.stats().free_blocks, 1);
    }
}
