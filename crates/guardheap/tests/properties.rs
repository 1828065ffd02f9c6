//! Randomised invariant checks over long operation sequences.

use guardheap::prelude::*;
use guardheap_test_utils::{assert_heap_invariants, ChurnStep, ChurnWorkload};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn churn_preserves_every_invariant(seed in any::<u64>(), max_size in 1usize..1500) {
        let mut heap = Heap::new(HeapConfig::new(16 * 1024)).unwrap();
        let mut workload = ChurnWorkload::new(seed, max_size);
        workload.run(&mut heap, 400, |h, _| assert_heap_invariants(h));
        workload.drain(&mut heap);

        let stats = heap.stats();
        prop_assert_eq!(stats.live_allocations, 0);
        prop_assert_eq!(stats.free_blocks, 1);
        prop_assert_eq!(stats.largest_free, heap.capacity() - guardheap::arena::OVERHEAD);
    }

    #[test]
    fn handles_are_distinct_while_live(seed in any::<u64>()) {
        let mut heap = Heap::new(HeapConfig::new(8192)).unwrap();
        let mut workload = ChurnWorkload::new(seed, 400);
        for _ in 0..300 {
            workload.step(&mut heap);
            let mut live = workload.live();
            let before = live.len();
            live.sort();
            live.dedup();
            prop_assert_eq!(live.len(), before);
        }
    }

    #[test]
    fn second_free_changes_nothing(seed in any::<u64>()) {
        let mut heap = Heap::new(HeapConfig::new(8192)).unwrap();
        let mut workload = ChurnWorkload::new(seed, 300);
        let mut freed = Vec::new();
        workload.run(&mut heap, 200, |_, step| {
            if let ChurnStep::Freed { ptr } = step {
                freed.push(ptr);
            }
        });
        // Only handles that nobody has been handed since.
        let live = workload.live();
        freed.retain(|p| !live.contains(p));

        let before = heap.audit();
        let anomalies = heap.stats().anomalies;
        for &ptr in &freed {
            heap.deallocate(Some(ptr));
        }
        let after = heap.audit();
        prop_assert_eq!(before.blocks, after.blocks);
        prop_assert_eq!(before.free_blocks, after.free_blocks);
        prop_assert_eq!(before.allocations, after.allocations);
        prop_assert_eq!(heap.stats().anomalies, anomalies + freed.len() as u64);
        assert_heap_invariants(&heap);
    }

    #[test]
    fn shrink_then_grow_keeps_prefix(size in 1usize..600, shrink in 1usize..600, grow in 1usize..2000) {
        let mut heap = Heap::new(HeapConfig::new(8192)).unwrap();
        let p = heap.allocate(size).unwrap();
        for (i, b) in heap.payload_mut(p).unwrap().iter_mut().enumerate() {
            *b = (i % 251) as u8 + 1;
        }
        let q = heap.reallocate(Some(p), shrink).unwrap();
        let r = heap.reallocate(Some(q), grow).unwrap();
        let kept = size.min(shrink).min(grow);
        let bytes = heap.payload(r).unwrap();
        prop_assert_eq!(bytes.len(), grow);
        for (i, &b) in bytes[..kept].iter().enumerate() {
            prop_assert_eq!(b, (i % 251) as u8 + 1);
        }
        prop_assert!(bytes[kept..].iter().all(|&b| b == 0));
        assert_heap_invariants(&heap);
    }
}

#[test]
fn when_empty_policy_releases_and_reacquires() {
    let config = HeapConfig::new(4096).with_release_policy(ReleasePolicy::WhenEmpty);
    let mut heap = Heap::new(config).unwrap();
    let mut workload = ChurnWorkload::new(99, 300);

    for round in 1..=3u64 {
        workload.run(&mut heap, 100, |h, _| assert_heap_invariants(h));
        workload.drain(&mut heap);
        let stats = heap.stats();
        assert!(!stats.store_active, "round {round}: store still held");
        assert_eq!(stats.store_releases, stats.store_acquisitions);
        assert!(stats.store_acquisitions >= round);
    }
}

#[test]
fn quarantine_pins_the_store_under_when_empty() {
    let config = HeapConfig::new(4096).with_release_policy(ReleasePolicy::WhenEmpty);
    let mut heap = Heap::new(config).unwrap();
    let bad = heap.allocate(32).unwrap();
    guardheap_test_utils::fault::smash_leading_canary(&mut heap, bad);
    heap.deallocate(Some(bad));

    let p = heap.allocate(64).unwrap();
    heap.deallocate(Some(p));
    let stats = heap.stats();
    assert!(stats.store_active);
    assert_eq!(stats.quarantined, 1);
    assert_eq!(stats.store_releases, 0);
}
