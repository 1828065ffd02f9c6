//! Address-ordered singly linked free list.
//!
//! The list lives inside the store: each free block's `next` header word
//! names its successor. [`FreeList`] holds only the head. All operations
//! are O(n) in the number of free blocks, which is bounded by
//! `capacity / MIN_BLOCK_SPAN`; traversal is capped at that bound so a
//! damaged link can never loop forever. The list trusts its nodes; the
//! heap vets them before every allocation and release.

use crate::block::{Block, MIN_BLOCK_SPAN};
use crate::store::BackingStore;

/// The free blocks immediately around a newly inserted node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Neighbors {
    pub(crate) prev: Option<Block>,
    pub(crate) next: Option<Block>,
}

/// Head of the free list.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<Block>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self { head: None }
    }

    pub(crate) fn head(&self) -> Option<Block> {
        self.head
    }

    /// Make `block` the only node.
    pub(crate) fn reset_to(&mut self, block: Block) {
        self.head = Some(block);
    }

    pub(crate) fn clear(&mut self) {
        self.head = None;
    }

    pub(crate) fn iter<'s>(&self, store: &'s BackingStore) -> FreeIter<'s> {
        FreeIter {
            store,
            current: self.head,
            budget: store.capacity() / MIN_BLOCK_SPAN + 1,
        }
    }

    /// First node, in address order, with at least `min_size` payload
    /// bytes, along with its predecessor.
    pub(crate) fn find_first_fit(
        &self,
        store: &BackingStore,
        min_size: usize,
    ) -> Option<(Block, Option<Block>)> {
        let mut prev = None;
        for node in self.iter(store) {
            if node.size(store) >= min_size {
                return Some((node, prev));
            }
            prev = Some(node);
        }
        None
    }

    /// Unlink `node` given its immediate predecessor (`None` for the head).
    pub(crate) fn remove(&mut self, store: &mut BackingStore, node: Block, prev: Option<Block>) {
        let next = node.next(store);
        self.link_after(store, prev, next);
    }

    /// Point `prev` (or the head) at `next`, dropping whatever lay between.
    pub(crate) fn link_after(
        &mut self,
        store: &mut BackingStore,
        prev: Option<Block>,
        next: Option<Block>,
    ) {
        match prev {
            Some(p) => p.set_next(store, next),
            None => self.head = next,
        }
    }

    /// Insert `node` preserving ascending address order.
    pub(crate) fn insert_sorted(&mut self, store: &mut BackingStore, node: Block) -> Neighbors {
        let mut prev = None;
        let mut next = self.head;
        let mut budget = store.capacity() / MIN_BLOCK_SPAN + 1;
        while let Some(candidate) = next {
            if candidate > node || budget == 0 {
                break;
            }
            budget -= 1;
            prev = Some(candidate);
            next = candidate.next(store);
        }

        node.set_next(store, next);
        match prev {
            Some(p) => p.set_next(store, Some(node)),
            None => self.head = Some(node),
        }
        Neighbors { prev, next }
    }

    /// The free block whose span (header through trailer) contains
    /// `offset`, if any.
    pub(crate) fn covering(&self, store: &BackingStore, offset: usize) -> Option<Block> {
        self.iter(store)
            .take_while(|node| node.offset() <= offset)
            .find(|node| node.end(store).is_some_and(|end| offset < end))
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, store: &BackingStore, block: Block) -> bool {
        self.iter(store).any(|node| node == block)
    }
}

/// Iterator over free nodes in address order.
pub(crate) struct FreeIter<'s> {
    store: &'s BackingStore,
    current: Option<Block>,
    budget: usize,
}

impl Iterator for FreeIter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        let node = self.current?;
        self.current = node.next(self.store);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockState, OVERHEAD};

    /// A 640-byte store carved into blocks at 0, 128, 256, 384, 512
    /// (80-byte payloads), all tagged free but unlinked.
    fn carved_store() -> BackingStore {
        let mut store = BackingStore::new(640);
        assert!(store.acquire());
        for i in 0..5 {
            Block::at(i * 128).install(&mut store, 128 - OVERHEAD, BlockState::Free, None);
        }
        store
    }

    fn offsets(list: &FreeList, store: &BackingStore) -> Vec<usize> {
        list.iter(store).map(Block::offset).collect()
    }

    #[test]
    fn insert_keeps_address_order() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        for off in [256, 0, 512, 128] {
            list.insert_sorted(&mut store, Block::at(off));
        }
        assert_eq!(offsets(&list, &store), vec![0, 128, 256, 512]);
    }

    #[test]
    fn insert_reports_neighbors() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        list.insert_sorted(&mut store, Block::at(0));
        list.insert_sorted(&mut store, Block::at(512));
        let n = list.insert_sorted(&mut store, Block::at(256));
        assert_eq!(n.prev, Some(Block::at(0)));
        assert_eq!(n.next, Some(Block::at(512)));

        let n = list.insert_sorted(&mut store, Block::at(384));
        assert_eq!(n.prev, Some(Block::at(256)));
        assert_eq!(n.next, Some(Block::at(512)));
    }

    #[test]
    fn remove_head_and_interior() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        for off in [0, 128, 256] {
            list.insert_sorted(&mut store, Block::at(off));
        }
        list.remove(&mut store, Block::at(128), Some(Block::at(0)));
        assert_eq!(offsets(&list, &store), vec![0, 256]);
        list.remove(&mut store, Block::at(0), None);
        assert_eq!(offsets(&list, &store), vec![256]);
    }

    #[test]
    fn first_fit_returns_lowest_address() {
        let mut store = carved_store();
        Block::at(0).set_size(&mut store, 16);
        let mut list = FreeList::new();
        for off in [0, 256, 384] {
            list.insert_sorted(&mut store, Block::at(off));
        }
        let (node, prev) = list.find_first_fit(&store, 64).unwrap();
        assert_eq!(node, Block::at(256));
        assert_eq!(prev, Some(Block::at(0)));
        assert!(list.find_first_fit(&store, 4096).is_none());
    }

    #[test]
    fn covering_finds_interior_offsets() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        list.insert_sorted(&mut store, Block::at(128));
        assert_eq!(list.covering(&store, 128), Some(Block::at(128)));
        assert_eq!(list.covering(&store, 200), Some(Block::at(128)));
        assert_eq!(list.covering(&store, 256), None);
        assert_eq!(list.covering(&store, 0), None);
        assert!(list.contains(&store, Block::at(128)));
        assert!(!list.contains(&store, Block::at(0)));
    }

    #[test]
    fn link_after_drops_the_nodes_between() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        for off in [0, 128, 256, 384] {
            list.insert_sorted(&mut store, Block::at(off));
        }
        list.link_after(&mut store, Some(Block::at(0)), Some(Block::at(384)));
        assert_eq!(offsets(&list, &store), vec![0, 384]);
        list.link_after(&mut store, None, None);
        assert!(list.head().is_none());
    }

    #[test]
    fn covering_skips_a_forged_size() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        list.insert_sorted(&mut store, Block::at(0));
        list.insert_sorted(&mut store, Block::at(128));
        Block::at(0).set_size(&mut store, usize::MAX - 8);
        assert_eq!(list.covering(&store, 200), Some(Block::at(128)));
    }

    #[test]
    fn cyclic_links_terminate() {
        let mut store = carved_store();
        let mut list = FreeList::new();
        list.reset_to(Block::at(0));
        Block::at(0).set_next(&mut store, Some(Block::at(128)));
        Block::at(128).set_next(&mut store, Some(Block::at(0)));
        assert!(list.iter(&store).count() <= 640 / MIN_BLOCK_SPAN + 1);
    }
}
