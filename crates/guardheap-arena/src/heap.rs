//! The allocator object.
//!
//! [`Heap`] owns one backing store, the free list threaded through it, the
//! quarantine of blocks rejected for corruption, and an optional event
//! sink. The public operations live in the `alloc`, `dealloc`, and
//! `derived` modules; this one holds the shared state, handle validation,
//! free-list vetting, and event plumbing.

use std::fmt;
use std::ptr::NonNull;

use indexmap::IndexMap;
use smallvec::SmallVec;

use guardheap_core::{CanarySite, EventSink, FreeAnomaly, HeapEvent, Operation, Outcome, PayloadPtr};

use crate::block::{Block, BlockState, GRANULE, HEADER_SIZE, MIN_BLOCK_SPAN};
use crate::config::HeapConfig;
use crate::error::ConfigError;
use crate::free_list::FreeList;
use crate::stats::Counters;
use crate::store::{BackingStore, StoreState};

/// A block rejected for corruption and withheld from reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuarantineEntry {
    /// The handle the caller tried to release.
    pub ptr: PayloadPtr,
    /// The first damaged guard.
    pub site: CanarySite,
}

/// A handle that passed validation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LiveBlock {
    pub(crate) block: Block,
    pub(crate) size: usize,
    pub(crate) requested: usize,
}

/// A handle that failed validation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rejection {
    pub(crate) anomaly: FreeAnomaly,
    /// Set when the header was recognised as an allocated block, so the
    /// block itself may be tagged poisoned without touching anything else.
    pub(crate) poisonable: Option<Block>,
}

/// Why a free-list node cannot be handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeFault {
    /// The link does not lead to a free header; nothing past it is trusted.
    BadLink,
    /// A free header whose size or canaries are damaged.
    Damaged(CanarySite),
}

impl From<FreeAnomaly> for Rejection {
    fn from(anomaly: FreeAnomaly) -> Self {
        Self {
            anomaly,
            poisonable: None,
        }
    }
}

/// A canary-guarded first-fit heap over one bounded arena.
///
/// Single-threaded: every mutating operation takes `&mut self`. Wrap in
/// [`SharedHeap`](crate::SharedHeap) for use across threads.
///
/// # Examples
///
/// ```
/// use guardheap_arena::{Heap, HeapConfig};
///
/// let mut heap = Heap::new(HeapConfig::new(4096)).unwrap();
/// let p = heap.allocate(100).unwrap();
/// heap.payload_mut(p).unwrap().fill(7);
/// assert!(heap.payload(p).unwrap().iter().all(|&b| b == 7));
/// heap.deallocate(Some(p));
/// ```
pub struct Heap {
    pub(crate) config: HeapConfig,
    pub(crate) store: BackingStore,
    pub(crate) free: FreeList,
    /// Header offset → quarantine record, in detection order.
    pub(crate) quarantine: IndexMap<usize, QuarantineEntry>,
    pub(crate) counters: Counters,
    /// Damage found while vetting the free list, published ahead of the
    /// current operation's own event.
    found_damage: SmallVec<[FreeAnomaly; 2]>,
    sink: Option<Box<dyn EventSink>>,
}

impl Heap {
    /// Create a heap. The backing store is not acquired until the first
    /// allocation.
    pub fn new(config: HeapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: HeapConfig) -> Self {
        Self {
            store: BackingStore::new(config.capacity),
            config,
            free: FreeList::new(),
            quarantine: IndexMap::new(),
            counters: Counters::default(),
            found_damage: SmallVec::new(),
            sink: None,
        }
    }

    /// Attach an event sink, replacing any previous one.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Replace or detach the event sink.
    pub fn set_sink(&mut self, sink: Option<Box<dyn EventSink>>) {
        self.sink = sink;
    }

    /// The configuration this heap was built with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Total arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Current lifecycle state of the backing store.
    pub fn store_state(&self) -> StoreState {
        self.store.state()
    }

    /// Base address of the active store, for foreign-pointer translation.
    ///
    /// The address is stable until the store is released.
    pub fn store_base(&self) -> Option<NonNull<u8>> {
        self.store.base()
    }

    /// Blocks rejected for corruption, in detection order.
    pub fn quarantined(&self) -> impl Iterator<Item = &QuarantineEntry> + '_ {
        self.quarantine.values()
    }

    /// Read access to exactly the requested bytes of a live allocation.
    ///
    /// Returns `None` if the handle fails validation.
    pub fn payload(&self, ptr: PayloadPtr) -> Option<&[u8]> {
        let live = self.inspect(ptr).ok()?;
        self.store
            .bytes()
            .get(live.block.payload_range(live.requested))
    }

    /// Write access to exactly the requested bytes of a live allocation.
    pub fn payload_mut(&mut self, ptr: PayloadPtr) -> Option<&mut [u8]> {
        let live = self.inspect(ptr).ok()?;
        self.store
            .bytes_mut()
            .get_mut(live.block.payload_range(live.requested))
    }

    /// The bytes the caller asked for when this allocation was made (or
    /// last resized).
    pub fn requested_size(&self, ptr: PayloadPtr) -> Option<usize> {
        self.inspect(ptr).ok().map(|live| live.requested)
    }

    /// Usable capacity of the owning block, which may exceed the request.
    pub fn usable_size(&self, ptr: PayloadPtr) -> Option<usize> {
        self.inspect(ptr).ok().map(|live| live.size)
    }

    /// Unchecked access to the whole backing store.
    ///
    /// Exists so tests can overwrite guard bytes the way a buggy caller
    /// would. Empty while the store is uninitialised.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn raw_store_mut(&mut self) -> &mut [u8] {
        self.store.bytes_mut()
    }

    /// Map a caller handle back to its owning block, validating everything
    /// on the way. Never mutates.
    pub(crate) fn inspect(&self, ptr: PayloadPtr) -> Result<LiveBlock, Rejection> {
        let offset = ptr.offset();
        let out_of_bounds = FreeAnomaly::OutOfBounds { offset };

        if !self.store.is_active() {
            return Err(out_of_bounds.into());
        }
        let block = Block::owning(ptr).ok_or(out_of_bounds)?;
        if !self.store.contains(&(block.offset()..block.offset() + HEADER_SIZE)) {
            return Err(out_of_bounds.into());
        }
        if block.offset() % GRANULE != 0 {
            return Err(FreeAnomaly::Misaligned { offset }.into());
        }

        match block.state(&self.store) {
            Some(BlockState::Allocated) => {}
            Some(BlockState::Free) => return Err(FreeAnomaly::DoubleFree { offset }.into()),
            Some(BlockState::Poisoned) => {
                return Err(FreeAnomaly::Quarantined { offset }.into());
            }
            None => {
                // A header absorbed by coalescing reads as zeroed payload
                // of the surviving free block.
                let anomaly = if self.free.covering(&self.store, block.offset()).is_some() {
                    FreeAnomaly::DoubleFree { offset }
                } else {
                    FreeAnomaly::Corruption {
                        offset,
                        site: CanarySite::Header,
                    }
                };
                return Err(anomaly.into());
            }
        }

        let corrupted = |site| Rejection {
            anomaly: FreeAnomaly::Corruption { offset, site },
            poisonable: Some(block),
        };

        let size = block.size(&self.store);
        if !block.fits(&self.store, size) {
            // Report the leading canary first if it is also gone; a size
            // word is usually clobbered by the same underflow.
            return Err(match block.check_canaries(&self.store, 0) {
                Err(CanarySite::Leading) => corrupted(CanarySite::Leading),
                _ => corrupted(CanarySite::Size),
            });
        }
        block
            .check_canaries(&self.store, size)
            .map_err(corrupted)?;
        let requested = block.check_slack(&self.store, size).map_err(corrupted)?;

        Ok(LiveBlock {
            block,
            size,
            requested,
        })
    }

    /// Tag a rejected block poisoned and record it, if it is safe to do so.
    pub(crate) fn quarantine_rejected(&mut self, rejection: &Rejection) {
        let Some(block) = rejection.poisonable else {
            return;
        };
        let FreeAnomaly::Corruption { site, .. } = rejection.anomaly else {
            return;
        };
        block.set_state(&mut self.store, BlockState::Poisoned);
        self.quarantine.insert(
            block.offset(),
            QuarantineEntry {
                ptr: block.payload_ptr(),
                site,
            },
        );
    }

    /// Walk the free list and cut out every node that cannot be trusted.
    ///
    /// A free header with a damaged size or canary is poisoned and
    /// quarantined; its successor is still vetted. A link that does not
    /// name a free header past its predecessor ends the list there, since
    /// nothing it leads to can be trusted either. Each cut is queued as a
    /// [`FreeAnomaly::Corruption`] for the next [`emit`](Self::emit).
    pub(crate) fn scrub_free_list(&mut self) {
        let mut prev: Option<Block> = None;
        let mut floor = 0;
        let mut cursor = self.free.head();
        while let Some(node) = cursor {
            match self.vet_free_node(node, floor) {
                Ok(end) => {
                    floor = end;
                    prev = Some(node);
                    cursor = node.next(&self.store);
                }
                Err(NodeFault::Damaged(site)) => {
                    let next = node.next(&self.store);
                    self.free.link_after(&mut self.store, prev, next);
                    self.quarantine_free(node, site);
                    floor = node.offset() + MIN_BLOCK_SPAN;
                    cursor = next;
                }
                Err(NodeFault::BadLink) => {
                    self.free.link_after(&mut self.store, prev, None);
                    self.report_damage(node, CanarySite::Header);
                    cursor = None;
                }
            }
        }
    }

    /// Check one free node, returning the offset just past it.
    fn vet_free_node(&self, node: Block, floor: usize) -> Result<usize, NodeFault> {
        let placed = node.offset() >= floor
            && node.offset() % GRANULE == 0
            && node
                .offset()
                .checked_add(MIN_BLOCK_SPAN)
                .is_some_and(|end| end <= self.capacity());
        if !placed || node.state(&self.store) != Some(BlockState::Free) {
            return Err(NodeFault::BadLink);
        }

        let size = node.size(&self.store);
        if !node.fits(&self.store, size) {
            return Err(NodeFault::Damaged(match node.check_canaries(&self.store, 0) {
                Err(CanarySite::Leading) => CanarySite::Leading,
                _ => CanarySite::Size,
            }));
        }
        node.check_canaries(&self.store, size).map_err(NodeFault::Damaged)?;
        node.end(&self.store).ok_or(NodeFault::Damaged(CanarySite::Size))
    }

    fn quarantine_free(&mut self, node: Block, site: CanarySite) {
        node.set_state(&mut self.store, BlockState::Poisoned);
        self.quarantine.insert(
            node.offset(),
            QuarantineEntry {
                ptr: node.payload_ptr(),
                site,
            },
        );
        self.report_damage(node, site);
    }

    fn report_damage(&mut self, node: Block, site: CanarySite) {
        tracing::warn!(offset = node.offset(), ?site, "damaged free block cut from free list");
        self.found_damage.push(FreeAnomaly::Corruption {
            offset: node.payload_offset(),
            site,
        });
    }

    /// Count and publish one operation's event, preceded by any damage
    /// found while serving it.
    pub(crate) fn emit(&mut self, operation: Operation, requested: usize, outcome: Outcome) {
        for anomaly in std::mem::take(&mut self.found_damage) {
            self.counters.anomalies += 1;
            if let Some(sink) = &self.sink {
                sink.record(&HeapEvent::new(operation, 0, Outcome::Rejected(anomaly)));
            }
        }
        let event = HeapEvent::new(operation, requested, outcome);
        self.counters.record(&event);
        if let Some(sink) = &self.sink {
            sink.record(&event);
        }
    }
}

impl Default for Heap {
    /// A heap with [`HeapConfig::default`], which always validates.
    fn default() -> Self {
        Self::from_valid(HeapConfig::default())
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("store", &self.store.state())
            .field("quarantined", &self.quarantine.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
