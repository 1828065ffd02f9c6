//! Whole-store consistency walk.
//!
//! [`Heap::audit`] visits every carved block from offset zero, cross-checks
//! the block chain against the free list, and lists what is still
//! allocated. It never mutates; a damaged store yields findings, not
//! panics.

use std::fmt;

use smallvec::SmallVec;

use guardheap_core::{CanarySite, PayloadPtr};

use crate::block::{Block, BlockState, OVERHEAD};
use crate::heap::Heap;
use crate::store::BackingStore;

/// Physical walk over carved blocks in address order.
///
/// Stops at the end of the store or at the first block whose size field
/// does not describe a block that fits.
pub(crate) struct BlockWalk<'s> {
    store: &'s BackingStore,
    cursor: usize,
}

impl<'s> BlockWalk<'s> {
    pub(crate) fn new(store: &'s BackingStore) -> Self {
        Self { store, cursor: 0 }
    }

    /// Offset the walk stopped at. Equals the capacity after a clean walk.
    pub(crate) fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for BlockWalk<'_> {
    type Item = (Block, usize);

    fn next(&mut self) -> Option<(Block, usize)> {
        if !self.store.is_active() || self.cursor >= self.store.capacity() {
            return None;
        }
        let block = Block::at(self.cursor);
        let size = block.size(self.store);
        if !block.fits(self.store, size) {
            return None;
        }
        self.cursor = block.offset() + OVERHEAD + size;
        Some((block, size))
    }
}

/// One inconsistency found by [`Heap::audit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditFinding {
    /// The block at `offset` has a size that runs off the store; the walk
    /// could not continue.
    BrokenChain {
        /// Header offset of the unreadable block.
        offset: usize,
    },
    /// Carved blocks do not add up to the capacity.
    ConservationMismatch {
        /// Bytes covered by the blocks walked.
        accounted: usize,
        /// Store capacity.
        capacity: usize,
    },
    /// A free-list link points backwards or to itself.
    FreeListDisorder {
        /// Header offset of the out-of-order node.
        offset: usize,
    },
    /// Two free blocks touch; they should have been merged.
    AdjacentFree {
        /// Header offset of the lower block.
        offset: usize,
    },
    /// A block tagged free is missing from the free list, or a list node
    /// is not tagged free.
    FreeListMismatch {
        /// Header offset of the block.
        offset: usize,
    },
    /// A free block's guards are damaged: something wrote through a
    /// dangling handle.
    DamagedFreeBlock {
        /// Header offset of the block.
        offset: usize,
        /// The damaged guard.
        site: CanarySite,
    },
    /// A live allocation's guards are already damaged; it will be
    /// rejected when freed.
    DamagedLiveBlock {
        /// Header offset of the block.
        offset: usize,
        /// The damaged guard.
        site: CanarySite,
    },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokenChain { offset } => {
                write!(f, "block chain broken at {offset:#x}")
            }
            Self::ConservationMismatch {
                accounted,
                capacity,
            } => write!(f, "blocks cover {accounted} of {capacity} bytes"),
            Self::FreeListDisorder { offset } => {
                write!(f, "free list out of address order at {offset:#x}")
            }
            Self::AdjacentFree { offset } => {
                write!(f, "uncoalesced free blocks at {offset:#x}")
            }
            Self::FreeListMismatch { offset } => {
                write!(f, "free tag and free list disagree at {offset:#x}")
            }
            Self::DamagedFreeBlock { offset, site } => {
                write!(f, "free block at {offset:#x}: {site} damaged")
            }
            Self::DamagedLiveBlock { offset, site } => {
                write!(f, "live block at {offset:#x}: {site} damaged")
            }
        }
    }
}

/// A block still allocated at audit time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveAllocation {
    /// The caller's handle.
    pub ptr: PayloadPtr,
    /// Bytes the caller asked for.
    pub requested: usize,
    /// Usable bytes of the block.
    pub usable: usize,
}

/// Result of [`Heap::audit`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Carved blocks walked.
    pub blocks: usize,
    /// Free blocks walked.
    pub free_blocks: usize,
    /// Live allocations, in address order.
    pub allocations: Vec<LiveAllocation>,
    /// Poisoned blocks walked.
    pub quarantined: usize,
    /// Inconsistencies. Empty for a healthy heap.
    pub findings: SmallVec<[AuditFinding; 4]>,
}

impl AuditReport {
    /// No inconsistencies were found.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Allocations never freed. Meaningful at teardown.
    pub fn leaks(&self) -> &[LiveAllocation] {
        &self.allocations
    }
}

impl Heap {
    /// Walk every block and report inconsistencies and live allocations.
    ///
    /// An uninitialised store audits clean with no blocks.
    pub fn audit(&self) -> AuditReport {
        let mut report = AuditReport::default();
        if !self.store.is_active() {
            return report;
        }
        let store = &self.store;

        let mut walk = BlockWalk::new(store);
        let mut previous_free = false;
        let mut tagged_free = Vec::new();
        for (block, size) in walk.by_ref() {
            report.blocks += 1;
            let state = block.state(store);
            let is_free = state == Some(BlockState::Free);
            match state {
                Some(BlockState::Free) => {
                    report.free_blocks += 1;
                    tagged_free.push(block);
                    if previous_free {
                        report.findings.push(AuditFinding::AdjacentFree {
                            offset: block.offset(),
                        });
                    }
                    if let Err(site) = block.check_canaries(store, size) {
                        report.findings.push(AuditFinding::DamagedFreeBlock {
                            offset: block.offset(),
                            site,
                        });
                    }
                }
                Some(BlockState::Allocated) => {
                    let checked = block
                        .check_canaries(store, size)
                        .and_then(|()| block.check_slack(store, size));
                    if let Err(site) = checked {
                        report.findings.push(AuditFinding::DamagedLiveBlock {
                            offset: block.offset(),
                            site,
                        });
                    }
                    report.allocations.push(LiveAllocation {
                        ptr: block.payload_ptr(),
                        requested: block.requested(store, size),
                        usable: size,
                    });
                }
                Some(BlockState::Poisoned) => report.quarantined += 1,
                None => report.findings.push(AuditFinding::DamagedLiveBlock {
                    offset: block.offset(),
                    site: CanarySite::Header,
                }),
            }
            previous_free = is_free;
        }

        let accounted = walk.position();
        if accounted != store.capacity() {
            report.findings.push(AuditFinding::BrokenChain { offset: accounted });
            report.findings.push(AuditFinding::ConservationMismatch {
                accounted,
                capacity: store.capacity(),
            });
        }

        self.audit_free_list(&tagged_free, &mut report);
        report
    }

    fn audit_free_list(&self, tagged_free: &[Block], report: &mut AuditReport) {
        let store = &self.store;
        let mut last: Option<Block> = None;
        let mut listed = Vec::new();
        for node in self.free.iter(store) {
            if last.is_some_and(|prev| node <= prev) {
                report.findings.push(AuditFinding::FreeListDisorder {
                    offset: node.offset(),
                });
                break;
            }
            if node.state(store) != Some(BlockState::Free) {
                report.findings.push(AuditFinding::FreeListMismatch {
                    offset: node.offset(),
                });
            }
            listed.push(node);
            last = Some(node);
        }
        for block in tagged_free {
            if listed.binary_search(block).is_err() {
                report.findings.push(AuditFinding::FreeListMismatch {
                    offset: block.offset(),
                });
            }
        }
    }
}
