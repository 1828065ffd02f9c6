//! guardheap: a hardened allocator with canary-guarded blocks.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the guardheap sub-crates. For Rust users, adding `guardheap` as a single
//! dependency is sufficient; C callers link `guardheap-ffi` instead.
//!
//! # Quick start
//!
//! ```rust
//! use guardheap::prelude::*;
//!
//! let mut heap = Heap::new(HeapConfig::new(4096)).unwrap();
//!
//! let p = heap.allocate(100).unwrap();
//! heap.payload_mut(p).unwrap()[..5].copy_from_slice(b"hello");
//!
//! // Growing past the block moves the data; the old handle is dead.
//! let q = heap.reallocate(Some(p), 1000).unwrap();
//! assert_eq!(&heap.payload(q).unwrap()[..5], b"hello");
//!
//! // Freeing twice is reported, never fatal.
//! heap.deallocate(Some(q));
//! heap.deallocate(Some(q));
//! assert_eq!(heap.stats().anomalies, 1);
//! assert!(heap.audit().is_clean());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `guardheap-core` | Handles, events, anomaly taxonomy, `EventSink` |
//! | [`arena`] | `guardheap-arena` | The `Heap` engine, config, sinks, stats, audit |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary types (`guardheap-core`).
///
/// [`types::PayloadPtr`] handles, [`types::HeapEvent`]s, and the
/// [`types::EventSink`] trait implemented by loggers.
pub use guardheap_core as types;

/// The allocator engine (`guardheap-arena`).
///
/// [`arena::Heap`] for single-threaded use, [`arena::SharedHeap`] across
/// threads, plus configuration, event sinks, statistics, and the audit
/// walk.
pub use guardheap_arena as arena;

/// Common imports for typical guardheap usage.
///
/// ```rust
/// use guardheap::prelude::*;
/// ```
pub mod prelude {
    // Engine
    pub use guardheap_arena::{Heap, HeapConfig, ReleasePolicy, SharedHeap};

    // Observability
    pub use guardheap_arena::{AuditReport, ChannelSink, HeapStats, NullSink, TracingSink};

    // Errors and events
    pub use guardheap_arena::ConfigError;
    pub use guardheap_core::{
        CanarySite, EventSink, FreeAnomaly, HeapEvent, NullReason, Operation, Outcome,
        PayloadPtr,
    };
}
