//! Canary-guarded first-fit heap engine for guardheap.
//!
//! Provides [`Heap`], a malloc/free/calloc/realloc-style allocator over a
//! single bounded arena, with guard words around every payload and
//! defensive validation of every handle it is given back. This crate is
//! one of two that may contain `unsafe` code (along with `guardheap-ffi`),
//! confined to `raw.rs`.
//!
//! # Architecture
//!
//! ```text
//! Heap (engine)
//! ├── BackingStore (fixed capacity, acquired lazily)
//! │   └── AlignedStore (RAII region from the global allocator)
//! ├── FreeList (address-ordered, threaded through block headers)
//! ├── quarantine (blocks rejected for corruption, never reused)
//! └── EventSink (optional observer: tracing, channel, ...)
//! ```
//!
//! Every block carries a 32-byte header (size, free link, state tag,
//! leading canary) and a 16-byte trailer (trailing canary, requested
//! length). See [`block`] for the exact layout.
//!
//! # Failure model
//!
//! Nothing here returns an error to the caller once the heap exists.
//! Allocation-path failures return `None`; bad handles passed to
//! deallocation are absorbed. Both are reported as
//! [`HeapEvent`](guardheap_core::HeapEvent)s to the attached sink and
//! counted in [`HeapStats`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod alloc;
pub mod audit;
pub mod block;
pub mod config;
mod dealloc;
mod derived;
pub mod error;
mod free_list;
pub mod heap;
mod raw;
pub mod shared;
pub mod sink;
pub mod stats;
pub mod store;

// Public re-exports for the primary API surface.
pub use audit::{AuditFinding, AuditReport, LiveAllocation};
pub use block::{BlockState, CANARY, GRANULE, HEADER_SIZE, OVERHEAD, TRAILER_SIZE};
pub use config::{HeapConfig, ReleasePolicy};
pub use error::ConfigError;
pub use heap::{Heap, QuarantineEntry};
pub use shared::SharedHeap;
pub use sink::{ChannelSink, NullSink, TracingSink};
pub use stats::HeapStats;
pub use store::StoreState;
