//! Core types and traits for the guardheap hardened allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the engine, the C ABI, and the test tooling:
//! payload handles, operation events, the reported anomaly taxonomy, and
//! the [`EventSink`] trait through which loggers observe the heap.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod handle;
pub mod traits;

pub use error::{CanarySite, FreeAnomaly, NullReason};
pub use event::{HeapEvent, Operation, Outcome};
pub use handle::PayloadPtr;
pub use traits::EventSink;
