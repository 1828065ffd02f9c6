//! Observer trait for heap events.

use crate::event::HeapEvent;

/// Receives the [`HeapEvent`]s of every public heap operation.
///
/// Sinks are strictly observers. They must not block, must not call back
/// into the heap, and cannot influence the operation's result. A sink that
/// needs interior state (a buffer, a channel) manages it behind `&self`.
pub trait EventSink: Send {
    /// Record one event.
    fn record(&self, event: &HeapEvent);
}

impl<S: EventSink + Sync> EventSink for std::sync::Arc<S> {
    fn record(&self, event: &HeapEvent) {
        (**self).record(event);
    }
}
