//! Stream heap events to a logging thread while a workload runs.
//!
//! Anomalies also go through `tracing` so they show up with
//! `RUST_LOG=guardheap=warn`.
//!
//! ```bash
//! cargo run -p guardheap --example event_logger
//! ```

use std::thread;

use guardheap::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (sink, events) = ChannelSink::bounded(1024);
    let logger = thread::spawn(move || {
        let mut anomalies = 0usize;
        for event in events.iter() {
            if event.outcome.is_anomaly() {
                anomalies += 1;
                tracing::warn!(%event, "heap anomaly");
            } else {
                tracing::info!(%event);
            }
        }
        anomalies
    });

    let mut heap = Heap::new(HeapConfig::new(4096))?.with_sink(sink);
    let a = heap.allocate(100);
    let b = heap.allocate(200);
    let c = heap.reallocate(a, 400);
    heap.deallocate(b);
    heap.deallocate(b);
    heap.deallocate(Some(PayloadPtr::from_offset(7)));
    heap.deallocate(c);
    let stats = heap.stats();

    // Dropping the heap drops the sender and ends the logger.
    drop(heap);
    let anomalies = logger.join().map_err(|_| "logger thread panicked")?;
    tracing::info!(
        anomalies,
        calls = stats.allocate_calls + stats.deallocate_calls + stats.reallocate_calls,
        "done"
    );
    Ok(())
}
