//! Quickstart: allocate, resize, free, and inspect a guarded heap.
//!
//! ```bash
//! cargo run -p guardheap --example quickstart
//! ```

use guardheap::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut heap = Heap::new(HeapConfig::new(HeapConfig::DEFAULT_CAPACITY))?;

    let greeting = heap.allocate(32).ok_or("allocation failed")?;
    if let Some(bytes) = heap.payload_mut(greeting) {
        bytes[..13].copy_from_slice(b"hello, arena!");
    }
    println!(
        "allocated {greeting}: requested 32, usable {:?}",
        heap.usable_size(greeting)
    );

    // calloc-style: 16 elements of 8 bytes, zeroed.
    let table = heap.zero_allocate(16, 8).ok_or("zero_allocate failed")?;

    // Growing past the block moves the data.
    let greeting = heap
        .reallocate(Some(greeting), 500)
        .ok_or("reallocate failed")?;
    let text = heap.payload(greeting).map(|b| &b[..13]).unwrap_or_default();
    println!("moved to {greeting}: {}", String::from_utf8_lossy(text));

    heap.deallocate(Some(table));
    heap.deallocate(Some(table)); // reported, then ignored

    let stats = heap.stats();
    println!(
        "live={} free_blocks={} largest_free={} anomalies={} moves={}",
        stats.live_allocations,
        stats.free_blocks,
        stats.largest_free,
        stats.anomalies,
        stats.moves
    );

    heap.deallocate(Some(greeting));
    let report = heap.audit();
    println!(
        "audit: clean={} blocks={} leaks={}",
        report.is_clean(),
        report.blocks,
        report.leaks().len()
    );
    Ok(())
}
