//! Fixed-stride batching of large target lists.
//!
//! Batching only changes how jobs are enqueued: the engine sizes its job queue
//! to one batch so the number of queued targets stays bounded on very large
//! runs. Worker count and per-target behaviour are unaffected.

use std::thread;

/// Runs with more targets than this are enqueued batch by batch.
pub const BATCH_THRESHOLD: usize = 1000;

/// Number of CPUs available to this process, at least 1.
pub fn available_cpus() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Whether a run over `len` targets goes through the batcher.
pub fn needs_batching(len: usize) -> bool {
    len > BATCH_THRESHOLD
}

/// Batch size used when none is given: `len / cpus`, never below 1.
pub fn default_batch_size(len: usize) -> usize {
    (len / available_cpus()).max(1)
}

/// Split `items` into contiguous batches of `batch_size` elements.
///
/// A `batch_size` of `0` selects [`default_batch_size`]. The last batch holds
/// the remainder and may be shorter.
pub fn split<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    let batch_size = if batch_size == 0 {
        default_batch_size(items.len())
    } else {
        batch_size
    };
    items.chunks(batch_size).collect()
}
