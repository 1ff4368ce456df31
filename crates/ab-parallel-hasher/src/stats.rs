//! Result and per-worker statistics returned by a completed hash.

use std::time::Duration;

/// Chaining-value/digest type shared with `ab-blake3-tree`.
pub use ab_blake3_tree::ChainingValue;

/// Per-worker counters accumulated over the life of a [`crate::ParallelHasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    /// Index of this worker.
    pub worker_index: usize,
    /// Number of hash tasks this worker has completed successfully.
    pub tasks_completed: u64,
    /// Number of hash tasks this worker has failed or timed out on.
    pub tasks_failed: u64,
    /// Total bytes hashed by this worker.
    pub bytes_hashed: u64,
}

/// Result of a successful [`crate::ParallelHasher::hash_file`] call.
#[derive(Debug, Clone)]
pub struct HashOutcome {
    /// The final 32-byte BLAKE3 digest.
    pub digest: ChainingValue,
    /// Wall-clock time spent inside `hash_file`.
    pub elapsed: Duration,
    /// Per-worker counters as of the end of this call.
    pub per_worker_stats: Vec<WorkerStats>,
}
