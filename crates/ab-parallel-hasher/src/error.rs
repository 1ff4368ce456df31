//! Error types surfaced by [`crate::ParallelHasher`].

/// Failure reported by the caller-supplied input stream.
///
/// Kept distinct from [`HasherError`] so callers can tell "my stream broke" apart from "the
/// hasher itself broke" with a single `match`, rather than threading a string through both.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream ended before `total_size` bytes had been delivered.
    #[error("stream ended after {received} bytes, expected {expected}")]
    UnexpectedEof {
        /// Bytes promised by the caller up front.
        expected: u64,
        /// Bytes actually observed before EOF.
        received: u64,
    },
    /// The stream kept producing bytes past `total_size`.
    #[error("stream produced more than the promised {expected} bytes")]
    TooManyBytes {
        /// Bytes promised by the caller up front.
        expected: u64,
    },
    /// The caller-supplied stream yielded an error of its own.
    #[error("input stream failed: {message}")]
    Source {
        /// Human-readable description of the underlying failure.
        message: String,
    },
}

/// Errors returned by [`crate::ParallelHasher`] operations.
#[derive(Debug, thiserror::Error)]
pub enum HasherError {
    /// `hash_file` was called before `init`.
    #[error("hasher has not been initialized")]
    NotInitialized,
    /// `hash_file` was called after `terminate`.
    #[error("hasher has already been terminated")]
    Terminated,
    /// `HasherOptions` failed validation in `new`.
    #[error("invalid options: {reason}")]
    InvalidOptions {
        /// Why the options were rejected.
        reason: String,
    },
    /// The shared buffer pool could not allocate its initial buffers.
    #[error("shared buffer pool could not be allocated")]
    SharedMemoryUnavailable,
    /// A worker did not report ready within the init timeout.
    #[error("worker {worker_index} did not become ready in time")]
    WorkerInitTimeout {
        /// Index of the worker that failed to start.
        worker_index: usize,
    },
    /// A worker failed fatally (panicked, or its reply channel closed unexpectedly).
    #[error("worker {worker_index} failed: {message}")]
    WorkerFailure {
        /// Index of the worker that failed.
        worker_index: usize,
        /// Description of the failure.
        message: String,
    },
    /// A hash task did not complete within its deadline.
    #[error("task {task_id} timed out")]
    TaskTimeout {
        /// Id of the task that timed out.
        task_id: u64,
    },
    /// The input stream failed.
    #[error(transparent)]
    StreamError(#[from] StreamError),
}
