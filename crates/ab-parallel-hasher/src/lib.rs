//! Parallel BLAKE3 streaming hasher: consumes an arbitrarily large single-pass byte stream and
//! produces its exact 32-byte BLAKE3 digest, hashing independent subtrees across a fixed worker
//! pool while the stream is still arriving.
//!
//! The tree-shape planning, the primitive BLAKE3 contracts, and the out-of-order bubble-up
//! combiner all live one crate down, in `ab-blake3-tree`; this crate is the concurrency and I/O
//! layer built on top of it — a streaming [`dispatcher`] that fills per-leaf buffers under dual
//! backpressure, a [`worker`] pool of dedicated OS threads, and the async [`hasher`] coordinator
//! that ties both to the combiner.
//!
//! ```no_run
//! use ab_parallel_hasher::{HasherOptions, ParallelHasher};
//!
//! # async fn example(stream: impl ab_parallel_hasher::ByteStream, total_size: u64) -> Result<(), ab_parallel_hasher::HasherError> {
//! let mut hasher = ParallelHasher::new(HasherOptions::default())?;
//! hasher.init().await?;
//! let outcome = hasher.hash_file(stream, total_size).await?;
//! println!("{}", hex::encode(outcome.digest));
//! hasher.terminate();
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod error;
mod hasher;
mod options;
mod pool;
mod stats;
mod stream;
mod worker;

pub use error::{HasherError, StreamError};
pub use hasher::ParallelHasher;
pub use options::HasherOptions;
pub use stats::{ChainingValue, HashOutcome, WorkerStats};
pub use stream::ByteStream;
