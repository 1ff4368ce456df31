//! The coordinator: a single async task that owns the planner output, the buffer pool, the
//! pending-task table and the combiner, and drives all three from one `tokio::select!` loop.
//!
//! Nothing below spawns a task of its own. The coordinator is the only place in this crate that
//! talks to both the caller's stream and the worker pool's reply channel; workers themselves
//! (`crate::worker`) never see the stream, and the stream never sees a worker.

use std::collections::HashMap;
use std::pin::pin;
use std::time::{Duration, Instant as StdInstant};

use ab_blake3_tree::{ChainingValue, Combiner, DeliverOutcome, NodeId, Plan, PlanPolicy};
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, Instant};
use tokio_stream::StreamExt;
use tracing::{debug, info_span, trace, warn};

use crate::dispatcher::{Dispatcher, LeafInfo};
use crate::error::{HasherError, StreamError};
use crate::options::HasherOptions;
use crate::pool::BufferPool;
use crate::stats::{HashOutcome, WorkerStats};
use crate::stream::ByteStream;
use crate::worker::{WorkerPool, WorkerReplyBody};

/// Inputs smaller than this are hashed directly with [`ab_blake3_tree::hash_single`]; planning a
/// tree and paying for thread hops is not worth it at this size.
const SMALL_INPUT_THRESHOLD: u64 = 65_536;

/// Per-task deadline; a task that has not replied within this long is reported as
/// [`HasherError::TaskTimeout`] and its worker slot is released, though the worker thread itself
/// is left running (see the crate-level docs for why).
const TASK_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingTask {
    worker_index: usize,
    node_id: NodeId,
    size: u64,
    deadline: Instant,
}

enum State {
    NotInitialized,
    Ready(Runtime),
    Terminated,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::NotInitialized => "NotInitialized",
            State::Ready(_) => "Ready",
            State::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

struct Runtime {
    pool: WorkerPool,
    stats: Vec<WorkerStats>,
    /// Monotonic across every `hash_file` call made through this hasher, so that a reply for a
    /// task abandoned by a previous, failed call (e.g. one that ended in
    /// [`HasherError::TaskTimeout`] while its worker kept running) can never be mistaken for a
    /// task dispatched by the current one.
    next_task_id: u64,
}

/// Parallel, streaming BLAKE3 hasher: a fixed pool of worker threads hashing independent subtrees
/// of a single input in parallel while the input is still arriving.
///
/// `new` validates [`HasherOptions`] but does not start any threads; call [`Self::init`] before
/// the first [`Self::hash_file`]. The worker pool and its threads live for as long as `self` is
/// `Ready`; [`Self::terminate`] tears them down and the hasher cannot be used again until `init`
/// is called once more.
#[derive(Debug)]
pub struct ParallelHasher {
    options: HasherOptions,
    state: State,
}

impl ParallelHasher {
    /// Validates `options` and returns an uninitialized hasher; no threads are started yet.
    pub fn new(options: HasherOptions) -> Result<Self, HasherError> {
        options.validate()?;
        Ok(Self {
            options,
            state: State::NotInitialized,
        })
    }

    /// Starts the worker pool and waits for every worker to report ready.
    ///
    /// Idempotent while already `Ready`. If any worker fails to become ready within its timeout,
    /// every worker started so far is terminated and the hasher is left `NotInitialized`.
    pub async fn init(&mut self) -> Result<(), HasherError> {
        if matches!(self.state, State::Ready(_)) {
            return Ok(());
        }

        let mut pool = WorkerPool::spawn(self.options.worker_count, self.options.max_inflight_per_worker)?;
        if let Err(error) = pool.await_all_ready(self.options.worker_count).await {
            warn!(%error, "worker pool failed to initialize; tearing down already-started workers");
            pool.terminate();
            return Err(error);
        }

        let stats = (0..self.options.worker_count)
            .map(|worker_index| WorkerStats {
                worker_index,
                ..WorkerStats::default()
            })
            .collect();

        self.state = State::Ready(Runtime {
            pool,
            stats,
            next_task_id: 0,
        });
        Ok(())
    }

    /// Hashes `stream`, an input of exactly `total_size` bytes, returning the 32-byte BLAKE3
    /// digest plus timing and per-worker counters.
    ///
    /// Returns [`HasherError::NotInitialized`] if `init` has not been called, or
    /// [`HasherError::Terminated`] if `terminate` has.
    pub async fn hash_file<S: ByteStream>(&mut self, stream: S, total_size: u64) -> Result<HashOutcome, HasherError> {
        let runtime = match &mut self.state {
            State::Ready(runtime) => runtime,
            State::NotInitialized => return Err(HasherError::NotInitialized),
            State::Terminated => return Err(HasherError::Terminated),
        };

        let span = info_span!("hash_file", total_size);
        let _entered = span.enter();
        let start = StdInstant::now();

        let plan = Plan::build(
            total_size,
            PlanPolicy {
                max_leaf_size: self.options.max_leaf_size,
            },
        );

        let digest = if total_size < SMALL_INPUT_THRESHOLD || plan.root_is_leaf() {
            trace!("small input or single-leaf plan; bypassing the dispatcher");
            let bytes = drain_exact(stream, total_size).await?;
            ab_blake3_tree::hash_single(&bytes)
        } else {
            run_pipeline(runtime, &self.options, &plan, stream, total_size).await?
        };

        debug!(elapsed = ?start.elapsed(), "hash_file complete");
        Ok(HashOutcome {
            digest,
            elapsed: start.elapsed(),
            per_worker_stats: runtime.stats.clone(),
        })
    }

    /// Stops every worker thread and rejects any task still in flight. Idempotent and infallible;
    /// safe to call even if `init` was never called.
    pub fn terminate(&mut self) {
        if let State::Ready(runtime) = std::mem::replace(&mut self.state, State::Terminated) {
            runtime.pool.terminate();
        }
    }
}

/// Reads `stream` to completion, checking the byte count against `total_size` as it goes.
async fn drain_exact<S: ByteStream>(stream: S, total_size: u64) -> Result<Vec<u8>, HasherError> {
    let mut buf = Vec::with_capacity(total_size.min(64 * 1024 * 1024) as usize);
    let mut stream = pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(HasherError::StreamError)?;
        if buf.len() as u64 + chunk.len() as u64 > total_size {
            return Err(StreamError::TooManyBytes { expected: total_size }.into());
        }
        buf.extend_from_slice(&chunk);
    }

    if buf.len() as u64 != total_size {
        return Err(StreamError::UnexpectedEof {
            expected: total_size,
            received: buf.len() as u64,
        }
        .into());
    }

    Ok(buf)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

/// Drives the full streaming pipeline: fills leaf buffers from `stream`, dispatches them to
/// `runtime`'s worker pool under dual backpressure, and bubbles completed chaining values up
/// `plan` until the root resolves.
async fn run_pipeline<S: ByteStream>(
    runtime: &mut Runtime,
    options: &HasherOptions,
    plan: &Plan,
    stream: S,
    total_size: u64,
) -> Result<ChainingValue, HasherError> {
    let leaves: Vec<LeafInfo> = plan
        .leaves()
        .map(|leaf| LeafInfo {
            node_id: leaf.id(),
            offset: leaf.offset(),
            size: leaf.size(),
        })
        .collect();

    let num_slots = options.num_slots();
    let mut buffer_pool = BufferPool::new(num_slots, options.max_leaf_size as usize);
    let semaphore = Semaphore::new(num_slots);
    let mut dispatcher = Dispatcher::new(
        leaves,
        options.worker_count,
        options.max_inflight_per_worker,
        runtime.next_task_id,
    );
    let mut combiner = Combiner::new(plan);
    let mut pending_tasks: HashMap<u64, PendingTask> = HashMap::new();

    let mut stream = pin!(stream);
    let mut stream_done = false;
    let mut pending_chunk: Option<Bytes> = None;
    let mut current_buf: Option<Vec<u8>> = None;
    let mut bytes_received = 0u64;

    // Everything above is plain local state; wrapping the drive loop in its own `async` block
    // lets every exit path (`return Ok`/`return Err`) run through one place afterwards to persist
    // `dispatcher`'s task-id counter back onto `runtime`, success or failure alike.
    let outcome: Result<ChainingValue, HasherError> = async {
        loop {
            // Catches extra bytes that arrive as their own stream chunk once every leaf is
            // already spoken for, not just extra bytes trailing within the final leaf's chunk.
            if dispatcher.all_leaves_filled() && pending_chunk.as_ref().is_some_and(|chunk| !chunk.is_empty()) {
                return Err(StreamError::TooManyBytes { expected: total_size }.into());
            }

            let next_deadline = pending_tasks.values().map(|task| task.deadline).min();

            tokio::select! {
                permit = semaphore.acquire(), if current_buf.is_none() && !dispatcher.all_leaves_filled() => {
                    match permit {
                        Ok(permit) => {
                            permit.forget();
                            current_buf = Some(
                                buffer_pool
                                    .try_acquire()
                                    .expect("a semaphore permit guarantees a free buffer"),
                            );
                        }
                        Err(_closed) => return Err(HasherError::SharedMemoryUnavailable),
                    }
                }

                chunk = stream.next(), if pending_chunk.is_none() && !stream_done => {
                    match chunk {
                        Some(Ok(bytes)) => pending_chunk = Some(bytes),
                        Some(Err(error)) => return Err(HasherError::StreamError(error)),
                        None => {
                            stream_done = true;
                            if !dispatcher.all_leaves_filled() {
                                return Err(StreamError::UnexpectedEof {
                                    expected: total_size,
                                    received: bytes_received,
                                }.into());
                            }
                        }
                    }
                }

                reply = runtime.pool.replies.recv() => {
                    let Some(reply) = reply else {
                        return Err(HasherError::WorkerFailure {
                            worker_index: 0,
                            message: "worker reply channel closed unexpectedly".to_owned(),
                        });
                    };

                    let WorkerReplyBody::Done { task_id, outcome } = reply.body else {
                        // `Ready` is only ever sent once, at spawn time; a stray duplicate
                        // mid-call is harmless to ignore.
                        continue;
                    };

                    let Some(pending) = pending_tasks.remove(&task_id) else {
                        trace!(task_id, "ignoring reply for a task not tracked by this call");
                        continue;
                    };

                    match outcome {
                        Ok((cv, buf)) => {
                            dispatcher.release_worker(pending.worker_index);
                            buffer_pool.release(buf);
                            semaphore.add_permits(1);
                            runtime.stats[pending.worker_index].tasks_completed += 1;
                            runtime.stats[pending.worker_index].bytes_hashed += pending.size;
                            trace!(task_id, worker_index = pending.worker_index, "leaf hashed");

                            for item in dispatcher.try_dispatch_pending() {
                                let deadline = Instant::now() + TASK_TIMEOUT;
                                pending_tasks.insert(item.task_id, PendingTask {
                                    worker_index: item.worker_index,
                                    node_id: item.node_id,
                                    size: item.size,
                                    deadline,
                                });
                                runtime.pool.dispatch(item.worker_index, item.task_id, item.offset, item.buf)?;
                            }

                            if let DeliverOutcome::RootReady(digest) = combiner.deliver(pending.node_id, cv) {
                                return Ok(digest);
                            }
                        }
                        Err(message) => {
                            runtime.stats[pending.worker_index].tasks_failed += 1;
                            return Err(HasherError::WorkerFailure {
                                worker_index: reply.worker_index,
                                message,
                            });
                        }
                    }
                }

                () = sleep_until_deadline(next_deadline), if next_deadline.is_some() => {
                    let now = Instant::now();
                    let expired = pending_tasks
                        .iter()
                        .find(|(_, task)| task.deadline <= now)
                        .map(|(&task_id, _)| task_id);

                    if let Some(task_id) = expired {
                        let pending = pending_tasks.remove(&task_id).expect("just found by iteration");
                        warn!(task_id, worker_index = pending.worker_index, "hash task timed out");
                        dispatcher.release_worker(pending.worker_index);
                        semaphore.add_permits(1);
                        runtime.stats[pending.worker_index].tasks_failed += 1;
                        return Err(HasherError::TaskTimeout { task_id });
                    }
                }
            }

            // Feed as much of the buffered chunk as fits into the held buffer. A chunk larger
            // than one leaf drains across several iterations of this loop, one buffer
            // acquisition at a time, so that worker replies (which is what frees buffers back up)
            // keep being polled in between rather than this task blocking on its own
            // backpressure.
            loop {
                let (Some(buf), Some(chunk)) = (current_buf.as_mut(), pending_chunk.as_mut()) else {
                    break;
                };
                if chunk.is_empty() {
                    pending_chunk = None;
                    break;
                }
                if dispatcher.all_leaves_filled() {
                    return Err(StreamError::TooManyBytes { expected: total_size }.into());
                }

                let (consumed, leaf_is_full) = dispatcher.fill(buf, chunk);
                bytes_received += consumed as u64;
                let _ = chunk.split_to(consumed);
                if chunk.is_empty() {
                    pending_chunk = None;
                }

                if leaf_is_full {
                    for item in dispatcher.try_dispatch_pending() {
                        let deadline = Instant::now() + TASK_TIMEOUT;
                        pending_tasks.insert(item.task_id, PendingTask {
                            worker_index: item.worker_index,
                            node_id: item.node_id,
                            size: item.size,
                            deadline,
                        });
                        runtime.pool.dispatch(item.worker_index, item.task_id, item.offset, item.buf)?;
                    }
                    current_buf = None;
                    if dispatcher.all_leaves_filled() && pending_chunk.as_ref().is_some_and(|c| !c.is_empty()) {
                        return Err(StreamError::TooManyBytes { expected: total_size }.into());
                    }
                    break;
                }
            }
        }
    }
    .await;

    runtime.next_task_id = dispatcher.next_task_id();
    outcome
}
