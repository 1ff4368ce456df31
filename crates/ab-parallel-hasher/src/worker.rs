//! Worker pool: a fixed set of dedicated OS threads, each running a blocking receive loop over a
//! bounded `std::sync::mpsc` channel, hashing one leaf at a time and reporting its chaining value
//! back to the coordinator.
//!
//! Workers never touch `async`; the coordinator is the only async participant, and it talks to
//! this pool entirely through message passing and buffer ownership transfer. A single bridging
//! thread drains the shared `std::sync::mpsc` reply channel and forwards each reply onto a
//! `tokio::sync::mpsc` channel the coordinator can `.await` on, since a blocking `recv()` cannot
//! live directly inside an async task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ab_blake3_tree::{hash_subtree, ChainingValue};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::time;
use tracing::{debug, error};

use crate::error::HasherError;

const WORKER_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A message sent to one worker thread.
#[derive(Debug)]
pub(crate) enum WorkerRequest {
    /// Hash the leaf starting at `offset`, whose bytes are `buf`, and report `task_id`'s result.
    Hash { task_id: u64, offset: u64, buf: Vec<u8> },
    /// Stop the receive loop and exit.
    Shutdown,
}

/// The payload of a [`WorkerReply`].
#[derive(Debug)]
pub(crate) enum WorkerReplyBody {
    /// Posted once, immediately after the worker thread starts.
    Ready,
    /// A hash task finished, successfully or not. The buffer travels back with the reply so the
    /// coordinator can return it to the shared pool.
    Done {
        task_id: u64,
        outcome: Result<(ChainingValue, Vec<u8>), String>,
    },
}

/// A message received from a worker thread, tagged with which worker sent it.
#[derive(Debug)]
pub(crate) struct WorkerReply {
    pub(crate) worker_index: usize,
    pub(crate) body: WorkerReplyBody,
}

fn worker_loop(
    worker_index: usize,
    requests: std_mpsc::Receiver<WorkerRequest>,
    replies: std_mpsc::Sender<WorkerReply>,
) {
    if replies
        .send(WorkerReply {
            worker_index,
            body: WorkerReplyBody::Ready,
        })
        .is_err()
    {
        return;
    }

    while let Ok(request) = requests.recv() {
        match request {
            WorkerRequest::Hash { task_id, offset, buf } => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| hash_subtree(&buf, offset)));
                let outcome = match result {
                    Ok(cv) => Ok((cv, buf)),
                    Err(_) => Err(format!(
                        "worker {worker_index} panicked while hashing task {task_id}"
                    )),
                };
                let reply = WorkerReply {
                    worker_index,
                    body: WorkerReplyBody::Done { task_id, outcome },
                };
                if replies.send(reply).is_err() {
                    return;
                }
            }
            WorkerRequest::Shutdown => return,
        }
    }
}

/// Owns the worker threads, the request channel to each, and the bridging thread that surfaces
/// their replies to the async coordinator.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    request_senders: Vec<std_mpsc::SyncSender<WorkerRequest>>,
    worker_handles: Vec<JoinHandle<()>>,
    bridge_handle: JoinHandle<()>,
    pub(crate) replies: tokio_mpsc::UnboundedReceiver<WorkerReply>,
}

impl WorkerPool {
    /// Spawns `num_workers` threads, each with a request channel of depth `channel_bound`.
    ///
    /// Threads are started but not yet confirmed ready; call [`Self::await_all_ready`] next.
    pub(crate) fn spawn(num_workers: usize, channel_bound: usize) -> Result<Self, HasherError> {
        let (reply_tx, reply_rx_std) = std_mpsc::channel::<WorkerReply>();
        let mut request_senders = Vec::with_capacity(num_workers);
        let mut worker_handles = Vec::with_capacity(num_workers);

        for worker_index in 0..num_workers {
            let (request_tx, request_rx) = std_mpsc::sync_channel(channel_bound.max(1));
            let reply_tx = reply_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("ab-parallel-hasher-{worker_index}"))
                .spawn(move || worker_loop(worker_index, request_rx, reply_tx))
                .map_err(|error| HasherError::WorkerFailure {
                    worker_index,
                    message: error.to_string(),
                })?;
            request_senders.push(request_tx);
            worker_handles.push(handle);
        }
        drop(reply_tx);

        let (reply_tx_async, reply_rx_async) = tokio_mpsc::unbounded_channel();
        let bridge_handle = thread::Builder::new()
            .name("ab-parallel-hasher-bridge".to_owned())
            .spawn(move || {
                for reply in reply_rx_std {
                    if reply_tx_async.send(reply).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn the reply-bridging thread");

        Ok(Self {
            request_senders,
            worker_handles,
            bridge_handle,
            replies: reply_rx_async,
        })
    }

    /// Awaits a `Ready` reply from every worker, each bounded by [`WORKER_INIT_TIMEOUT`].
    pub(crate) async fn await_all_ready(&mut self, num_workers: usize) -> Result<(), HasherError> {
        let mut seen = vec![false; num_workers];
        let mut remaining = num_workers;

        while remaining > 0 {
            let next = time::timeout(WORKER_INIT_TIMEOUT, self.replies.recv())
                .await
                .map_err(|_| HasherError::WorkerInitTimeout {
                    worker_index: seen.iter().position(|ready| !ready).unwrap_or(0),
                })?;

            let Some(reply) = next else {
                return Err(HasherError::WorkerInitTimeout {
                    worker_index: seen.iter().position(|ready| !ready).unwrap_or(0),
                });
            };

            if let WorkerReplyBody::Ready = reply.body {
                if !seen[reply.worker_index] {
                    seen[reply.worker_index] = true;
                    remaining -= 1;
                    debug!(worker_index = reply.worker_index, "worker ready");
                }
            }
        }

        Ok(())
    }

    /// Sends a hash request to a specific worker.
    pub(crate) fn dispatch(
        &self,
        worker_index: usize,
        task_id: u64,
        offset: u64,
        buf: Vec<u8>,
    ) -> Result<(), HasherError> {
        self.request_senders[worker_index]
            .send(WorkerRequest::Hash { task_id, offset, buf })
            .map_err(|_error| HasherError::WorkerFailure {
                worker_index,
                message: "request channel closed".to_owned(),
            })
    }

    /// Sends `Shutdown` to every worker, joins all threads, and joins the bridging thread.
    pub(crate) fn terminate(mut self) {
        for sender in &self.request_senders {
            let _ = sender.send(WorkerRequest::Shutdown);
        }

        for (worker_index, handle) in self.worker_handles.drain(..).enumerate() {
            match handle.join() {
                Ok(()) => debug!(worker_index, "worker shut down"),
                Err(_) => error!(worker_index, "worker thread panicked during shutdown"),
            }
        }

        drop(self.request_senders);
        let _ = self.bridge_handle.join();
    }
}
