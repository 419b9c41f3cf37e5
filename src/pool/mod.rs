//! Fetch pool: a fixed set of workers, each with its own [`SegmentFetcher`]
//!
//! The coordinator hands one claimed [`Segment`] to an idle worker with
//! [`FetchPool::submit`]. When every worker is busy, `submit` waits for a
//! completion first, so at most `size` segments are ever in flight. Workers
//! report back over a single channel; completions are returned to the caller
//! tagged with the segment they belong to and in the order they finished.
//!
//! Workers never touch the job store. Recording outcomes is the
//! coordinator's job.

mod worker;

use crate::config::RetryConfig;
use crate::db::Segment;
use crate::error::{DecodeError, Error, FetchError, Result};
use crate::fetcher::Connector;
use crate::types::{DecodeResult, SegmentKey};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What happened to one submitted segment
#[derive(Debug)]
pub enum Outcome {
    /// Fetched, decoded and written
    Decoded(DecodeResult),
    /// The article could not be retrieved
    FetchFailed(FetchError),
    /// The article was retrieved but could not be decoded or written
    DecodeFailed(DecodeError),
}

impl Outcome {
    /// Whether the whole run has to stop (server unreachable)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::FetchFailed(e) if e.is_fatal())
    }
}

/// A finished unit of work
#[derive(Debug)]
pub struct Completion {
    /// The segment as it was submitted
    pub segment: Segment,
    /// Its outcome
    pub outcome: Outcome,
}

/// Message from a worker back to the pool
#[derive(Debug)]
struct Finished {
    worker: usize,
    completion: Completion,
}

/// Bounded set of fetch workers
pub struct FetchPool {
    workers: Vec<mpsc::Sender<Segment>>,
    handles: Vec<JoinHandle<()>>,
    done_rx: mpsc::UnboundedReceiver<Finished>,
    idle: Vec<usize>,
    in_flight: HashMap<SegmentKey, usize>,
    ready: VecDeque<Completion>,
}

impl FetchPool {
    /// Spawn `size` workers writing decoded data below `target_dir`
    ///
    /// Workers connect lazily, so creating a pool does no network I/O.
    pub fn new(
        size: usize,
        connector: Arc<dyn Connector>,
        retry: RetryConfig,
        target_dir: PathBuf,
    ) -> Self {
        let size = size.max(1);
        let target_dir = Arc::new(target_dir);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let (tx, rx) = mpsc::channel(1);
            let worker = worker::Worker::new(
                id,
                connector.clone(),
                retry.clone(),
                target_dir.clone(),
                done_tx.clone(),
            );
            handles.push(tokio::spawn(worker.run(rx)));
            workers.push(tx);
        }

        tracing::debug!(workers = size, "Fetch pool started");

        Self {
            workers,
            handles,
            done_rx,
            // Popped from the back, so worker 0 goes first
            idle: (0..size).rev().collect(),
            in_flight: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers currently waiting for work
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Segments submitted and not yet handed back
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether `key` is currently being worked on
    pub fn is_in_flight(&self, key: &SegmentKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Completions already received but not yet handed out
    pub fn buffered(&self) -> usize {
        self.ready.len()
    }

    /// Hand a segment to an idle worker
    ///
    /// Waits for some in-flight segment to finish when all workers are busy;
    /// completions received while waiting are kept for
    /// [`next_completion`](Self::next_completion).
    pub async fn submit(&mut self, segment: Segment) -> Result<()> {
        let key = segment.key();
        if self.in_flight.contains_key(&key) {
            return Err(Error::AlreadyInFlight {
                file_id: key.file_id.get(),
                part: key.part,
            });
        }

        self.wait_idle().await?;

        let worker = self.idle.pop().ok_or(Error::PoolClosed)?;
        let tx = self.workers.get(worker).ok_or(Error::PoolClosed)?;
        if tx.send(segment).await.is_err() {
            return Err(Error::PoolClosed);
        }

        tracing::trace!(file_id = key.file_id.get(), part = key.part, worker, "Segment submitted");
        self.in_flight.insert(key, worker);
        Ok(())
    }

    /// Wait until at least one worker is idle
    ///
    /// Completions received while waiting are kept for
    /// [`next_completion`](Self::next_completion). Cancel-safe.
    pub async fn wait_idle(&mut self) -> Result<()> {
        while self.idle.is_empty() {
            let finished = self.done_rx.recv().await.ok_or(Error::PoolClosed)?;
            let completion = self.settle(finished);
            self.ready.push_back(completion);
        }
        Ok(())
    }

    /// Next finished segment, waiting for one if necessary
    ///
    /// Returns `None` once nothing is buffered and nothing is in flight.
    /// Cancel-safe: dropping the future loses no completion.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if let Some(completion) = self.ready.pop_front() {
            return Some(completion);
        }
        if self.in_flight.is_empty() {
            return None;
        }
        let finished = self.done_rx.recv().await?;
        Some(self.settle(finished))
    }

    /// Next finished segment if one is available right now
    pub fn try_next_completion(&mut self) -> Option<Completion> {
        if let Some(completion) = self.ready.pop_front() {
            return Some(completion);
        }
        let finished = self.done_rx.try_recv().ok()?;
        Some(self.settle(finished))
    }

    /// Wait for all in-flight work, then stop the workers
    ///
    /// Returns every completion not yet handed out. Each worker closes its
    /// connection before exiting.
    pub async fn drain(mut self) -> Vec<Completion> {
        let mut completions: Vec<Completion> = self.ready.drain(..).collect();

        while !self.in_flight.is_empty() {
            match self.done_rx.recv().await {
                Some(finished) => completions.push(self.settle(finished)),
                None => {
                    tracing::warn!(
                        lost = self.in_flight.len(),
                        "Workers exited with segments still in flight"
                    );
                    break;
                }
            }
        }

        // Closing the job channels ends each worker loop
        self.workers.clear();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Fetch worker panicked");
            }
        }

        tracing::debug!(completions = completions.len(), "Fetch pool drained");
        completions
    }

    fn settle(&mut self, finished: Finished) -> Completion {
        self.in_flight.remove(&finished.completion.segment.key());
        self.idle.push(finished.worker);
        finished.completion
    }
}
