//! Server-side job dispatch.
//!
//! The dispatcher owns two prioritized FIFO lanes, a bounded worker pool and
//! a duplicate-suppression table. Jobs are accepted with [`Dispatcher::submit`],
//! which either queues them or rejects them with `QueueFull` /
//! `DuplicateRequest`; a free worker always drains the fast lane before
//! touching the slow lane, so a flood of installs cannot starve control
//! operations. A running job is never preempted.

pub mod duplicates;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, trace, warn};

use crate::backend::ContainerBackend;
use crate::error::{CaskError, Result};
use crate::jobs::{Job, Lane, OutputSink};

use duplicates::DuplicateTracker;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of the high-priority lane.
    pub queue_fast: usize,
    /// Capacity of the low-priority lane.
    pub queue_slow: usize,
    /// Maximum simultaneously executing jobs.
    pub concurrent: usize,
    /// Capacity of the duplicate-suppression table.
    pub track_duplicate_ids: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_fast: 10,
            queue_slow: 1,
            concurrent: 2,
            track_duplicate_ids: 1000,
        }
    }
}

/// The originator's half of a submitted job: incremental output plus the
/// final outcome, delivered exactly once.
pub struct JobHandle {
    pub output: mpsc::Receiver<String>,
    pub done: oneshot::Receiver<Result<()>>,
}

impl JobHandle {
    /// Drain all output into one buffer, then wait for the outcome.
    pub async fn gather(mut self) -> (String, Result<()>) {
        let mut buf = String::new();
        while let Some(line) = self.output.recv().await {
            buf.push_str(&line);
            buf.push('\n');
        }
        let result = match self.done.await {
            Ok(result) => result,
            Err(_) => Err(CaskError::execution("dispatcher dropped the job")),
        };
        (buf, result)
    }
}

struct QueueEntry {
    job: Job,
    sink: OutputSink,
    done: oneshot::Sender<Result<()>>,
    queued_at: Instant,
}

struct State {
    fast: VecDeque<QueueEntry>,
    slow: VecDeque<QueueEntry>,
    duplicates: DuplicateTracker,
}

/// Accepts jobs into prioritized lanes and runs them on a bounded worker
/// pool. Shared mutable state (lanes and duplicate table) lives behind one
/// mutex; it is never held across an await point.
pub struct Dispatcher {
    config: DispatcherConfig,
    backend: Arc<dyn ContainerBackend>,
    state: Mutex<State>,
    work: Notify,
    space: Notify,
    started: AtomicBool,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, backend: Arc<dyn ContainerBackend>) -> Arc<Self> {
        let state = State {
            fast: VecDeque::new(),
            slow: VecDeque::new(),
            duplicates: DuplicateTracker::new(config.track_duplicate_ids),
        };
        Arc::new(Self {
            config,
            backend,
            state: Mutex::new(state),
            work: Notify::new(),
            space: Notify::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the worker pool. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for n in 0..self.config.concurrent {
            let dispatcher = Arc::clone(self);
            tokio::spawn(async move { dispatcher.worker(n).await });
        }
        debug!(workers = self.config.concurrent, "dispatcher started");
    }

    /// Accept a job into its lane, or reject it.
    ///
    /// Rejection reasons: `DuplicateRequest` when the request id is in
    /// flight or recently completed, `QueueFull` when the lane is at
    /// capacity. On success the request id is recorded as in flight before
    /// the call returns.
    pub fn submit(&self, job: Job) -> Result<JobHandle> {
        let request_id = job.request_id();
        let lane = job.lane();
        let (sink, output) = OutputSink::channel();
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut state = self.state.lock().unwrap();
            if state.duplicates.hit(&request_id) {
                debug!(request = %request_id, "rejected duplicate request");
                return Err(CaskError::DuplicateRequest(request_id));
            }
            let queue = match lane {
                Lane::Fast => &mut state.fast,
                Lane::Slow => &mut state.slow,
            };
            let capacity = match lane {
                Lane::Fast => self.config.queue_fast,
                Lane::Slow => self.config.queue_slow,
            };
            if queue.len() >= capacity {
                debug!(request = %request_id, %lane, "rejected, lane at capacity");
                return Err(CaskError::QueueFull { lane });
            }
            state.duplicates.begin(request_id);
            let queue = match lane {
                Lane::Fast => &mut state.fast,
                Lane::Slow => &mut state.slow,
            };
            queue.push_back(QueueEntry {
                job,
                sink,
                done: done_tx,
                queued_at: Instant::now(),
            });
        }

        trace!(request = %request_id, %lane, "job queued");
        self.work.notify_one();
        Ok(JobHandle {
            output,
            done: done_rx,
        })
    }

    /// Like [`Dispatcher::submit`], but a full lane parks the caller until a
    /// slot frees instead of rejecting.
    ///
    /// For in-process originators fanning several jobs into one lane;
    /// their own burst is not overload. Duplicate requests are still
    /// rejected immediately.
    pub async fn submit_wait(&self, job: Job) -> Result<JobHandle> {
        loop {
            let space = self.space.notified();
            match self.submit(job.clone()) {
                Err(CaskError::QueueFull { lane }) => {
                    trace!(request = %job.request_id(), %lane, "lane full, waiting for a slot");
                    space.await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn worker(self: Arc<Self>, n: usize) {
        trace!(worker = n, "worker ready");
        loop {
            let entry = {
                let mut state = self.state.lock().unwrap();
                let entry = state.fast.pop_front().or_else(|| state.slow.pop_front());
                if entry.is_some() {
                    // The pop freed a lane slot.
                    self.space.notify_one();
                    if !state.fast.is_empty() || !state.slow.is_empty() {
                        // More work remains; wake a sibling.
                        self.work.notify_one();
                    }
                }
                entry
            };
            match entry {
                Some(entry) => self.run_entry(entry).await,
                None => self.work.notified().await,
            }
        }
    }

    async fn run_entry(&self, entry: QueueEntry) {
        let request_id = entry.job.request_id();
        let kind = entry.job.kind();
        let waited = entry.queued_at.elapsed();
        debug!(request = %request_id, kind, wait_ms = waited.as_millis() as u64, "job running");

        let started = Instant::now();
        let result = entry.job.execute(self.backend.as_ref(), &entry.sink).await;

        {
            let mut state = self.state.lock().unwrap();
            state.duplicates.complete(&request_id);
        }

        match &result {
            Ok(()) => debug!(
                request = %request_id,
                kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            ),
            Err(e) => warn!(request = %request_id, kind, error = %e, "job failed"),
        }

        if entry.done.send(result).is_err() {
            trace!(request = %request_id, "originator went away before completion");
        }
        self.work.notify_one();
    }
}
