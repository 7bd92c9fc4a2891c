//! Background thread computing prefetch windows.
//!
//! The list's main path sends a [`WindowRequest`] for every visibility change.
//! The worker blocks for the first request, keeps draining until the coalesce
//! deadline passes, computes the window for the newest request only and sends
//! the result back as a [`WindowUpdate`]. The worker never sees the cache or
//! the in-flight set; results are reconciled on the main path.

use std::collections::BTreeSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use sectionlist_core::IndexPath;

use super::prefetch::compute_prefetch_window;

/// Pending requests the main path may queue before parking.
pub const REQUEST_QUEUE_CAPACITY: usize = 16;

const WORKER_THREAD_NAME: &str = "sectionlist-prefetch";

/// Everything needed to compute one prefetch window, copied off the main path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowRequest {
    /// Monotonic sequence number assigned by the main path.
    pub batch: u64,
    /// Snapshot generation the positions refer to.
    pub generation: u64,
    pub visible: Vec<IndexPath>,
    pub section_lengths: Vec<usize>,
    pub prefetch_count: usize,
}

impl WindowRequest {
    pub fn compute(&self) -> BTreeSet<IndexPath> {
        compute_prefetch_window(&self.visible, &self.section_lengths, self.prefetch_count)
    }
}

/// A computed window, tagged with the request it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowUpdate {
    pub batch: u64,
    pub generation: u64,
    pub target: BTreeSet<IndexPath>,
    /// Number of requests folded into this update.
    pub coalesced: usize,
}

/// Handle to the prefetch worker thread.
///
/// Dropping the handle disconnects the request channel and joins the thread.
pub struct PrefetchWorker {
    requests: Option<Sender<WindowRequest>>,
    updates: Receiver<WindowUpdate>,
    parked: Option<WindowRequest>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchWorker {
    /// Spawns the worker with the given coalesce window.
    pub fn spawn(coalesce_window: Duration) -> io::Result<Self> {
        let (request_tx, request_rx) = bounded(REQUEST_QUEUE_CAPACITY);
        let (update_tx, update_rx) = unbounded();
        let handle = spawn_loop(request_rx, update_tx, coalesce_window)?;
        Ok(Self::with_channels(request_tx, update_rx, Some(handle)))
    }

    fn with_channels(
        requests: Sender<WindowRequest>,
        updates: Receiver<WindowUpdate>,
        handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            requests: Some(requests),
            updates,
            parked: None,
            handle,
        }
    }

    /// Queues `request` without blocking.
    ///
    /// When the queue is full the request is parked and retried by the next
    /// `submit` or [`retry_parked`](Self::retry_parked); a newer request
    /// replaces a parked one. Returns `false` once the worker has exited.
    pub fn submit(&mut self, request: WindowRequest) -> bool {
        self.parked = Some(request);
        self.retry_parked()
    }

    /// Retries the parked request, if any. Returns `false` once the worker has
    /// exited.
    pub fn retry_parked(&mut self) -> bool {
        let Some(requests) = self.requests.as_ref() else {
            return false;
        };
        let Some(request) = self.parked.take() else {
            return true;
        };
        match requests.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                log::debug!(
                    "PrefetchWorker: request queue full, parking batch {}",
                    request.batch
                );
                self.parked = Some(request);
                true
            }
            Err(TrySendError::Disconnected(request)) => {
                log::warn!(
                    "PrefetchWorker: worker exited, dropping batch {}",
                    request.batch
                );
                self.requests = None;
                false
            }
        }
    }

    /// Whether a request is waiting for queue space.
    pub fn has_parked(&self) -> bool {
        self.parked.is_some()
    }

    /// Batch number of the request waiting for queue space.
    pub fn parked_batch(&self) -> Option<u64> {
        self.parked.as_ref().map(|request| request.batch)
    }

    /// Returns every update received so far without blocking.
    pub fn drain(&self) -> Vec<WindowUpdate> {
        self.updates.try_iter().collect()
    }

    /// Waits up to `timeout` for the next update.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WindowUpdate> {
        self.updates.recv_timeout(timeout).ok()
    }

    pub fn is_running(&self) -> bool {
        self.requests.is_some()
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("PrefetchWorker: worker thread panicked");
            }
        }
    }
}

fn spawn_loop(
    requests: Receiver<WindowRequest>,
    updates: Sender<WindowUpdate>,
    coalesce_window: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run_loop(&requests, &updates, coalesce_window))
}

fn run_loop(
    requests: &Receiver<WindowRequest>,
    updates: &Sender<WindowUpdate>,
    coalesce_window: Duration,
) {
    while let Ok(first) = requests.recv() {
        let deadline = Instant::now() + coalesce_window;
        let mut latest = first;
        let mut coalesced = 1;
        loop {
            match requests.recv_deadline(deadline) {
                Ok(next) => {
                    latest = next;
                    coalesced += 1;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| latest.compute())) {
            Ok(target) => {
                let update = WindowUpdate {
                    batch: latest.batch,
                    generation: latest.generation,
                    target,
                    coalesced,
                };
                if updates.send(update).is_err() {
                    return;
                }
            }
            Err(_) => {
                log::error!(
                    "PrefetchWorker: window computation for batch {} panicked",
                    latest.batch
                );
            }
        }
    }
}
