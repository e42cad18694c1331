//! Blocking-I/O thread pool
//!
//! Filesystem operations never run on the loop thread. The loop submits
//! request records to a small pool of named worker threads and receives
//! completion records back over a channel; the poll phase of the event loop
//! is the only place completions are delivered.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Token correlating an in-flight request with its loop-side callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct IoToken(pub(crate) u64);

/// Filesystem operation carried by a request
pub(crate) enum IoOp {
    /// Read the whole file at the path
    Read(PathBuf),
    /// Write the bytes to the path, replacing any existing contents
    Write(PathBuf, Vec<u8>),
}

/// Request record crossing from the loop thread to the pool
pub(crate) struct IoRequest {
    pub(crate) token: IoToken,
    pub(crate) op: IoOp,
}

/// Result payload of a finished operation
pub(crate) enum IoOutcome {
    Read(Vec<u8>),
    Write,
}

/// Completion record crossing from the pool back to the loop thread
pub(crate) struct IoCompletion {
    pub(crate) token: IoToken,
    pub(crate) outcome: Result<IoOutcome>,
}

/// Loop-side callback held until its completion is delivered
pub(crate) enum IoCallback {
    Read(Box<dyn FnOnce(Result<Vec<u8>>)>),
    Write(Box<dyn FnOnce(Result<()>)>),
}

/// State shared between the loop thread and the pool workers
struct PoolShared {
    /// Pending requests, consumed in submission order
    queue: Mutex<VecDeque<IoRequest>>,
    /// Signalled when a request is queued or shutdown begins
    available: Condvar,
    /// Shutdown flag
    shutdown: AtomicBool,
    /// Completion channel into the loop's poll phase
    completions: Sender<IoCompletion>,
    /// Number of operations executed, for statistics
    executed: AtomicUsize,
}

/// Fixed-size pool of threads executing blocking filesystem operations
pub(crate) struct BlockingPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl BlockingPool {
    /// Spawn a pool with `num_threads` workers and return it with the
    /// receiving end of its completion channel
    pub(crate) fn new(num_threads: usize) -> Result<(Self, Receiver<IoCompletion>)> {
        let (completions, completion_rx) = unbounded();
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            completions,
            executed: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("looplab-io-{}", i))
                .spawn(move || worker_loop(shared))
                .map_err(|e| Error::Spawn {
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }

        log::debug!("Blocking pool started with {} threads", num_threads);
        Ok((BlockingPool { shared, workers }, completion_rx))
    }

    /// Handle used by the loop state to submit requests
    pub(crate) fn submitter(&self) -> PoolSubmitter {
        PoolSubmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of operations the pool has executed so far
    #[cfg(test)]
    pub(crate) fn operations_executed(&self) -> usize {
        self.shared.executed.load(Ordering::Relaxed)
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::debug!("Blocking pool shut down");
    }
}

/// Cloneable submission handle kept inside the loop state
#[derive(Clone)]
pub(crate) struct PoolSubmitter {
    shared: Arc<PoolShared>,
}

impl PoolSubmitter {
    /// Queue a request and wake one parked worker
    pub(crate) fn submit(&self, request: IoRequest) {
        let mut queue = self.shared.queue.lock();
        queue.push_back(request);
        self.shared.available.notify_one();
    }
}

/// Worker thread main loop: park on the condvar until a request is queued,
/// execute it, send the completion back
fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let request = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(request) = queue.pop_front() {
                    break request;
                }
                shared.available.wait(&mut queue);
            }
        };

        let outcome = execute(request.op);
        shared.executed.fetch_add(1, Ordering::Relaxed);

        // The loop dropping its receiver means shutdown is imminent
        if shared
            .completions
            .send(IoCompletion {
                token: request.token,
                outcome,
            })
            .is_err()
        {
            return;
        }
    }
}

fn execute(op: IoOp) -> Result<IoOutcome> {
    match op {
        IoOp::Read(path) => {
            log::trace!("Pool read: {}", path.display());
            fs::read(&path)
                .map(IoOutcome::Read)
                .map_err(|e| Error::io(&path, e))
        }
        IoOp::Write(path, bytes) => {
            log::trace!("Pool write: {} ({} bytes)", path.display(), bytes.len());
            fs::write(&path, bytes)
                .map(|_| IoOutcome::Write)
                .map_err(|e| Error::io(&path, e))
        }
    }
}
