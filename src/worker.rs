//! One-shot worker threads
//!
//! A worker is an independent execution context with its own stack,
//! connected to its creator by exactly one uni-directional event channel.
//! The body runs to completion without yield points — deliberately blocking
//! its own thread never blocks the parent — posts its result as a single
//! message, and terminates. Events are buffered by the channel, so the
//! parent may attach its consumer before or after the worker finishes
//! without racing.
//!
//! Failures travel the same channel: a thread that cannot be created or a
//! body that panics surfaces as a [`WorkerEvent::Error`] rather than a
//! message, and the parent's receive loop sees it like any other event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Error, Result};

/// Configuration for a worker thread
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Thread name, visible in logs and panic messages
    pub name: String,
    /// Stack size in bytes; `None` uses the platform default
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            name: "looplab-worker".to_string(),
            stack_size: None,
        }
    }
}

/// Observable lifecycle stage of a worker
///
/// No transition skips a stage and no stage is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created; the body has not begun
    Starting,
    /// The body is running
    Computing,
    /// The result message has been posted
    Reporting,
    /// The thread has exited
    Terminated,
}

impl WorkerState {
    fn from_u8(value: u8) -> WorkerState {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Computing,
            2 => WorkerState::Reporting,
            _ => WorkerState::Terminated,
        }
    }
}

/// Event delivered to the worker's creator
#[derive(Debug)]
pub enum WorkerEvent<T> {
    /// The worker's single result message
    Message(T),
    /// The worker failed to start or panicked
    Error(Error),
}

/// The worker's side of the handoff
pub struct WorkerContext<T> {
    events: Sender<WorkerEvent<T>>,
    state: Arc<AtomicU8>,
}

impl<T> WorkerContext<T> {
    /// Post the single result message back to the creator
    ///
    /// Transitions the worker from `Computing` to `Reporting`.
    pub fn post_message(&self, message: T) -> Result<()> {
        self.state
            .store(WorkerState::Reporting as u8, Ordering::Release);
        self.events
            .send(WorkerEvent::Message(message))
            .map_err(|_| Error::ChannelClosed)
    }
}

/// Parent-side handle to a spawned worker
pub struct Worker<T> {
    events: Receiver<WorkerEvent<T>>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
    name: String,
}

/// Spawn one named OS thread running `body`
///
/// The body receives a [`WorkerContext`] whose `post_message` sends the
/// single result event. Spawn failure does not return an error here: it
/// yields a worker whose first and only event is [`WorkerEvent::Error`],
/// mirroring how a panicking body is reported.
pub fn spawn<T, F>(config: WorkerConfig, body: F) -> Worker<T>
where
    T: Send + 'static,
    F: FnOnce(&WorkerContext<T>) + Send + 'static,
{
    let (events_tx, events_rx) = unbounded();
    let state = Arc::new(AtomicU8::new(WorkerState::Starting as u8));

    let context = WorkerContext {
        events: events_tx.clone(),
        state: Arc::clone(&state),
    };

    let name = config.name.clone();
    let mut builder = thread::Builder::new().name(config.name.clone());
    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let thread_state = Arc::clone(&state);
    let thread_name = name.clone();
    let spawned = builder.spawn(move || {
        log::debug!("Worker '{}' computing", thread_name);
        thread_state.store(WorkerState::Computing as u8, Ordering::Release);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&context)));
        if outcome.is_err() {
            let _ = context.events.send(WorkerEvent::Error(Error::WorkerPanicked {
                name: thread_name.clone(),
            }));
        }
        thread_state.store(WorkerState::Terminated as u8, Ordering::Release);
        log::debug!("Worker '{}' terminated", thread_name);
    });

    let thread = match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Worker '{}' could not be spawned: {}", name, e);
            let _ = events_tx.send(WorkerEvent::Error(Error::Spawn {
                reason: e.to_string(),
            }));
            state.store(WorkerState::Terminated as u8, Ordering::Release);
            None
        }
    };

    Worker {
        events: events_rx,
        state,
        thread,
        name,
    }
}

impl<T> Worker<T> {
    /// Block until the next event arrives
    pub fn recv(&self) -> Result<WorkerEvent<T>> {
        self.events.recv().map_err(|_| Error::ChannelClosed)
    }

    /// Non-blocking receive; `Ok(None)` when no event is queued yet
    pub fn try_recv(&self) -> Result<Option<WorkerEvent<T>>> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Blocking receive bounded by `timeout`; `Ok(None)` on timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WorkerEvent<T>>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Current lifecycle stage
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Name the worker thread was created with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume the worker and join its thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| Error::WorkerPanicked {
                name: self.name.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_posts_one_message_and_terminates() {
        let worker = spawn(WorkerConfig::default(), |ctx| {
            let mut total: u64 = 0;
            for _ in 0..1_000 {
                total += 1;
            }
            ctx.post_message(total).unwrap();
        });

        match worker.recv().unwrap() {
            WorkerEvent::Message(total) => assert_eq!(total, 1_000),
            WorkerEvent::Error(e) => panic!("unexpected error event: {}", e),
        }
        worker.join().unwrap();
    }

    #[test]
    fn zero_bound_still_posts_exactly_once() {
        let worker = spawn(WorkerConfig::default(), |ctx| {
            let mut total: u64 = 0;
            for _ in 0..0 {
                total += 1;
            }
            ctx.post_message(total).unwrap();
        });

        match worker.recv().unwrap() {
            WorkerEvent::Message(total) => assert_eq!(total, 0),
            WorkerEvent::Error(e) => panic!("unexpected error event: {}", e),
        }
        worker.join().unwrap();
    }

    #[test]
    fn panicking_body_surfaces_an_error_event() {
        let worker: Worker<()> = spawn(
            WorkerConfig {
                name: "panicky".to_string(),
                stack_size: None,
            },
            |_ctx| panic!("deliberate"),
        );

        match worker.recv().unwrap() {
            WorkerEvent::Error(Error::WorkerPanicked { name }) => assert_eq!(name, "panicky"),
            other => panic!("expected a panic event, got {:?}", other),
        }
        worker.join().unwrap();
    }

    #[test]
    fn state_reaches_terminated() {
        let worker = spawn(WorkerConfig::default(), |ctx| {
            ctx.post_message("done").unwrap();
        });
        match worker.recv().unwrap() {
            WorkerEvent::Message(text) => assert_eq!(text, "done"),
            WorkerEvent::Error(e) => panic!("unexpected error event: {}", e),
        }
        // The message was posted, so the worker is at least Reporting
        assert!(matches!(
            worker.state(),
            WorkerState::Reporting | WorkerState::Terminated
        ));
        while worker.state() != WorkerState::Terminated {
            std::thread::yield_now();
        }
        worker.join().unwrap();
    }
}
