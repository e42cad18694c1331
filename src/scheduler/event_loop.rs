//! Single-threaded cooperative event loop
//!
//! The loop owns six typed queues and runs exactly one callback at a time,
//! to completion. A turn walks the ordered phases Timers, Poll, Check and
//! Close; between every individual callback invocation the loop drains the
//! priority-deferred queue and then the microtask queue, re-checking the
//! deferred queue before each microtask, until both are empty. That
//! micro-draining rule is universal: phases never run two callbacks
//! back-to-back with microtasks pending.
//!
//! Nothing here is process-global. All scheduling goes through a cloneable
//! [`Handle`] holding a weak reference to the loop state; a handle that
//! outlives its loop reports [`Error::LoopGone`] instead of panicking.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;

use super::clock::{ClockMode, LoopClock};
use super::queue::{QueueKind, Task, TimerId, TimerQueue};
use crate::error::{Error, Result};
use crate::io::{
    BlockingPool, IoCallback, IoCompletion, IoOp, IoOutcome, IoRequest, IoToken, PoolSubmitter,
};

/// Configuration for an event loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Time source: wall clock or simulated
    pub clock: ClockMode,
    /// Number of blocking-I/O pool threads
    pub io_threads: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        let io_threads = std::env::var("LOOPLAB_IO_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(|| num_cpus::get().min(4));

        LoopConfig {
            clock: ClockMode::Wall,
            io_threads,
        }
    }
}

/// Counters of everything a loop has done, snapshot via [`EventLoop::stats`]
#[derive(Debug, Default, Clone)]
pub struct LoopStats {
    /// Completed turns of the phase loop
    pub turns: u64,
    /// Priority-deferred callbacks run
    pub deferred_run: u64,
    /// Microtasks run
    pub microtasks_run: u64,
    /// Timer callbacks fired
    pub timers_run: u64,
    /// I/O completions delivered in the poll phase
    pub poll_run: u64,
    /// Check-phase callbacks run
    pub check_run: u64,
    /// Close-phase callbacks run
    pub close_run: u64,
}

/// Mutable loop state shared between the loop and its handles
struct LoopState {
    next_seq: u64,
    deferred: VecDeque<Task>,
    microtasks: VecDeque<Task>,
    timers: TimerQueue,
    check: VecDeque<Task>,
    close: VecDeque<Task>,
    io_callbacks: HashMap<IoToken, IoCallback>,
    next_token: u64,
    io_in_flight: usize,
    submitter: PoolSubmitter,
    clock: LoopClock,
    stats: LoopStats,
}

impl LoopState {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn has_work(&self) -> bool {
        !self.deferred.is_empty()
            || !self.microtasks.is_empty()
            || !self.timers.is_empty()
            || !self.check.is_empty()
            || !self.close.is_empty()
            || self.io_in_flight > 0
    }

    /// Work that a later phase of the current turn would run, making it
    /// wrong for the poll phase to block
    fn later_phase_work(&self, now: u64) -> bool {
        !self.check.is_empty()
            || !self.close.is_empty()
            || self.timers.next_due().map_or(false, |due| due <= now)
    }
}

/// Cloneable scheduling handle onto an event loop
///
/// Handles are not `Send`: every queue belongs to the single loop thread.
#[derive(Clone)]
pub struct Handle {
    state: Weak<RefCell<LoopState>>,
}

impl Handle {
    fn with<R>(&self, f: impl FnOnce(&mut LoopState) -> R) -> Result<R> {
        let state = self.state.upgrade().ok_or(Error::LoopGone)?;
        let mut state = state.borrow_mut();
        Ok(f(&mut state))
    }

    /// Submit a callback to the priority-deferred queue
    ///
    /// Priority-deferred callbacks run before any microtask and before the
    /// next phase, in submission order.
    pub fn defer(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.with(|s| {
            let seq = s.take_seq();
            s.deferred.push_back(Task::new(seq, QueueKind::Deferred, callback));
        })
    }

    /// Submit a callback to the microtask queue
    pub fn enqueue_microtask(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.with(|s| {
            let seq = s.take_seq();
            s.microtasks
                .push_back(Task::new(seq, QueueKind::Microtask, callback));
        })
    }

    /// Schedule a callback for the timers phase, `delay_ms` from now
    pub fn set_timeout(
        &self,
        delay_ms: u64,
        callback: impl FnOnce() + 'static,
    ) -> Result<TimerId> {
        self.with(|s| {
            let seq = s.take_seq();
            let due = s.clock.now_ms() + delay_ms;
            s.timers.insert(due, Task::new(seq, QueueKind::Timer, callback))
        })
    }

    /// Cancel a pending timer
    ///
    /// `Ok(true)` if the timer was pending, `Ok(false)` if it already fired
    /// or was already cancelled, `Err(TimerGone)` for an id this loop never
    /// issued.
    pub fn clear_timeout(&self, id: TimerId) -> Result<bool> {
        self.with(|s| s.timers.cancel(id))?
    }

    /// Schedule a callback for the check phase of the next turn
    pub fn set_immediate(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.with(|s| {
            let seq = s.take_seq();
            s.check.push_back(Task::new(seq, QueueKind::Check, callback));
        })
    }

    /// Schedule a callback for the close phase of the next turn
    pub(crate) fn enqueue_close(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.with(|s| {
            let seq = s.take_seq();
            s.close.push_back(Task::new(seq, QueueKind::Close, callback));
        })
    }

    /// Read a whole file on the blocking pool; the callback is delivered in
    /// the poll phase with the file contents or the error
    pub fn read_file(
        &self,
        path: impl AsRef<Path>,
        callback: impl FnOnce(Result<Vec<u8>>) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.with(|s| {
            let token = IoToken(s.next_token);
            s.next_token += 1;
            s.io_callbacks.insert(token, IoCallback::Read(Box::new(callback)));
            s.io_in_flight += 1;
            s.submitter.submit(IoRequest {
                token,
                op: IoOp::Read(path),
            });
        })
    }

    /// Write a file on the blocking pool, replacing any existing contents;
    /// the callback is delivered in the poll phase
    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        contents: Vec<u8>,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.with(|s| {
            let token = IoToken(s.next_token);
            s.next_token += 1;
            s.io_callbacks.insert(token, IoCallback::Write(Box::new(callback)));
            s.io_in_flight += 1;
            s.submitter.submit(IoRequest {
                token,
                op: IoOp::Write(path, contents),
            });
        })
    }
}

/// The event loop itself
///
/// Owns the queues, the clock and the blocking-I/O pool. Dropping the loop
/// shuts the pool down and invalidates every handle.
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
    completions: Receiver<IoCompletion>,
    // Held for its Drop impl, which joins the pool threads
    _pool: BlockingPool,
}

impl EventLoop {
    /// Create a loop with the default configuration (wall clock)
    pub fn new() -> Result<Self> {
        Self::with_config(LoopConfig::default())
    }

    /// Create a loop with an explicit configuration
    pub fn with_config(config: LoopConfig) -> Result<Self> {
        let (pool, completions) = BlockingPool::new(config.io_threads)?;
        let state = Rc::new(RefCell::new(LoopState {
            next_seq: 0,
            deferred: VecDeque::new(),
            microtasks: VecDeque::new(),
            timers: TimerQueue::new(),
            check: VecDeque::new(),
            close: VecDeque::new(),
            io_callbacks: HashMap::new(),
            next_token: 0,
            io_in_flight: 0,
            submitter: pool.submitter(),
            clock: LoopClock::new(config.clock),
            stats: LoopStats::default(),
        }));
        log::debug!("Event loop created ({:?} clock)", config.clock);
        Ok(EventLoop {
            state,
            completions,
            _pool: pool,
        })
    }

    /// A new scheduling handle onto this loop
    pub fn handle(&self) -> Handle {
        Handle {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Current loop time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.state.borrow().clock.now_ms()
    }

    /// Advance a virtual clock by `ms`; ignored on a wall-clock loop
    pub fn advance_clock(&mut self, ms: u64) {
        self.state.borrow_mut().clock.advance(ms);
    }

    /// Snapshot of the loop's counters
    pub fn stats(&self) -> LoopStats {
        self.state.borrow().stats.clone()
    }

    /// Run until no queue has entries, no timer is pending and no I/O is in
    /// flight
    ///
    /// The mainline has already run to completion by the time this is
    /// called; the first thing `run` does is drain the priority-deferred
    /// batch and then the microtasks submitted by the mainline.
    pub fn run(&mut self) {
        log::debug!("Event loop running");
        self.drain_micro();
        while self.state.borrow().has_work() {
            self.turn();
        }
        log::debug!("Event loop drained after {} turns", self.stats().turns);
    }

    /// Execute a single turn of the phase loop
    ///
    /// Pending priority-deferred callbacks and microtasks are drained first,
    /// then the Timers, Poll, Check and Close phases run in order. Each
    /// phase takes the batch that is due or queued when the phase starts;
    /// work queued for a phase during that same phase runs on the next turn.
    pub fn turn(&mut self) {
        self.drain_micro();
        self.phase_timers();
        self.phase_poll();
        self.phase_check();
        self.phase_close();
        self.state.borrow_mut().stats.turns += 1;
    }

    /// Fire every timer with `due <= now`, in `(due, seq)` order
    fn phase_timers(&mut self) {
        let batch = {
            let mut s = self.state.borrow_mut();
            let now = s.clock.now_ms();
            s.timers.pop_due(now)
        };
        for task in batch {
            self.invoke(task);
        }
    }

    /// Deliver I/O completions
    ///
    /// On a wall clock the phase blocks only when the rest of the turn has
    /// nothing to run: with completions in flight it waits for one, bounded
    /// by the next timer's due date; with only timers pending it sleeps
    /// until the earliest due date. On a virtual clock, time does not pass
    /// while blocked, so the phase waits for every outstanding completion —
    /// that is what makes the simulation deterministic.
    fn phase_poll(&mut self) {
        let mut batch: Vec<IoCompletion> = Vec::new();
        while let Ok(completion) = self.completions.try_recv() {
            batch.push(completion);
        }

        let (mode, in_flight, later_work, next_due, now) = {
            let s = self.state.borrow();
            let now = s.clock.now_ms();
            (
                s.clock.mode(),
                s.io_in_flight,
                s.later_phase_work(now),
                s.timers.next_due(),
                now,
            )
        };

        match mode {
            ClockMode::Virtual => {
                while batch.len() < in_flight {
                    match self.completions.recv() {
                        Ok(completion) => batch.push(completion),
                        Err(_) => break,
                    }
                }
            }
            ClockMode::Wall if batch.is_empty() && in_flight > 0 && !later_work => {
                let received = match next_due {
                    Some(due) => {
                        let timeout = Duration::from_millis(due.saturating_sub(now));
                        self.completions.recv_timeout(timeout).ok()
                    }
                    None => self.completions.recv().ok(),
                };
                if let Some(completion) = received {
                    batch.push(completion);
                }
                while let Ok(completion) = self.completions.try_recv() {
                    batch.push(completion);
                }
            }
            ClockMode::Wall if batch.is_empty() && in_flight == 0 && !later_work => {
                if let Some(due) = next_due {
                    self.state.borrow_mut().clock.wait_until(due);
                }
            }
            ClockMode::Wall => {}
        }

        if mode == ClockMode::Virtual && batch.is_empty() && !later_work {
            // Idle with only timers pending: jump the virtual clock forward
            if let Some(due) = next_due {
                self.state.borrow_mut().clock.wait_until(due);
            }
        }

        for completion in batch {
            self.deliver_completion(completion);
        }
    }

    /// Run the immediates queued when the phase starts, FIFO
    fn phase_check(&mut self) {
        let batch: Vec<Task> = {
            let mut s = self.state.borrow_mut();
            s.check.drain(..).collect()
        };
        for task in batch {
            self.invoke(task);
        }
    }

    /// Run the close callbacks queued when the phase starts, FIFO
    fn phase_close(&mut self) {
        let batch: Vec<Task> = {
            let mut s = self.state.borrow_mut();
            s.close.drain(..).collect()
        };
        for task in batch {
            self.invoke(task);
        }
    }

    /// Run one phase callback, then apply the universal micro-draining rule
    fn invoke(&mut self, task: Task) {
        self.run_task(task);
        self.drain_micro();
    }

    /// Drain the priority-deferred queue and then the microtask queue,
    /// re-checking the deferred queue before each microtask, until both are
    /// empty
    ///
    /// Entries enqueued by the drained callbacks themselves are seen by the
    /// same loop; nested submissions are not special-cased.
    fn drain_micro(&mut self) {
        loop {
            let task = {
                let mut s = self.state.borrow_mut();
                if let Some(task) = s.deferred.pop_front() {
                    Some(task)
                } else {
                    s.microtasks.pop_front()
                }
            };
            match task {
                Some(task) => self.run_task(task),
                None => break,
            }
        }
    }

    // Never called while the state is borrowed: callbacks re-enter through
    // handles.
    fn run_task(&mut self, task: Task) {
        log::trace!("Running {:?} callback (seq {})", task.kind, task.seq);
        let kind = task.kind;
        (task.run)();
        let mut s = self.state.borrow_mut();
        match kind {
            QueueKind::Deferred => s.stats.deferred_run += 1,
            QueueKind::Microtask => s.stats.microtasks_run += 1,
            QueueKind::Timer => s.stats.timers_run += 1,
            QueueKind::Poll => s.stats.poll_run += 1,
            QueueKind::Check => s.stats.check_run += 1,
            QueueKind::Close => s.stats.close_run += 1,
        }
    }

    /// Hand an I/O completion to its registered callback
    fn deliver_completion(&mut self, completion: IoCompletion) {
        let callback = {
            let mut s = self.state.borrow_mut();
            s.io_in_flight = s.io_in_flight.saturating_sub(1);
            s.io_callbacks.remove(&completion.token)
        };
        log::trace!("Delivering I/O completion (token {:?})", completion.token);
        match (callback, completion.outcome) {
            (Some(IoCallback::Read(cb)), Ok(IoOutcome::Read(bytes))) => cb(Ok(bytes)),
            (Some(IoCallback::Read(cb)), Err(e)) => cb(Err(e)),
            (Some(IoCallback::Write(cb)), Ok(IoOutcome::Write)) => cb(Ok(())),
            (Some(IoCallback::Write(cb)), Err(e)) => cb(Err(e)),
            (Some(_), Ok(_)) => log::error!("I/O completion does not match its callback"),
            (None, _) => log::error!("I/O completion for an unknown token"),
        }
        self.state.borrow_mut().stats.poll_run += 1;
        self.drain_micro();
    }
}
