//! Typed callback queues
//!
//! Every piece of deferred work in the loop is a [`Task`]: a boxed callback
//! tagged with the queue it was submitted to and a global submission sequence
//! number. The FIFO queues are plain `VecDeque`s owned by the loop state;
//! this module adds the timer queue, which orders its entries by
//! `(due, seq)` and supports cancellation by id.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// The queue a callback was submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Highest-priority deferred queue, drained before microtasks
    Deferred,
    /// Promise-resolution queue, drained before the next phase
    Microtask,
    /// Timers phase
    Timer,
    /// Poll phase (I/O completions)
    Poll,
    /// Check phase (immediates)
    Check,
    /// Close-callbacks phase
    Close,
}

/// A single unit of deferred work
///
/// Created at submission time, consumed by its single invocation.
pub(crate) struct Task {
    /// Global submission sequence number
    pub(crate) seq: u64,
    /// Queue the task was submitted to
    pub(crate) kind: QueueKind,
    /// The callback itself
    pub(crate) run: Box<dyn FnOnce()>,
}

impl Task {
    pub(crate) fn new(seq: u64, kind: QueueKind, run: impl FnOnce() + 'static) -> Self {
        Task {
            seq,
            kind,
            run: Box::new(run),
        }
    }
}

/// Identifier of a pending timer, usable with `clear_timeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Pending timers ordered by `(due, seq)`
///
/// Two timers with the same due time fire in submission order; the BTreeMap
/// key makes that ordering structural rather than a sort at fire time.
pub(crate) struct TimerQueue {
    entries: BTreeMap<(u64, u64), Task>,
    index: HashMap<TimerId, (u64, u64)>,
    next_id: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        TimerQueue {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
        }
    }

    /// Insert a timer due at `due` loop-clock milliseconds
    pub(crate) fn insert(&mut self, due: u64, task: Task) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let key = (due, task.seq);
        self.index.insert(id, key);
        self.entries.insert(key, task);
        id
    }

    /// Cancel a pending timer
    ///
    /// Returns `Ok(true)` if the timer was pending and is now removed,
    /// `Ok(false)` if it already fired or was already cancelled, and
    /// `Err(TimerGone)` if the id was never issued by this queue.
    pub(crate) fn cancel(&mut self, id: TimerId) -> Result<bool> {
        if id.0 >= self.next_id {
            return Err(Error::TimerGone);
        }
        match self.index.remove(&id) {
            Some(key) => Ok(self.entries.remove(&key).is_some()),
            None => Ok(false),
        }
    }

    /// Earliest pending due time, if any
    pub(crate) fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().map(|&(due, _)| due)
    }

    /// Remove and return every entry with `due <= now`, in `(due, seq)` order
    ///
    /// This is the batch taken at the start of the timers phase; entries
    /// scheduled while the batch runs are seen on a later turn.
    pub(crate) fn pop_due(&mut self, now: u64) -> Vec<Task> {
        let keys: Vec<(u64, u64)> = self
            .entries
            .range(..=(now, u64::MAX))
            .map(|(&key, _)| key)
            .collect();
        let mut due = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(task) = self.entries.remove(&key) {
                due.push(task);
            }
        }
        self.index.retain(|_, key| self.entries.contains_key(key));
        due
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
