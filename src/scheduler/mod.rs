//! Event-loop scheduler
//!
//! An injectable, single-threaded phase scheduler: six typed queues
//! (priority-deferred, microtask, timer, poll, check, close), a documented
//! drain order and a clock that can be either the wall clock or a simulated
//! one. See [`EventLoop`] for the phase and micro-draining contract.

mod clock;
mod event_loop;
mod queue;

pub use clock::ClockMode;
pub use event_loop::{EventLoop, Handle, LoopConfig, LoopStats};
pub use queue::{QueueKind, TimerId};
