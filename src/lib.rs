//! # looplab
//!
//! An explicit, injectable event-loop scheduler with typed callback queues,
//! plus one-shot worker threads for parallel handoff.
//!
//! ## Features
//!
//! - **Scheduler**: a single-threaded phase loop (Timers, Poll, Check,
//!   Close) with a priority-deferred queue and a microtask queue drained
//!   between every callback invocation
//! - **Promises**: one-shot settled-or-pending values whose reactions run as
//!   microtasks
//! - **Streams**: lazy single-shot file streams whose teardown schedules
//!   exactly one close-phase callback
//! - **Workers**: independent OS threads reporting a single result message
//!   over a buffered event channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use looplab::prelude::*;
//!
//! # fn main() -> looplab::Result<()> {
//! let mut event_loop = EventLoop::new()?;
//! let handle = event_loop.handle();
//!
//! handle.set_timeout(0, || println!("timers phase"))?;
//! handle.set_immediate(|| println!("check phase"))?;
//! handle.defer(|| println!("before any of the above"))?;
//! Promise::fulfilled(&handle, ()).then(|_| println!("microtask"));
//!
//! event_loop.run();
//! # Ok(())
//! # }
//! ```
//!
//! The loop can also run on a virtual clock, which makes the entire
//! ordering contract testable by simulation instead of wall-clock race; see
//! [`scheduler::ClockMode`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
mod io;
pub mod promise;
pub mod scheduler;
pub mod stream;
pub mod worker;

/// Convenient re-exports for common functionality
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::promise::{Promise, Resolver};
    pub use crate::scheduler::{ClockMode, EventLoop, Handle, LoopConfig, LoopStats, TimerId};
    pub use crate::stream::{ReadStream, StreamStage};
    pub use crate::worker::{Worker, WorkerConfig, WorkerContext, WorkerEvent, WorkerState};
}

pub use prelude::*;
