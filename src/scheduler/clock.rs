//! Loop clock
//!
//! The loop measures time in milliseconds since its own start. In wall mode
//! that is a monotonic `Instant`; in virtual mode it is a counter that
//! advances only when the loop is idle with timers pending (or explicitly via
//! `EventLoop::advance_clock`), which makes timer ordering testable by
//! simulation instead of wall-clock race.

use std::time::{Duration, Instant};

/// Time source used by an event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Monotonic wall clock; the poll phase really sleeps
    #[default]
    Wall,
    /// Simulated clock starting at 0 ms; advances instead of sleeping
    Virtual,
}

pub(crate) struct LoopClock {
    mode: ClockMode,
    origin: Instant,
    virtual_now: u64,
}

impl LoopClock {
    pub(crate) fn new(mode: ClockMode) -> Self {
        LoopClock {
            mode,
            origin: Instant::now(),
            virtual_now: 0,
        }
    }

    pub(crate) fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Current loop time in milliseconds
    pub(crate) fn now_ms(&self) -> u64 {
        match self.mode {
            ClockMode::Wall => self.origin.elapsed().as_millis() as u64,
            ClockMode::Virtual => self.virtual_now,
        }
    }

    /// Wait until `due` is reached: sleep in wall mode, jump in virtual mode
    pub(crate) fn wait_until(&mut self, due: u64) {
        match self.mode {
            ClockMode::Wall => {
                let now = self.now_ms();
                if due > now {
                    std::thread::sleep(Duration::from_millis(due - now));
                }
            }
            ClockMode::Virtual => {
                if due > self.virtual_now {
                    log::trace!("Virtual clock {} -> {} ms", self.virtual_now, due);
                    self.virtual_now = due;
                }
            }
        }
    }

    /// Advance the virtual clock by `ms`; no-op in wall mode
    pub(crate) fn advance(&mut self, ms: u64) {
        match self.mode {
            ClockMode::Wall => {
                log::warn!("advance_clock ignored on a wall-clock loop");
            }
            ClockMode::Virtual => {
                self.virtual_now += ms;
            }
        }
    }
}
