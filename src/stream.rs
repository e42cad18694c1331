//! Readable file streams
//!
//! A [`ReadStream`] is lazy: opening it touches nothing on disk. `start`
//! issues a single whole-file read on the blocking pool; the completion
//! emits `data` (one chunk — whole-file delivery is this stream's
//! granularity), then `end`, then schedules the close callback for the close
//! phase. `destroy` tears the stream down from any earlier stage and
//! schedules that same close callback — exactly once, no matter how the
//! stream got there, and never inline: a mainline `destroy` runs its close
//! callback on a future turn.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::error::Result;
use crate::scheduler::Handle;

/// Lifecycle stage of a read stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStage {
    /// Opened, not started; nothing read yet
    Open,
    /// A pool read is in flight
    Reading,
    /// Data and end delivered; close scheduled
    Ended,
    /// The close callback has run
    Closed,
    /// Torn down early; any late completion is discarded
    Destroyed,
}

struct StreamInner {
    handle: Handle,
    path: PathBuf,
    stage: StreamStage,
    close_scheduled: bool,
    on_data: Option<Box<dyn FnOnce(Vec<u8>)>>,
    on_end: Option<Box<dyn FnOnce()>>,
    on_close: Option<Box<dyn FnOnce()>>,
}

/// Single-shot readable stream over one file
pub struct ReadStream {
    inner: Rc<RefCell<StreamInner>>,
}

impl ReadStream {
    /// Open a stream over `path` without touching the filesystem
    pub fn open(handle: &Handle, path: impl Into<PathBuf>) -> ReadStream {
        ReadStream {
            inner: Rc::new(RefCell::new(StreamInner {
                handle: handle.clone(),
                path: path.into(),
                stage: StreamStage::Open,
                close_scheduled: false,
                on_data: None,
                on_end: None,
                on_close: None,
            })),
        }
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> StreamStage {
        self.inner.borrow().stage
    }

    /// Callback for the single data chunk; invoked at most once
    pub fn on_data(&self, callback: impl FnOnce(Vec<u8>) + 'static) {
        self.inner.borrow_mut().on_data = Some(Box::new(callback));
    }

    /// Callback for the end of the stream; invoked at most once
    pub fn on_end(&self, callback: impl FnOnce() + 'static) {
        self.inner.borrow_mut().on_end = Some(Box::new(callback));
    }

    /// Callback run in the close phase; invoked at most once
    pub fn on_close(&self, callback: impl FnOnce() + 'static) {
        self.inner.borrow_mut().on_close = Some(Box::new(callback));
    }

    /// Issue the read; a no-op if the stream is not in the `Open` stage
    pub fn start(&self) -> Result<()> {
        let (handle, path) = {
            let mut inner = self.inner.borrow_mut();
            if inner.stage != StreamStage::Open {
                return Ok(());
            }
            inner.stage = StreamStage::Reading;
            (inner.handle.clone(), inner.path.clone())
        };
        let inner = self.inner.clone();
        handle.read_file(path, move |result| StreamInner::complete(&inner, result))
    }

    /// Tear the stream down
    ///
    /// Schedules the close callback for the close phase — exactly once, even
    /// if `destroy` is called twice or a read completion arrives afterwards —
    /// and suppresses any later `data`/`end` emission.
    pub fn destroy(&self) -> Result<()> {
        let schedule = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.stage, StreamStage::Open | StreamStage::Reading) {
                inner.stage = StreamStage::Destroyed;
            }
            let schedule = !inner.close_scheduled;
            inner.close_scheduled = true;
            schedule
        };
        if schedule {
            StreamInner::schedule_close(&self.inner)?;
        }
        Ok(())
    }
}

impl StreamInner {
    /// Runs in the poll phase when the pool read finishes
    fn complete(inner: &Rc<RefCell<StreamInner>>, result: Result<Vec<u8>>) {
        if inner.borrow().stage == StreamStage::Destroyed {
            log::trace!("Discarding read completion for a destroyed stream");
            return;
        }
        match result {
            Ok(bytes) => {
                let data_cb = inner.borrow_mut().on_data.take();
                if let Some(cb) = data_cb {
                    cb(bytes);
                }
                let end_cb = {
                    let mut s = inner.borrow_mut();
                    // The data callback may have destroyed the stream
                    if s.stage == StreamStage::Destroyed {
                        None
                    } else {
                        s.stage = StreamStage::Ended;
                        s.on_end.take()
                    }
                };
                if let Some(cb) = end_cb {
                    cb();
                }
            }
            Err(error) => {
                log::debug!("Stream read failed: {}", error);
                let mut s = inner.borrow_mut();
                if s.stage == StreamStage::Reading {
                    s.stage = StreamStage::Ended;
                }
            }
        }
        let schedule = {
            let mut s = inner.borrow_mut();
            let schedule = !s.close_scheduled;
            s.close_scheduled = true;
            schedule
        };
        if schedule {
            let _ = StreamInner::schedule_close(inner);
        }
    }

    fn schedule_close(inner: &Rc<RefCell<StreamInner>>) -> Result<()> {
        let handle = inner.borrow().handle.clone();
        let inner = inner.clone();
        handle.enqueue_close(move || {
            let callback = {
                let mut s = inner.borrow_mut();
                s.stage = StreamStage::Closed;
                s.on_close.take()
            };
            if let Some(cb) = callback {
                cb();
            }
        })
    }
}
