//! Common test harness for looplab tests
//!
//! Provides one-time logger initialization and a label recorder for
//! asserting callback order without touching stdout.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the test environment once per test binary
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Order-of-execution recorder shared between callbacks
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Recorder {
        init_test_env();
        Recorder::default()
    }

    /// Append a label
    pub fn push(&self, label: impl Into<String>) {
        self.entries.borrow_mut().push(label.into());
    }

    /// A zero-argument callback that appends `label` when invoked
    pub fn mark(&self, label: &'static str) -> impl FnOnce() + 'static {
        let recorder = self.clone();
        move || recorder.push(label)
    }

    /// Everything recorded so far, in order
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Position of `label`, panicking if it was never recorded
    pub fn index_of(&self, label: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .position(|entry| entry == label)
            .unwrap_or_else(|| panic!("label '{}' was never recorded", label))
    }
}
