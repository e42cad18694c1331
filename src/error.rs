//! Error types for looplab
//!
//! This module provides the error handling types used throughout the library.

use std::path::Path;
use thiserror::Error;

/// Main error type for looplab operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A filesystem operation performed by the blocking pool failed
    #[error("I/O operation on {path} failed: {reason}")]
    Io {
        /// Path the operation was issued against
        path: String,
        /// Reason reported by the operating system
        reason: String,
    },

    /// An OS thread could not be created
    #[error("Failed to spawn thread: {reason}")]
    Spawn {
        /// Reason for the spawn failure
        reason: String,
    },

    /// A worker body panicked before posting its result
    #[error("Worker '{name}' panicked")]
    WorkerPanicked {
        /// Name of the worker thread that panicked
        name: String,
    },

    /// The event loop behind a handle has been dropped
    #[error("Event loop has been dropped")]
    LoopGone,

    /// The channel is closed and fully drained
    #[error("Channel is closed")]
    ChannelClosed,

    /// The timer id was never issued by this loop
    #[error("Unknown timer id")]
    TimerGone,
}

impl Error {
    /// Build an [`Error::Io`] from a path and the underlying OS error
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            reason: source.to_string(),
        }
    }
}

/// Result type alias for looplab operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_path_and_reason() {
        let err = Error::io(
            Path::new("/no/such/file"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        let text = err.to_string();
        assert!(text.contains("/no/such/file"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn errors_are_cloneable() {
        let err = Error::Spawn {
            reason: "out of threads".to_string(),
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
