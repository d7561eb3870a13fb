//! Crate error type.
//!
//! Zero-dependency: a plain enum implementing `std::error::Error`, no
//! serialization baked in. Only *construction* failures (listener bind,
//! pool creation, scheduler build) travel as `FsrvError` — per-connection
//! faults are handled locally by the request handler and never escape a
//! worker.

use std::fmt;
use std::io;

/// Result alias used throughout the workspace for fallible construction.
pub type FsrvResult<T> = Result<T, FsrvError>;

/// Errors that can abort startup or a scheduler swap.
#[derive(Debug)]
pub enum FsrvError {
    /// The listening socket could not be created, bound, or set to listen.
    ListenerSetup(io::Error),
    /// The worker pool's thread set could not be started at all (all
    /// `nworkers` spawns failed — a partial failure is not an error, see
    /// `WorkerPool::create`).
    PoolCreate(String),
    /// A requested scheduler policy failed to construct.
    SchedulerCreate(String),
    /// An I/O error unrelated to the listener, surfaced during setup.
    Io(io::Error),
}

impl fmt::Display for FsrvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsrvError::ListenerSetup(e) => write!(f, "listener setup failed: {e}"),
            FsrvError::PoolCreate(msg) => write!(f, "worker pool creation failed: {msg}"),
            FsrvError::SchedulerCreate(msg) => write!(f, "scheduler creation failed: {msg}"),
            FsrvError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for FsrvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsrvError::ListenerSetup(e) | FsrvError::Io(e) => Some(e),
            FsrvError::PoolCreate(_) | FsrvError::SchedulerCreate(_) => None,
        }
    }
}

impl From<io::Error> for FsrvError {
    fn from(e: io::Error) -> Self {
        FsrvError::Io(e)
    }
}
