//! # fsrv-core
//!
//! Platform-agnostic core of the bounded-queue HTTP file server.
//!
//! This crate contains no syscalls and no threads of its own — it is the
//! value-level model that `fsrv-runtime` drives: the `Job` record, the two
//! `Scheduler` policies (FIFO and SJF), and the process-wide `Metrics`
//! counter bank. All OS-facing work (sockets, files, threads) lives in
//! `fsrv-runtime`.
//!
//! ## Modules
//!
//! - `job` — the `Job` value type queued between the acceptor and a worker
//! - `scheduler` — the bounded scheduler abstraction and its two policies
//! - `metrics` — atomic counters plus a periodic reporter thread
//! - `error` — the crate's error type

pub mod error;
pub mod job;
pub mod metrics;
pub mod scheduler;

pub use error::{FsrvError, FsrvResult};
pub use job::Job;
pub use metrics::Metrics;
pub use scheduler::{PopOutcome, PushOutcome, Scheduler, SchedulerKind};

/// Queue capacity is fixed at compile time.
pub const QUEUE_CAPACITY: usize = 1024;

/// Maximum requests served per kept-alive connection.
pub const MAX_KEEPALIVE_REQUESTS: u32 = 8;

/// Idle receive timeout, in seconds.
pub const IDLE_TIMEOUT_SECONDS: u64 = 60;

/// Listen backlog.
pub const LISTEN_BACKLOG: i32 = 128;
