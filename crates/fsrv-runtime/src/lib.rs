//! # fsrv-runtime
//!
//! OS-facing runtime for the bounded-queue HTTP file server: the listener
//! helper, the worker pool, the per-connection request handler, and the
//! acceptor/estimator loop. Everything here touches raw file descriptors;
//! the scheduling and metrics model itself lives in `fsrv-core`.

pub mod acceptor;
pub mod handler;
pub mod http;
pub mod listener;
pub mod pool;
pub mod time;

pub use acceptor::run_acceptor_loop;
pub use handler::{handle_connection, ConnectionOutcome};
pub use listener::bind_listener;
pub use pool::{SubmitOutcome, WorkerPool};
