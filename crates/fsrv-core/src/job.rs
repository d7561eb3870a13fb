//! The `Job` value type — a unit of queued work.

use std::os::fd::OwnedFd;

/// A single accepted connection, carrying the scheduling metadata the
/// acceptor estimated for it.
///
/// `client_fd` is an `OwnedFd`: dropping a `Job` closes the socket exactly
/// once, even on paths that never explicitly call `close` (e.g. a
/// scheduler overwritten in place, or a pool torn down with jobs still
/// queued).
pub struct Job {
    /// Owned handle for the connected stream socket. Transferred into the
    /// queue by the acceptor; consumed and closed by exactly one worker.
    pub client_fd: OwnedFd,
    /// Non-negative estimate of response body size in bytes, or `0` for
    /// "unknown". Immutable after submission.
    pub est_cost: u64,
    /// Reserved tie-break, currently unused by either policy but present
    /// in the schema.
    pub priority: i32,
    /// Monotonic millisecond timestamp at submission; the SJF tie-break.
    pub arrival_ms: u64,
}

impl Job {
    /// Construct a job with `priority = 0`, as used by the `submit`
    /// convenience wrapper.
    pub fn new(client_fd: OwnedFd, est_cost: u64, arrival_ms: u64) -> Self {
        Self {
            client_fd,
            est_cost,
            priority: 0,
            arrival_ms,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::os::fd::AsRawFd;
        f.debug_struct("Job")
            .field("client_fd", &self.client_fd.as_raw_fd())
            .field("est_cost", &self.est_cost)
            .field("priority", &self.priority)
            .field("arrival_ms", &self.arrival_ms)
            .finish()
    }
}
