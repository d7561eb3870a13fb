//! The bounded scheduler abstraction.
//!
//! Two concrete policies exist — FIFO and SJF — wrapped in a closed
//! two-variant enum rather than a trait object: a fixed enum lets the pool
//! hold a `Scheduler` inline instead of paying a `Box<dyn Trait>`
//! indirection, and makes a hot-swap a plain value replacement under the
//! pool lock.
//!
//! Neither `push` nor `pop` may block or allocate past construction:
//! blocking is the `WorkerPool`'s job.

mod fifo;
mod sjf;

pub use fifo::FifoScheduler;
pub use sjf::SjfScheduler;

use crate::job::Job;

/// Outcome of a `push`. On `Full`, the job is handed back so the caller
/// (the pool, holding the lock) can wait on `not_full` and retry the same
/// job rather than losing it.
pub enum PushOutcome {
    Accepted,
    Full(Job),
}

/// Outcome of a `pop`.
pub enum PopOutcome {
    Job(Job),
    Empty,
}

/// Which policy a `Scheduler` is currently running — used for diagnostics
/// and for the `--scheduler`/`SCHEDULER` selection logic in the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Fifo,
    Sjf,
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerKind::Fifo => write!(f, "fifo"),
            SchedulerKind::Sjf => write!(f, "sjf"),
        }
    }
}

/// The pool's queue: one bounded container over a pluggable ordering
/// discipline. Invariants hold regardless of policy: `0 <= len() <=
/// capacity()`, `push` returns `Full` iff `len() == capacity()`, `pop`
/// returns `Empty` iff `len() == 0`.
pub enum Scheduler {
    Fifo(FifoScheduler),
    Sjf(SjfScheduler),
}

impl Scheduler {
    pub fn fifo(capacity: usize) -> Self {
        Scheduler::Fifo(FifoScheduler::new(capacity))
    }

    pub fn sjf(capacity: usize) -> Self {
        Scheduler::Sjf(SjfScheduler::new(capacity))
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            Scheduler::Fifo(_) => SchedulerKind::Fifo,
            Scheduler::Sjf(_) => SchedulerKind::Sjf,
        }
    }

    pub fn push(&mut self, job: Job) -> PushOutcome {
        match self {
            Scheduler::Fifo(s) => s.push(job),
            Scheduler::Sjf(s) => s.push(job),
        }
    }

    pub fn pop(&mut self) -> PopOutcome {
        match self {
            Scheduler::Fifo(s) => s.pop(),
            Scheduler::Sjf(s) => s.pop(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Scheduler::Fifo(s) => s.len(),
            Scheduler::Sjf(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            Scheduler::Fifo(s) => s.capacity(),
            Scheduler::Sjf(s) => s.capacity(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Drain every queued job out of `self`, in pop order, for the
    /// hot-swap path: jobs already queued under the old policy are fed
    /// into the new one rather than dropped.
    pub fn drain(&mut self) -> Vec<Job> {
        let mut out = Vec::with_capacity(self.len());
        loop {
            match self.pop() {
                PopOutcome::Job(job) => out.push(job),
                PopOutcome::Empty => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    /// A job never touches the fd's validity for queue-ordering tests, so
    /// tests synthesize fds with the well-known closed/invalid value and
    /// never let the `OwnedFd` actually close anything meaningful — we
    /// instead build on `/dev/null` duplicates so Drop is harmless.
    fn test_job(est_cost: u64, arrival_ms: u64) -> Job {
        let fd = unsafe { libc_dup_devnull() };
        Job::new(fd, est_cost, arrival_ms)
    }

    /// Minimal stand-in for an owned fd in tests: opens `/dev/null`
    /// read-only so closing it on `Drop` is always safe.
    unsafe fn libc_dup_devnull() -> std::os::fd::OwnedFd {
        use std::fs::File;
        use std::os::fd::IntoRawFd;
        let f = File::open("/dev/null").expect("/dev/null must exist for scheduler tests");
        std::os::fd::OwnedFd::from_raw_fd(f.into_raw_fd())
    }

    #[test]
    fn fifo_preserves_arrival_order() {
        let mut s = Scheduler::fifo(4);
        for (cost, arrival) in [(0, 100), (0, 101), (0, 102)] {
            matches!(s.push(test_job(cost, arrival)), PushOutcome::Accepted);
        }
        let mut order = Vec::new();
        loop {
            match s.pop() {
                PopOutcome::Job(j) => order.push(j.arrival_ms),
                PopOutcome::Empty => break,
            }
        }
        assert_eq!(order, vec![100, 101, 102]);
    }

    #[test]
    fn sjf_orders_by_cost_then_arrival() {
        let mut s = Scheduler::sjf(8);
        for (cost, arrival) in [(500, 1), (100, 2), (100, 3), (0, 4)] {
            matches!(s.push(test_job(cost, arrival)), PushOutcome::Accepted);
        }
        let mut order = Vec::new();
        loop {
            match s.pop() {
                PopOutcome::Job(j) => order.push(j.arrival_ms),
                PopOutcome::Empty => break,
            }
        }
        // D(0,4), B(100,2), C(100,3), A(500,1)
        assert_eq!(order, vec![4, 2, 3, 1]);
    }

    #[test]
    fn push_returns_full_and_hands_job_back() {
        let mut s = Scheduler::fifo(1);
        assert!(matches!(s.push(test_job(0, 0)), PushOutcome::Accepted));
        match s.push(test_job(0, 1)) {
            PushOutcome::Full(job) => assert_eq!(job.arrival_ms, 1),
            PushOutcome::Accepted => panic!("expected Full"),
        }
    }

    #[test]
    fn pop_returns_empty_on_empty_queue() {
        let mut s = Scheduler::sjf(4);
        assert!(matches!(s.pop(), PopOutcome::Empty));
    }

    #[test]
    fn drain_yields_all_queued_jobs_in_pop_order() {
        let mut s = Scheduler::sjf(4);
        for (cost, arrival) in [(3, 1), (1, 2), (2, 3)] {
            let _ = s.push(test_job(cost, arrival));
        }
        let drained = s.drain();
        let costs: Vec<u64> = drained.iter().map(|j| j.est_cost).collect();
        assert_eq!(costs, vec![1, 2, 3]);
        assert!(s.is_empty());
    }
}
