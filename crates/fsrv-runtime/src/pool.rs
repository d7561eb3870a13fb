//! The worker pool: N workers around a bounded scheduler under one mutex
//! with paired full/empty condition variables.
//!
//! A `Mutex`-guarded queue, a `Condvar` for waking parked consumers, and
//! `notify_one` on push versus `notify_all` on shutdown, plus a matching
//! producer-side `not_full` condvar so a full queue applies backpressure
//! to submitters instead of growing unbounded.

use std::os::fd::OwnedFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use fsrv_core::{FsrvError, FsrvResult, Job, Metrics, PopOutcome, PushOutcome, Scheduler, SchedulerKind};

use crate::handler;
use crate::time::monotonic_ms;

struct PoolState {
    scheduler: Scheduler,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    not_empty: Condvar,
    not_full: Condvar,
    docroot: Arc<str>,
    metrics: Arc<Metrics>,
    capacity: usize,
}

/// Outcome of a submission attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    ShutDown,
}

/// Owns the scheduler (swappable), the worker thread set, the docroot,
/// and the pool lock/condvars.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `nworkers` threads, best-effort: a failed spawn is logged
    /// and the pool continues with fewer workers. Only if
    /// *every* requested worker fails to start does `create` return an
    /// error — a pool with zero workers can never drain its queue.
    pub fn create(
        nworkers: usize,
        capacity: usize,
        docroot: String,
        scheduler_kind: SchedulerKind,
        metrics: Arc<Metrics>,
    ) -> FsrvResult<Self> {
        let scheduler = match scheduler_kind {
            SchedulerKind::Fifo => Scheduler::fifo(capacity),
            SchedulerKind::Sjf => Scheduler::sjf(capacity),
        };

        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                scheduler,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            docroot: Arc::from(docroot.as_str()),
            metrics,
            capacity,
        });

        let mut workers = Vec::with_capacity(nworkers);
        for wid in 0..nworkers {
            let inner_clone = Arc::clone(&inner);
            match std::thread::Builder::new()
                .name(format!("fsrv-worker-{wid}"))
                .spawn(move || worker_loop(inner_clone))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => eprintln!("fsrv: worker {wid} failed to start: {e}"),
            }
        }

        if nworkers > 0 && workers.is_empty() {
            return Err(FsrvError::PoolCreate(
                "all worker threads failed to start".into(),
            ));
        }

        Ok(Self { inner, workers })
    }

    pub fn docroot(&self) -> &str {
        &self.inner.docroot
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.inner.state.lock().unwrap().scheduler.kind()
    }

    /// Thin wrapper constructing a job with `est_cost=0`, `priority=0`,
    /// `arrival_ms=now`.
    pub fn submit(&self, client_fd: OwnedFd) -> SubmitOutcome {
        let job = Job::new(client_fd, 0, monotonic_ms());
        self.submit_job(job)
    }

    /// Primary entry point: acquire the lock; if shutdown, reject; else
    /// push, waiting on `not_full` and retrying the same job until it
    /// succeeds or shutdown is observed. Signals `not_empty` on success.
    pub fn submit_job(&self, job: Job) -> SubmitOutcome {
        let est = job.est_cost;
        let mut job = job;
        let mut guard = self.inner.state.lock().unwrap();
        loop {
            if guard.shutdown {
                return SubmitOutcome::ShutDown;
            }
            match guard.scheduler.push(job) {
                PushOutcome::Accepted => {
                    self.inner.metrics.inc_submit(est);
                    self.inner.not_empty.notify_one();
                    return SubmitOutcome::Accepted;
                }
                PushOutcome::Full(returned) => {
                    job = returned;
                    guard = self.inner.not_full.wait(guard).unwrap();
                }
            }
        }
    }

    /// Submit a fully-estimated job (used by the acceptor, which already
    /// knows `est_cost`/`arrival_ms`), recording the estimate in metrics
    /// before the push is attempted.
    pub fn submit_estimated(&self, job: Job) -> SubmitOutcome {
        let est = job.est_cost;
        let mut job = job;
        let mut guard = self.inner.state.lock().unwrap();
        loop {
            if guard.shutdown {
                return SubmitOutcome::ShutDown;
            }
            match guard.scheduler.push(job) {
                PushOutcome::Accepted => {
                    self.inner.metrics.inc_submit(est);
                    self.inner.not_empty.notify_one();
                    return SubmitOutcome::Accepted;
                }
                PushOutcome::Full(returned) => {
                    job = returned;
                    guard = self.inner.not_full.wait(guard).unwrap();
                }
            }
        }
    }

    /// Hot-swap the live scheduler: drain the current scheduler into a
    /// freshly constructed one of the requested kind under the pool lock,
    /// then adopt it ("drain old into new" rather than requiring the old
    /// scheduler to already be idle).
    pub fn set_scheduler(&self, kind: SchedulerKind) -> FsrvResult<()> {
        let mut guard = self.inner.state.lock().unwrap();
        let mut replacement = match kind {
            SchedulerKind::Fifo => Scheduler::fifo(self.inner.capacity),
            SchedulerKind::Sjf => Scheduler::sjf(self.inner.capacity),
        };
        for job in guard.scheduler.drain() {
            match replacement.push(job) {
                PushOutcome::Accepted => {}
                PushOutcome::Full(_) => {
                    return Err(FsrvError::SchedulerCreate(
                        "replacement scheduler capacity smaller than drained queue".into(),
                    ));
                }
            }
        }
        guard.scheduler = replacement;
        self.inner.not_empty.notify_all();
        Ok(())
    }

    /// Sets shutdown, broadcasts `not_empty`, joins all started workers.
    /// Queued jobs are drained (processed) by the workers themselves
    /// before they exit — see `worker_loop`.
    pub fn shutdown(mut self) {
        {
            let mut guard = self.inner.state.lock().unwrap();
            guard.shutdown = true;
        }
        self.inner.not_empty.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        let job = {
            let mut guard = inner.state.lock().unwrap();
            loop {
                match guard.scheduler.pop() {
                    PopOutcome::Job(job) => {
                        inner.metrics.inc_pop();
                        inner.not_full.notify_one();
                        break Some(job);
                    }
                    PopOutcome::Empty => {
                        if guard.shutdown {
                            break None;
                        }
                        guard = inner.not_empty.wait(guard).unwrap();
                    }
                }
            }
        };

        match job {
            Some(job) => process_job(job, &inner.docroot, &inner.metrics),
            None => break,
        }
    }
}

fn process_job(job: Job, docroot: &str, metrics: &Metrics) {
    use std::os::fd::AsRawFd;
    let fd = job.client_fd.as_raw_fd();
    let _ = handler::handle_connection(fd, docroot, metrics);
    // `job` drops here, closing `client_fd` exactly once regardless of
    // which path `handle_connection` returned through.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::{FromRawFd, IntoRawFd};
    use std::sync::Arc;

    fn devnull_fd() -> OwnedFd {
        let f = File::open("/dev/null").unwrap();
        unsafe { OwnedFd::from_raw_fd(f.into_raw_fd()) }
    }

    #[test]
    fn submit_and_drain_round_trip_through_real_workers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hi").unwrap();
        let metrics = Arc::new(Metrics::new());
        let pool = WorkerPool::create(
            2,
            8,
            dir.path().to_str().unwrap().to_string(),
            SchedulerKind::Fifo,
            metrics.clone(),
        )
        .unwrap();

        for _ in 0..5 {
            assert_eq!(pool.submit(devnull_fd()), SubmitOutcome::Accepted);
        }

        // Give workers a chance to drain; they'll fail each /dev/null
        // "connection" immediately (it's not a socket) but that still
        // exercises submit -> pop -> process -> close end to end.
        std::thread::sleep(std::time::Duration::from_millis(100));

        pool.shutdown();
    }

    #[test]
    fn submission_after_shutdown_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(Metrics::new());
        let pool = WorkerPool::create(
            1,
            4,
            dir.path().to_str().unwrap().to_string(),
            SchedulerKind::Fifo,
            metrics,
        )
        .unwrap();

        let inner = Arc::clone(&pool.inner);
        {
            let mut guard = inner.state.lock().unwrap();
            guard.shutdown = true;
        }
        inner.not_empty.notify_all();

        assert_eq!(pool.submit(devnull_fd()), SubmitOutcome::ShutDown);

        // Manually mark joined since we hand-set shutdown above instead
        // of going through `shutdown()`.
        drop(pool);
    }

    #[test]
    fn set_scheduler_preserves_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(Metrics::new());
        let pool = WorkerPool::create(
            0,
            4,
            dir.path().to_str().unwrap().to_string(),
            SchedulerKind::Fifo,
            metrics,
        );
        // nworkers=0 is degenerate (no threads start, no error since
        // nworkers==0 != "all requested workers failed"); used here only
        // to inspect queue contents without a worker draining them.
        let pool = pool.unwrap();

        for _ in 0..3 {
            assert_eq!(pool.submit(devnull_fd()), SubmitOutcome::Accepted);
        }

        pool.set_scheduler(SchedulerKind::Sjf).unwrap();
        assert_eq!(pool.scheduler_kind(), SchedulerKind::Sjf);

        let mut guard = pool.inner.state.lock().unwrap();
        assert_eq!(guard.scheduler.len(), 3);
        while !matches!(guard.scheduler.pop(), PopOutcome::Empty) {}
    }

    /// Bounded-queue backpressure: capacity 2, a third concurrent submitter
    /// blocks until a (simulated) worker consumes a job, then proceeds,
    /// with no submission lost.
    #[test]
    fn bounded_queue_applies_backpressure_until_a_slot_frees() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(Metrics::new());
        let pool = Arc::new(
            WorkerPool::create(
                0,
                2,
                dir.path().to_str().unwrap().to_string(),
                SchedulerKind::Fifo,
                metrics,
            )
            .unwrap(),
        );

        assert_eq!(pool.submit(devnull_fd()), SubmitOutcome::Accepted);
        assert_eq!(pool.submit(devnull_fd()), SubmitOutcome::Accepted);

        let pool_clone = Arc::clone(&pool);
        let blocked = std::thread::spawn(move || pool_clone.submit(devnull_fd()));

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!blocked.is_finished(), "third submitter should still be blocked");

        {
            let mut guard = pool.inner.state.lock().unwrap();
            assert!(matches!(guard.scheduler.pop(), PopOutcome::Job(_)));
        }
        pool.inner.not_full.notify_one();

        assert_eq!(blocked.join().unwrap(), SubmitOutcome::Accepted);
    }
}
