//! Lock-free counter bank with a periodic reporter thread.
//!
//! A single process-wide bank, meant to be shared behind an `Arc` and
//! threaded through the pool and acceptor rather than living behind
//! per-worker-local statics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Monotonically non-decreasing counters, all updated with relaxed-atomic
/// adds — lock-free and safe under concurrent increments.
#[derive(Default)]
pub struct Metrics {
    submits_total: AtomicU64,
    submits_est0: AtomicU64,
    pops_total: AtomicU64,
    requests_total: AtomicU64,
    bytes_total: AtomicU64,
    errors_total: AtomicU64,
    sum_latency_ms: AtomicU64,
    running: AtomicBool,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// `requests_total += 1; bytes_total += bytes; sum_latency_ms +=
    /// latency_ms`; `errors_total += 1` iff `status < 200 || status >= 400`.
    pub fn record_request(&self, latency_ms: u64, bytes: u64, status: u16) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes, Ordering::Relaxed);
        self.sum_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if status < 200 || status >= 400 {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `submits_total += 1`; `submits_est0 += 1` iff `est == 0`.
    pub fn inc_submit(&self, est: u64) {
        self.submits_total.fetch_add(1, Ordering::Relaxed);
        if est == 0 {
            self.submits_est0.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `pops_total += 1`.
    pub fn inc_pop(&self) {
        self.pops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    pub fn submits_total(&self) -> u64 {
        self.submits_total.load(Ordering::Relaxed)
    }

    pub fn submits_est0(&self) -> u64 {
        self.submits_est0.load(Ordering::Relaxed)
    }

    pub fn pops_total(&self) -> u64 {
        self.pops_total.load(Ordering::Relaxed)
    }

    pub fn sum_latency_ms(&self) -> u64 {
        self.sum_latency_ms.load(Ordering::Relaxed)
    }

    /// Spawn the reporter thread. Sleeps 5 seconds, prints one line to the
    /// diagnostic stream (stderr), then repeats until `shutdown` is called.
    /// Best-effort: if the thread can't be started, logs and returns
    /// `None` rather than aborting the process — the server runs on
    /// without periodic stats.
    pub fn spawn_reporter(self: &std::sync::Arc<Self>) -> Option<JoinHandle<()>> {
        self.running.store(true, Ordering::Relaxed);
        let metrics = std::sync::Arc::clone(self);
        match std::thread::Builder::new()
            .name("metrics-reporter".into())
            .spawn(move || metrics.report_loop())
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("fsrv: metrics reporter failed to start: {e}");
                self.running.store(false, Ordering::Relaxed);
                None
            }
        }
    }

    fn report_loop(&self) {
        let start = Instant::now();
        let mut last_requests = 0u64;
        let mut last_bytes = 0u64;
        let mut last_report = start;

        while self.running.load(Ordering::Relaxed) {
            std::thread::sleep(REPORT_INTERVAL);
            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_report).as_secs_f64().max(1e-9);

            let requests = self.requests_total();
            let bytes = self.bytes_total();
            let errors = self.errors_total();
            let submits = self.submits_total();
            let submits_est0 = self.submits_est0();
            let pops = self.pops_total();
            let sum_latency = self.sum_latency_ms();

            let req_per_sec = (requests - last_requests) as f64 / elapsed;
            let mb_per_sec = (bytes - last_bytes) as f64 / elapsed / (1024.0 * 1024.0);
            let avg_latency_ms = if requests > 0 {
                sum_latency as f64 / requests as f64
            } else {
                0.0
            };
            let est0_pct = if submits > 0 {
                100.0 * submits_est0 as f64 / submits as f64
            } else {
                0.0
            };

            eprintln!(
                "metrics: t={:.1}s requests={} req/s={:.1} mb/s={:.3} avg_latency_ms={:.2} errors={} submits={} est0%={:.1} pops={}",
                now.duration_since(start).as_secs_f64(),
                requests,
                req_per_sec,
                mb_per_sec,
                avg_latency_ms,
                errors,
                submits,
                est0_pct,
                pops,
            );

            last_requests = requests;
            last_bytes = bytes;
            last_report = now;
        }
    }

    /// Flag cleared; caller should `join` the handle returned by
    /// `spawn_reporter` afterward.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_marks_non_2xx_3xx_as_errors() {
        let m = Metrics::new();
        m.record_request(5, 100, 200);
        m.record_request(5, 0, 404);
        m.record_request(5, 0, 500);
        m.record_request(5, 0, 301);
        assert_eq!(m.requests_total(), 4);
        assert_eq!(m.errors_total(), 2);
        assert_eq!(m.bytes_total(), 100);
        assert_eq!(m.sum_latency_ms(), 20);
    }

    #[test]
    fn inc_submit_counts_unknown_estimates() {
        let m = Metrics::new();
        m.inc_submit(0);
        m.inc_submit(128);
        m.inc_submit(0);
        assert_eq!(m.submits_total(), 3);
        assert_eq!(m.submits_est0(), 2);
    }

    #[test]
    fn inc_pop_is_monotonic() {
        let m = Metrics::new();
        for _ in 0..5 {
            m.inc_pop();
        }
        assert_eq!(m.pops_total(), 5);
    }

    #[test]
    fn counters_are_safe_under_concurrent_increments() {
        use std::sync::Arc;
        use std::thread;

        let m = Arc::new(Metrics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let m = Arc::clone(&m);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    m.record_request(1, 1, 200);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.requests_total(), 4000);
        assert_eq!(m.bytes_total(), 4000);
    }
}
