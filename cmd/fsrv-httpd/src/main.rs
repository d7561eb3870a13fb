//! # fsrv-httpd
//!
//! Multi-threaded HTTP/1.x file server: a fixed-size worker pool drains a
//! bounded job queue fed by one acceptor thread, with a pluggable FIFO or
//! shortest-job-first scheduling policy.
//!
//! ## Usage
//!
//!     fsrv-httpd [port] [num_workers] [docroot] [--scheduler=fifo|sjf]
//!
//! Defaults: port `8080`, 4 workers, docroot `./www`, scheduler `sjf`.
//! `SCHEDULER` may set the policy via environment; `--scheduler` on the
//! command line always wins over it.

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fsrv_core::{Metrics, SchedulerKind, QUEUE_CAPACITY};
use fsrv_runtime::{bind_listener, run_acceptor_loop, WorkerPool};

static RUNNING: AtomicBool = AtomicBool::new(true);

struct Config {
    port: u16,
    num_workers: usize,
    docroot: String,
    scheduler: SchedulerKind,
}

fn parse_scheduler(raw: &str) -> Option<SchedulerKind> {
    match raw.to_ascii_lowercase().as_str() {
        "fifo" => Some(SchedulerKind::Fifo),
        "sjf" => Some(SchedulerKind::Sjf),
        _ => None,
    }
}

/// Positional `<port> <num_workers> <docroot>`, plus `--scheduler=` with
/// `SCHEDULER` env fallback — CLI overrides env.
fn parse_config(args: &[String]) -> Config {
    let mut port: u16 = 8080;
    let mut num_workers: usize = 4;
    let mut docroot: String = "./www".to_string();
    let mut scheduler_flag: Option<String> = None;

    let mut positionals = Vec::with_capacity(3);
    for arg in &args[1..] {
        if let Some(value) = arg.strip_prefix("--scheduler=") {
            scheduler_flag = Some(value.to_string());
        } else {
            positionals.push(arg.clone());
        }
    }

    if let Some(p) = positionals.first().and_then(|s| s.parse().ok()) {
        port = p;
    }
    if let Some(w) = positionals.get(1).and_then(|s| s.parse().ok()) {
        num_workers = w;
    }
    if let Some(d) = positionals.get(2) {
        docroot = d.clone();
    }

    let env_scheduler = std::env::var("SCHEDULER").ok();
    let requested = scheduler_flag.or(env_scheduler);
    let scheduler = match requested {
        Some(raw) => parse_scheduler(&raw).unwrap_or_else(|| {
            eprintln!("fsrv-httpd: unknown scheduler '{raw}', falling back to sjf");
            SchedulerKind::Sjf
        }),
        None => SchedulerKind::Sjf,
    };

    Config {
        port,
        num_workers,
        docroot,
        scheduler,
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = parse_config(&args);

    eprintln!(
        "fsrv-httpd: port={} workers={} docroot={} scheduler={} capacity={}",
        config.port, config.num_workers, config.docroot, config.scheduler, QUEUE_CAPACITY,
    );

    let listener = match bind_listener(config.port) {
        Ok(fd) => fd,
        Err(e) => {
            eprintln!("fsrv-httpd: failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    let metrics = Arc::new(Metrics::new());
    let pool = match WorkerPool::create(
        config.num_workers,
        QUEUE_CAPACITY,
        config.docroot.clone(),
        config.scheduler,
        Arc::clone(&metrics),
    ) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("fsrv-httpd: failed to start worker pool: {e}");
            std::process::exit(1);
        }
    };

    unsafe {
        libc::signal(libc::SIGINT, handle_signal as usize);
        libc::signal(libc::SIGTERM, handle_signal as usize);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let reporter = metrics.spawn_reporter();

    eprintln!("fsrv-httpd: listening on http://0.0.0.0:{}/", config.port);
    run_acceptor_loop(listener.as_raw_fd(), &pool, &RUNNING);

    // Shutdown order: drain and join the pool, then close the listening
    // socket, then stop the metrics reporter.
    eprintln!("fsrv-httpd: shutting down, draining worker pool");
    pool.shutdown();
    drop(listener);
    metrics.shutdown();
    if let Some(reporter) = reporter {
        let _ = reporter.join();
    }

    eprintln!(
        "fsrv-httpd: shutdown complete — {} requests served, {} errors",
        metrics.requests_total(),
        metrics.errors_total(),
    );
}

extern "C" fn handle_signal(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}
