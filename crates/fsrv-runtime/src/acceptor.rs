//! Acceptor / estimator loop.
//!
//! Owns the listening socket. Each accepted connection is peeked
//! (non-consuming) to estimate the eventual response size before the job
//! is submitted, so the SJF policy has something to schedule on.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use fsrv_core::Job;

use crate::http;
use crate::pool::{SubmitOutcome, WorkerPool};
use crate::time::monotonic_ms;

const PEEK_BUF_SIZE: usize = 4095;

enum AcceptAttempt {
    Connected(OwnedFd),
    Interrupted,
    Fatal,
}

/// Accept, peek+parse, estimate cost, submit job — looping until `running`
/// is cleared or a non-`EINTR` accept error occurs.
pub fn run_acceptor_loop(listener_fd: RawFd, pool: &WorkerPool, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        match accept_once(listener_fd) {
            AcceptAttempt::Connected(client_fd) => {
                let est_cost = estimate_cost(std::os::fd::AsRawFd::as_raw_fd(&client_fd), pool.docroot());
                let job = Job::new(client_fd, est_cost, monotonic_ms());
                // On `ShutDown`, `submit_estimated` consumed the job (and
                // with it the `OwnedFd`), so the socket is already closed
                // when submission is rejected.
                let _ = pool.submit_estimated(job);
            }
            AcceptAttempt::Interrupted => continue,
            AcceptAttempt::Fatal => break,
        }
    }
}

fn accept_once(listener_fd: RawFd) -> AcceptAttempt {
    let rc = unsafe { libc::accept(listener_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if rc >= 0 {
        return AcceptAttempt::Connected(unsafe { OwnedFd::from_raw_fd(rc) });
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINTR) => AcceptAttempt::Interrupted,
        _ => AcceptAttempt::Fatal,
    }
}

/// Best-effort peek estimate: a non-consuming read of up to 4095 bytes,
/// parsed the same way the handler parses a request line. Any failure at
/// any step leaves `est_cost = 0` — a slow or partial sender simply
/// yields a 0 estimate.
fn estimate_cost(fd: RawFd, docroot: &str) -> u64 {
    let mut buf = [0u8; PEEK_BUF_SIZE];
    let n = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            PEEK_BUF_SIZE,
            libc::MSG_PEEK,
        )
    };
    if n <= 0 {
        return 0;
    }

    let data = &buf[..n as usize];
    let parsed = match http::parse_request_line(data) {
        Some(p) => p,
        None => return 0,
    };
    if http::has_traversal(parsed.path) {
        return 0;
    }
    let fs_path = match http::resolve_fs_path(docroot, parsed.path) {
        Some(p) => p,
        None => return 0,
    };

    match std::fs::metadata(&fs_path) {
        Ok(meta) if meta.is_dir() => std::fs::metadata(fs_path.join("index.html"))
            .map(|m| m.len())
            .unwrap_or(0),
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}
