//! Per-connection request handler.
//!
//! A restricted HTTP/1.x static file server: keep-alive up to
//! `MAX_KEEPALIVE_REQUESTS`, a 60-second idle receive timeout, traversal
//! guards, directory-index resolution, and zero-copy file transmission via
//! `sendfile(2)` with a read/write fallback. Uses raw `libc` socket calls
//! rather than `std::net::TcpStream` so the idle timeout and zero-copy
//! transmit are available directly.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

use fsrv_core::{Metrics, IDLE_TIMEOUT_SECONDS, MAX_KEEPALIVE_REQUESTS};

use crate::http;

const RECV_BUF_SIZE: usize = 8192;
const SEND_SCRATCH_SIZE: usize = 8192;

/// A named enum standing in for a 0/-1 return contract: `Closed` covers
/// every path where the caller should simply close the socket and move
/// on, `Terminal` covers the single fatal path.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Closed,
    Terminal,
}

/// Serve a connected socket. The caller (the worker) closes `fd` after
/// this returns — here that happens via the `Job`'s `OwnedFd` drop, so
/// this function only ever reads/writes the raw descriptor.
pub fn handle_connection(fd: RawFd, docroot: &str, metrics: &Metrics) -> ConnectionOutcome {
    if set_recv_timeout(fd, IDLE_TIMEOUT_SECONDS).is_err() {
        return ConnectionOutcome::Terminal;
    }

    let mut buf = [0u8; RECV_BUF_SIZE];

    for _ in 0..MAX_KEEPALIVE_REQUESTS {
        let start = Instant::now();

        let n = match recv_request(fd, &mut buf) {
            ReadResult::Data(n) => n,
            ReadResult::OrderlyClose | ReadResult::IdleTimeout => return ConnectionOutcome::Closed,
            ReadResult::Error => return ConnectionOutcome::Terminal,
        };

        let outcome = serve_one_request(fd, docroot, metrics, &buf[..n], start);
        match outcome {
            RequestOutcome::KeepAlive => continue,
            RequestOutcome::Close => return ConnectionOutcome::Closed,
            RequestOutcome::Terminal => return ConnectionOutcome::Terminal,
        }
    }

    ConnectionOutcome::Closed
}

enum RequestOutcome {
    KeepAlive,
    Close,
    Terminal,
}

fn serve_one_request(
    fd: RawFd,
    docroot: &str,
    metrics: &Metrics,
    request: &[u8],
    start: Instant,
) -> RequestOutcome {
    let parsed = match http::parse_request_line(request) {
        Some(p) => p,
        None => {
            return finish_error(fd, metrics, 400, false, start);
        }
    };

    let keep_alive = http::keep_alive_decision(request, parsed.version);

    if parsed.method != b"GET" && parsed.method != b"HEAD" {
        return finish_error(fd, metrics, 405, keep_alive, start);
    }
    let is_head = parsed.method == b"HEAD";

    if http::has_traversal(parsed.path) {
        return finish_error(fd, metrics, 403, keep_alive, start);
    }

    let fs_path = match http::resolve_fs_path(docroot, parsed.path) {
        Some(p) => p,
        None => return finish_error(fd, metrics, 404, keep_alive, start),
    };

    let resolved = match resolve_servable_file(&fs_path) {
        Ok(p) => p,
        Err(status) => return finish_error(fd, metrics, status, keep_alive, start),
    };

    let file = match File::open(&resolved) {
        Ok(f) => f,
        Err(_) => return finish_error(fd, metrics, 500, keep_alive, start),
    };

    let size = match file.metadata() {
        Ok(m) => m.len(),
        Err(_) => return finish_error(fd, metrics, 500, keep_alive, start),
    };

    let header = build_200_header(size, keep_alive);
    if send_all(fd, &header).is_err() {
        return RequestOutcome::Terminal;
    }

    if !is_head {
        // Body transmission failure after headers are already committed
        // is not fatal for the connection.
        let _ = transmit_body(fd, &file, size);
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    metrics.record_request(latency_ms, size, 200);

    if keep_alive {
        RequestOutcome::KeepAlive
    } else {
        RequestOutcome::Close
    }
}

fn finish_error(
    fd: RawFd,
    metrics: &Metrics,
    status: u16,
    keep_alive: bool,
    start: Instant,
) -> RequestOutcome {
    let response = build_error_response(status);
    let latency_ms = start.elapsed().as_millis() as u64;
    metrics.record_request(latency_ms, 0, status);

    if send_all(fd, &response).is_err() {
        return RequestOutcome::Terminal;
    }

    // Deliberate split, not an oversight: malformed request lines (400)
    // and disallowed methods (405) each carry their own explicit
    // "terminate the connection" instruction, independent of which
    // request number on the connection triggered them, so both close
    // unconditionally. Traversal (403) and missing-resource (404) are
    // validation failures on an otherwise well-formed request and honor
    // the keep-alive decision instead.
    match status {
        400 | 405 => RequestOutcome::Close,
        _ => {
            if keep_alive {
                RequestOutcome::KeepAlive
            } else {
                RequestOutcome::Close
            }
        }
    }
}

/// `stat` the path; missing ⇒ 404. If a directory, append `/index.html`
/// and stat again; missing index ⇒ 403.
fn resolve_servable_file(path: &std::path::Path) -> Result<std::path::PathBuf, u16> {
    let meta = std::fs::metadata(path).map_err(|_| 404u16)?;
    if meta.is_dir() {
        let index = path.join("index.html");
        std::fs::metadata(&index).map_err(|_| 403u16)?;
        Ok(index)
    } else {
        Ok(path.to_path_buf())
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

fn build_200_header(content_length: u64, keep_alive: bool) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        content_length,
        if keep_alive { "keep-alive" } else { "close" },
    )
    .into_bytes()
}

/// Error responses do not advertise a keep-alive header.
fn build_error_response(status: u16) -> Vec<u8> {
    let reason = status_reason(status);
    let body = format!("{status} {reason}\n");
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

enum ReadResult {
    Data(usize),
    OrderlyClose,
    IdleTimeout,
    Error,
}

/// Read one buffer: 0 is orderly close, timeout/would-block is idle
/// close, other errors are terminal, `EINTR` retries.
fn recv_request(fd: RawFd, buf: &mut [u8]) -> ReadResult {
    loop {
        let rc = unsafe {
            libc::recv(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if rc > 0 {
            return ReadResult::Data(rc as usize);
        }
        if rc == 0 {
            return ReadResult::OrderlyClose;
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => return ReadResult::IdleTimeout,
            _ => return ReadResult::Error,
        }
    }
}

/// Complete-write loop: retries partial sends and `EINTR` so every
/// socket write either fully lands or fails.
fn send_all(fd: RawFd, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let rc = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        buf = &buf[rc as usize..];
    }
    Ok(())
}

/// Zero-copy transmit via `sendfile(2)` when available, else a
/// read-into-buffer-then-write fallback with an 8 KiB scratch.
fn transmit_body(out_fd: RawFd, file: &File, size: u64) -> io::Result<()> {
    match sendfile_all(out_fd, file.as_raw_fd(), size) {
        Ok(()) => Ok(()),
        Err(err) if is_sendfile_unsupported(&err) => copy_via_buffer(out_fd, file),
        Err(err) => Err(err),
    }
}

fn is_sendfile_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP)
    )
}

fn sendfile_all(out_fd: RawFd, in_fd: RawFd, size: u64) -> io::Result<()> {
    let mut offset: libc::off_t = 0;
    let mut remaining = size;
    while remaining > 0 {
        let rc = unsafe {
            libc::sendfile(
                out_fd,
                in_fd,
                &mut offset as *mut libc::off_t,
                remaining as usize,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            break;
        }
        remaining -= rc as u64;
    }
    Ok(())
}

fn copy_via_buffer(out_fd: RawFd, mut file: &File) -> io::Result<()> {
    use std::io::Read;
    let mut scratch = [0u8; SEND_SCRATCH_SIZE];
    loop {
        let n = file.read(&mut scratch)?;
        if n == 0 {
            break;
        }
        send_all(out_fd, &scratch[..n])?;
    }
    Ok(())
}

fn set_recv_timeout(fd: RawFd, secs: u64) -> io::Result<()> {
    let tv = libc::timeval {
        tv_sec: secs as libc::time_t,
        tv_usec: 0,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::IntoRawFd;

    fn docroot_with(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    /// Spin up a real TCP loopback pair and hand the accepted side's raw
    /// fd to `handle_connection`, driving it from a second thread acting
    /// as the client — this exercises the real `recv`/`send`/`sendfile`
    /// syscalls rather than mocking them.
    fn serve_one(
        docroot: &std::path::Path,
        request: &[u8],
    ) -> (ConnectionOutcome, Vec<u8>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let request = request.to_vec();
        let client_thread = std::thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(&request).unwrap();
            client.shutdown(std::net::Shutdown::Write).unwrap();
            let mut response = Vec::new();
            use std::io::Read;
            client.read_to_end(&mut response).unwrap();
            response
        });

        let (accepted, _) = listener.accept().unwrap();
        let fd = accepted.into_raw_fd();
        let metrics = Metrics::new();
        let outcome = handle_connection(fd, docroot.to_str().unwrap(), &metrics);
        unsafe {
            libc::close(fd);
        }

        let response = client_thread.join().unwrap();
        (outcome, response)
    }

    #[test]
    fn serves_small_file_with_keep_alive() {
        let dir = docroot_with(&[("small.txt", b"hello")]);
        let (outcome, response) = serve_one(dir.path(), b"GET /small.txt HTTP/1.1\r\n\r\n");
        assert_eq!(outcome, ConnectionOutcome::Closed);
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5"));
        assert!(text.contains("Connection: keep-alive"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = docroot_with(&[("index.html", b"root")]);
        let (_, response) = serve_one(dir.path(), b"GET /../etc/passwd HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn missing_file_is_404() {
        let dir = docroot_with(&[]);
        let (_, response) = serve_one(dir.path(), b"GET /nope.txt HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn disallowed_method_is_405_and_closes() {
        let dir = docroot_with(&[("index.html", b"root")]);
        let (outcome, response) = serve_one(dir.path(), b"POST / HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed"));
        assert_eq!(outcome, ConnectionOutcome::Closed);
    }

    #[test]
    fn malformed_request_is_400() {
        let dir = docroot_with(&[]);
        let (_, response) = serve_one(dir.path(), b"\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn head_request_omits_body_but_keeps_content_length() {
        let dir = docroot_with(&[("small.txt", b"hello")]);
        let (_, response) = serve_one(dir.path(), b"HEAD /small.txt HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("Content-Length: 5"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn directory_request_serves_index() {
        let dir = docroot_with(&[("index.html", b"home page")]);
        let (_, response) = serve_one(dir.path(), b"GET / HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("home page"));
    }

    #[test]
    fn http_1_0_closes_after_one_request() {
        let dir = docroot_with(&[("small.txt", b"hi")]);
        let (_, response) = serve_one(dir.path(), b"GET /small.txt HTTP/1.0\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("Connection: close"));
    }

    /// 8 keep-alive requests succeed, then the
    /// connection is closed without the handler ever attempting a 9th
    /// `recv` — the client's next read observes EOF.
    #[test]
    fn keepalive_connection_closes_after_max_requests() {
        let dir = docroot_with(&[("ok.txt", b"ok")]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_thread = std::thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client
                .set_read_timeout(Some(std::time::Duration::from_secs(5)))
                .unwrap();

            for _ in 0..MAX_KEEPALIVE_REQUESTS {
                client.write_all(b"GET /ok.txt HTTP/1.1\r\n\r\n").unwrap();
                let mut buf = [0u8; 512];
                use std::io::Read;
                let n = client.read(&mut buf).unwrap();
                assert!(n > 0);
                let text = String::from_utf8_lossy(&buf[..n]);
                assert!(text.starts_with("HTTP/1.1 200 OK"));
                assert!(text.contains("Connection: keep-alive"));
            }

            let mut buf = [0u8; 8];
            use std::io::Read;
            client.read(&mut buf).unwrap()
        });

        let (accepted, _) = listener.accept().unwrap();
        let fd = accepted.into_raw_fd();
        let metrics = Metrics::new();
        let outcome = handle_connection(fd, dir.path().to_str().unwrap(), &metrics);
        unsafe {
            libc::close(fd);
        }

        assert_eq!(outcome, ConnectionOutcome::Closed);
        let ninth_read = client_thread.join().unwrap();
        assert_eq!(ninth_read, 0, "ninth read should observe EOF");
    }
}
