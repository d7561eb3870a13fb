//! Listener helper: create/bind/listen a TCP socket.
//!
//! Raw `libc::socket`/`setsockopt`/`bind`/`listen` rather than
//! `std::net::TcpListener`, so the acceptor can later peek with
//! `MSG_PEEK` and the handler can call `sendfile(2)` on the same raw fd
//! without fighting a second socket abstraction.

use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd};

use fsrv_core::LISTEN_BACKLOG;

/// Bind and listen on `0.0.0.0:port`. `SO_REUSEADDR` is set so a restart
/// doesn't hit `EADDRINUSE` against sockets still in `TIME_WAIT`.
pub fn bind_listener(port: u16) -> io::Result<OwnedFd> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = OwnedFd::from_raw_fd(fd);

        let opt: libc::c_int = 1;
        let rc = libc::setsockopt(
            raw(&fd),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const libc::c_void,
            mem::size_of_val(&opt) as libc::socklen_t,
        );
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addr: libc::sockaddr_in = mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        addr.sin_port = port.to_be();

        let rc = libc::bind(
            raw(&fd),
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        );
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let rc = libc::listen(raw(&fd), LISTEN_BACKLOG);
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(fd)
    }
}

fn raw(fd: &OwnedFd) -> libc::c_int {
    use std::os::fd::AsRawFd;
    fd.as_raw_fd()
}
