//! Thin libc helpers shared by the file-descriptor backed ports.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Readiness reported by [`wait_readable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Readable,
    HungUp,
    TimedOut,
}

/// Bytes queued for reading on `fd` (`FIONREAD`).
pub(crate) fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: `pending` is a valid writable c_int for the duration of the call
    // and `fd` is an open descriptor owned by the calling port.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(pending.max(0) as usize)
}

/// Whether the peer of stream socket `fd` has shut down its sending side.
///
/// Peeks one byte without blocking: a zero-length result is end of stream.
pub(crate) fn peer_closed(fd: RawFd) -> io::Result<bool> {
    let mut byte = 0u8;
    // SAFETY: `byte` is a valid one-byte buffer and MSG_PEEK leaves it unread.
    let rc = unsafe {
        libc::recv(
            fd,
            &mut byte as *mut u8 as *mut libc::c_void,
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    if rc == -1 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(false),
            _ => Err(err),
        };
    }
    Ok(rc == 0)
}

/// Wait until `fd` is readable, hung up, or `timeout` elapses.
pub(crate) fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<Readiness> {
    wait_for(fd, libc::POLLIN, timeout)
}

/// Wait until `fd` accepts more output.
pub(crate) fn wait_writable(fd: RawFd, timeout: Duration) -> io::Result<Readiness> {
    wait_for(fd, libc::POLLOUT, timeout)
}

fn wait_for(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<Readiness> {
    let timeout_ms = poll_timeout_ms(timeout);
    loop {
        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        // SAFETY: `pfd` is a single valid pollfd and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }
        if pfd.revents & events != 0 {
            return Ok(Readiness::Readable);
        }
        if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
            return Ok(Readiness::HungUp);
        }
        return Ok(Readiness::TimedOut);
    }
}

fn poll_timeout_ms(timeout: Duration) -> libc::c_int {
    let ms = timeout.as_millis();
    if ms == 0 && !timeout.is_zero() {
        return 1;
    }
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}
