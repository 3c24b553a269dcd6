use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Block until a stream can accept more bytes.
///
/// Streams handed to the send worker are non-blocking (the same descriptor
/// is read by the event loop), so a full socket buffer surfaces as
/// `WouldBlock`. Writers call this before retrying.
pub trait WaitWritable {
    fn wait_writable(&self) -> io::Result<()>;
}

impl WaitWritable for UnixStream {
    fn wait_writable(&self) -> io::Result<()> {
        poll_fd(self.as_raw_fd(), libc::POLLOUT, -1).map(|_| ())
    }
}

impl<T: WaitWritable + ?Sized> WaitWritable for &T {
    fn wait_writable(&self) -> io::Result<()> {
        (**self).wait_writable()
    }
}

/// Wait up to `timeout_ms` (-1 for no limit) for `events` on `fd`.
///
/// Returns false on timeout.
pub(crate) fn poll_fd(
    fd: RawFd,
    events: libc::c_short,
    timeout_ms: libc::c_int,
) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc >= 0 {
            // POLLERR/POLLHUP are reported by the next read or write call.
            return Ok(rc > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Credentials of the process on the other end of a Unix socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

/// Get the credentials of the connected peer (Linux only).
#[cfg(target_os = "linux")]
pub fn peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    let fd = stream.as_raw_fd();
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
    // and `fd` is an open Unix socket descriptor owned by this process.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
        Some(PeerCredentials {
            uid: cred.uid,
            gid: cred.gid,
            pid: cred.pid as u32,
        })
    } else {
        None
    }
}

/// Get the credentials of the connected peer.
///
/// Returns `None` on platforms that do not expose peer credentials.
#[cfg(not(target_os = "linux"))]
pub fn peer_credentials(_stream: &UnixStream) -> Option<PeerCredentials> {
    None
}
