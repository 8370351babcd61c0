//! Self-pipe wakeup between user-facing code and the I/O worker.
//!
//! Any user action that changes what the worker should wait for (queued
//! bytes, drained bytes, close) writes one byte into the pipe; the worker
//! polls the read end alongside the device. Concurrent wakeups coalesce and
//! are drained as a batch. Dropping the sender closes the write end, which
//! the worker observes as EOF/hangup and takes as the shutdown signal.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Write end, held by user-facing code.
pub(crate) struct NotifySender {
    fd: OwnedFd,
}

/// Read end, polled and drained by the worker.
pub(crate) struct NotifyReceiver {
    fd: OwnedFd,
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fd is an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same descriptor, valid flag word.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Creates the pipe with both ends non-blocking.
pub(crate) fn notify_pair() -> io::Result<(NotifySender, NotifyReceiver)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds is valid storage for two descriptors.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are exclusively ours.
    let (r, w) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    set_nonblocking(r.as_raw_fd())?;
    set_nonblocking(w.as_raw_fd())?;

    Ok((NotifySender { fd: w }, NotifyReceiver { fd: r }))
}

impl NotifySender {
    /// Queues one wakeup byte. Fire and forget: a full pipe already holds a
    /// pending wakeup, and any other failure is handled on the worker side.
    pub(crate) fn wake(&self) {
        let byte = [b'x'];
        // SAFETY: fd is open and byte points at one readable byte.
        let _ = unsafe { libc::write(self.fd.as_raw_fd(), byte.as_ptr().cast(), 1) };
    }
}

impl NotifyReceiver {
    /// Consumes all pending wakeup bytes.
    ///
    /// EOF (writer closed) and `EAGAIN` (pipe empty) both mean quiescent;
    /// `EINTR` is retried; anything else is fatal for the session.
    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 1024];

        loop {
            // SAFETY: buf is valid writable storage of the given length.
            let n = unsafe {
                libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len())
            };

            if n > 0 {
                continue;
            }
            if n == 0 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(()),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }
}

impl AsRawFd for NotifyReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wakeups_coalesce_into_one_drain() {
        let (tx, rx) = notify_pair().unwrap();

        tx.wake();
        tx.wake();
        tx.wake();

        rx.drain().unwrap();
        // Pipe now empty; drain stays quiescent instead of blocking.
        rx.drain().unwrap();
    }

    #[test]
    fn test_closed_sender_reads_as_quiescent() {
        let (tx, rx) = notify_pair().unwrap();
        tx.wake();
        drop(tx);

        rx.drain().unwrap();
        rx.drain().unwrap();
    }
}
