//! The background I/O worker.
//!
//! One thread per open handle. Each cycle drains pending wakeups, pumps the
//! device into the inbound ring and the outbound ring into the device with
//! scatter/gather I/O, then blocks in `poll(2)` until the device is ready or
//! a wakeup arrives. Device-layer errors are terminal for the session: the
//! worker releases its descriptors and fires the close callback.

use crate::notify::NotifyReceiver;
use crate::serial::Shared;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const NOTIFY: usize = 0;
const PORT: usize = 1;

pub(crate) struct Worker {
    shared: Arc<Shared>,
    port: OwnedFd,
    notify: NotifyReceiver,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>, port: OwnedFd, notify: NotifyReceiver) -> Self {
        Self {
            shared,
            port,
            notify,
        }
    }

    pub(crate) fn run(self) {
        let Self {
            shared,
            port,
            notify,
        } = self;

        log::debug!("serial worker started");
        pump_loop(&shared, &port, &notify);

        shared.closing.store(true, Ordering::Release);

        // The worker-owned descriptors are released exactly once, before the
        // close callback observes the session as gone.
        drop(port);
        drop(notify);

        shared.events.on_close();
        log::debug!("serial worker stopped");
    }
}

fn pump_loop(shared: &Shared, port: &OwnedFd, notify: &NotifyReceiver) {
    let mut fds = [
        libc::pollfd {
            fd: notify.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: port.as_raw_fd(),
            events: 0,
            revents: 0,
        },
    ];

    loop {
        if shared.closing.load(Ordering::Acquire) {
            return;
        }

        // Anything beyond plain readiness on either descriptor (hangup,
        // error, invalid fd) ends the session.
        if fds[NOTIFY].revents & !libc::POLLIN != 0 {
            log::debug!("wakeup pipe closed, shutting down");
            return;
        }
        if fds[PORT].revents & !(libc::POLLIN | libc::POLLOUT) != 0 {
            log::warn!("device poll reported {:#x}", fds[PORT].revents);
            return;
        }

        if let Err(err) = notify.drain() {
            log::warn!("wakeup drain failed: {err}");
            return;
        }

        if let Err(err) = pump_rx(shared, port) {
            log::warn!("device read failed: {err}");
            return;
        }

        if let Err(err) = pump_tx(shared, port) {
            log::warn!("device write failed: {err}");
            return;
        }

        fds[PORT].events = 0;
        if shared.inbound.free() > 0 {
            fds[PORT].events |= libc::POLLIN;
        }
        if !shared.outbound.is_empty() {
            fds[PORT].events |= libc::POLLOUT;
        }

        fds[NOTIFY].revents = 0;
        fds[PORT].revents = 0;

        // SAFETY: fds points at two valid pollfd entries.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            log::warn!("poll failed: {err}");
            return;
        }
    }
}

/// Scatter-reads the device into the inbound ring's free spans.
fn pump_rx(shared: &Shared, port: &OwnedFd) -> io::Result<()> {
    let ring = &shared.inbound;

    let [(p0, n0), (p1, n1)] = ring.free_regions();
    if n0 == 0 && n1 == 0 {
        return Ok(());
    }

    let iov = [
        libc::iovec {
            iov_base: p0.cast(),
            iov_len: n0,
        },
        libc::iovec {
            iov_base: p1.cast(),
            iov_len: n1,
        },
    ];
    let cnt: libc::c_int = if n1 > 0 { 2 } else { 1 };

    // SAFETY: the iovecs cover the ring's free spans, reserved for this
    // producer until advance_tail publishes them.
    let n = unsafe { libc::readv(port.as_raw_fd(), iov.as_ptr(), cnt) };

    if n > 0 {
        ring.advance_tail(n as usize);
        shared.events.on_rx();
        return Ok(());
    }
    if n == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(()),
        _ => Err(err),
    }
}

/// Gather-writes the outbound ring's used spans to the device.
fn pump_tx(shared: &Shared, port: &OwnedFd) -> io::Result<()> {
    let ring = &shared.outbound;

    let [(p0, n0), (p1, n1)] = ring.used_regions();
    let queued = n0 + n1;
    if queued == 0 {
        return Ok(());
    }

    let iov = [
        libc::iovec {
            iov_base: p0.cast_mut().cast(),
            iov_len: n0,
        },
        libc::iovec {
            iov_base: p1.cast_mut().cast(),
            iov_len: n1,
        },
    ];
    let cnt: libc::c_int = if n1 > 0 { 2 } else { 1 };

    // SAFETY: the iovecs cover the ring's used spans, which stay in place
    // for this consumer until advance_head releases them.
    let n = unsafe { libc::writev(port.as_raw_fd(), iov.as_ptr(), cnt) };

    if n > 0 {
        ring.advance_head(n as usize);
        // Drained everything that was queued when this write started.
        if n as usize == queued {
            shared.events.on_tx_empty();
        }
        return Ok(());
    }
    if n == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(()),
        _ => Err(err),
    }
}
