//! The serial handle: user-facing façade over the rings and the worker.

use crate::notify::{notify_pair, NotifySender};
use crate::worker::Worker;
use crate::{port, Ring, SerialConfig, SerialError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Progress callbacks, invoked from the worker thread.
///
/// This is the capability object a handle is created with: implementations
/// carry whatever user state the callbacks need. All methods default to
/// no-ops, and `()` implements the trait as the null object. Receiving code
/// is responsible for marshalling to its own execution context; none of
/// these methods should block the worker for long.
pub trait SerialEvents: Send + Sync {
    /// Bytes arrived in the inbound ring and can now be `read`.
    ///
    /// Multiple ring advances may coalesce into a single invocation.
    fn on_rx(&self) {}

    /// A device write drained the outbound ring to empty.
    fn on_tx_empty(&self) {}

    /// The worker released its descriptors and is about to terminate.
    ///
    /// Invoked exactly once per session, whether shutdown came from `close`
    /// or from a device failure. Must not drop the handle (that would join
    /// the worker from inside the worker).
    fn on_close(&self) {}
}

/// Null capability object for callers that only poll.
impl SerialEvents for () {}

/// State shared between the handle and the worker thread.
pub(crate) struct Shared {
    /// Device-to-user ring: the worker produces, the user consumes.
    pub(crate) inbound: Ring,
    /// User-to-device ring: the user produces, the worker consumes.
    pub(crate) outbound: Ring,
    /// Session shutdown flag. Writers store Release, readers load Acquire.
    pub(crate) closing: AtomicBool,
    pub(crate) events: Arc<dyn SerialEvents>,
}

/// An asynchronous serial port handle.
///
/// `read` and `write` move bytes between caller buffers and the rings and
/// never block; the background worker couples the rings to the device.
/// Lifecycle: created → open → running → closing → closed; `open` is only
/// valid on a freshly created handle, `close` is idempotent, and dropping
/// the handle joins the worker.
///
/// The façade may be used from any thread, but each ring supports one
/// concurrent user-side caller: at most one thread reading and one thread
/// writing at a time.
pub struct Serial {
    shared: Arc<Shared>,
    notify_tx: Mutex<Option<NotifySender>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Serial {
    /// Creates a closed handle with the given ring capacities.
    ///
    /// No descriptors are opened and no worker is started until `open`.
    pub fn create(
        in_capacity: usize,
        out_capacity: usize,
        events: Arc<dyn SerialEvents>,
    ) -> Result<Self, SerialError> {
        let inbound = Ring::new(in_capacity)?;
        let outbound = Ring::new(out_capacity)?;

        Ok(Self {
            shared: Arc::new(Shared {
                inbound,
                outbound,
                closing: AtomicBool::new(false),
                events,
            }),
            notify_tx: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Opens and configures the device, then starts the worker.
    ///
    /// Valid only on a handle that has never been opened or closed;
    /// otherwise `InvalidState`. On failure every descriptor acquired so far
    /// is released and the handle stays reopenable.
    pub fn open(&self, path: &str, config: &SerialConfig) -> Result<(), SerialError> {
        let mut tx_slot = self
            .notify_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut worker_slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if self.shared.closing.load(Ordering::Acquire)
            || tx_slot.is_some()
            || worker_slot.is_some()
        {
            return Err(SerialError::InvalidState);
        }

        let port_fd = port::open_port(path, config)?;
        let (tx, rx) = notify_pair().map_err(|_| SerialError::Io)?;

        let worker = Worker::new(Arc::clone(&self.shared), port_fd, rx);
        let handle = thread::Builder::new()
            .name("serial-io".into())
            .spawn(move || worker.run())
            .map_err(|_| SerialError::Thread)?;

        *tx_slot = Some(tx);
        *worker_slot = Some(handle);

        Ok(())
    }

    /// Requests shutdown without waiting for it.
    ///
    /// Sets the closing flag, wakes the worker once and closes the wakeup
    /// write end. Idempotent. The worker reacts within one wake round and
    /// fires the close callback; dropping the handle performs the join.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::Release);

        let mut tx_slot = self
            .notify_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx_slot.take() {
            tx.wake();
        }
    }

    /// Copies up to `out.len()` received bytes out of the inbound ring.
    ///
    /// Returns the number of bytes copied; never blocks, never fails. Wakes
    /// the worker so it can refill the freed space.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let got = self.shared.inbound.read(out);
        self.wake();
        got
    }

    /// Enqueues up to `data.len()` bytes into the outbound ring.
    ///
    /// Returns the number of bytes enqueued (0 when the ring is full); never
    /// blocks, never fails. Wakes the worker so it can start transmitting.
    pub fn write(&self, data: &[u8]) -> usize {
        let put = self.shared.outbound.write(data);
        self.wake();
        put
    }

    /// Number of received bytes currently readable.
    pub fn available(&self) -> usize {
        self.shared.inbound.len()
    }

    /// The capability object the handle was created with.
    pub fn events(&self) -> &Arc<dyn SerialEvents> {
        &self.shared.events
    }

    fn wake(&self) {
        let tx_slot = self
            .notify_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx_slot.as_ref() {
            tx.wake();
        }
    }
}

impl Drop for Serial {
    /// Shuts the session down and joins the worker.
    ///
    /// Must not run inside this handle's own close callback.
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);

        if let Some(tx) = self
            .notify_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tx.wake();
        }

        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_handle_moves_bytes_through_rings_only() {
        let serial = Serial::create(8, 8, Arc::new(())).unwrap();

        // No worker: writes land in the outbound ring and stay there.
        assert_eq!(serial.write(b"abcdef"), 6);
        assert_eq!(serial.write(b"ghijkl"), 2);
        assert_eq!(serial.write(b"x"), 0);

        // Nothing was ever received.
        let mut out = [0u8; 8];
        assert_eq!(serial.read(&mut out), 0);
        assert_eq!(serial.available(), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_reopen() {
        let serial = Serial::create(8, 8, Arc::new(())).unwrap();

        serial.close();
        serial.close();

        let err = serial
            .open("/dev/null", &SerialConfig::default())
            .unwrap_err();
        assert_eq!(err, SerialError::InvalidState);
    }

    #[test]
    fn test_open_failure_leaves_handle_reopenable() {
        let serial = Serial::create(8, 8, Arc::new(())).unwrap();

        let err = serial
            .open("/dev/serialring-no-such-device", &SerialConfig::default())
            .unwrap_err();
        assert_eq!(err, SerialError::Open);

        // Not a terminal: attribute fetch fails, descriptors are released,
        // and the handle is still in its created state.
        let err = serial
            .open("/dev/null", &SerialConfig::default())
            .unwrap_err();
        assert_eq!(err, SerialError::Termios);
    }

    #[test]
    fn test_drop_without_open_is_clean() {
        let serial = Serial::create(1024, 1024, Arc::new(())).unwrap();
        serial.write(b"pending");
        drop(serial);
    }
}
