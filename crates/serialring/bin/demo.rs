//! Loopback demo over a pseudo-terminal pair.
//!
//! Opens a pty, attaches a serial handle to the slave end, and echoes a
//! message through the master end back into the handle.
//!
//! Run with: `cargo run --bin serialring-demo`

use serialring::{Serial, SerialConfig, SerialEvents};
use std::ffi::CStr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Printer {
    rx_events: AtomicUsize,
}

impl SerialEvents for Printer {
    fn on_rx(&self) {
        self.rx_events.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tx_empty(&self) {
        println!("[events] outbound ring drained");
    }

    fn on_close(&self) {
        println!("[events] session closed");
    }
}

fn open_pty() -> (OwnedFd, String) {
    // SAFETY: standard pty allocation sequence over freshly created fds.
    unsafe {
        let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(master >= 0, "posix_openpt failed");
        assert_eq!(libc::grantpt(master), 0);
        assert_eq!(libc::unlockpt(master), 0);

        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(master, name.as_mut_ptr(), name.len()), 0);
        let path = CStr::from_ptr(name.as_ptr()).to_str().unwrap().to_owned();

        (OwnedFd::from_raw_fd(master), path)
    }
}

fn main() {
    env_logger::init();

    let (master, path) = open_pty();
    println!("pty slave: {path}");

    let events = Arc::new(Printer {
        rx_events: AtomicUsize::new(0),
    });
    let serial = Serial::create(1024, 1024, events.clone()).expect("create failed");
    serial
        .open(&path, &SerialConfig::new(115200))
        .expect("open failed");

    let message = b"hello over the wire";
    serial.write(message);
    println!("wrote {} bytes", message.len());

    // Peer side: read what the handle transmitted, send it straight back.
    let mut buf = [0u8; 64];
    let mut echoed = 0usize;
    while echoed < message.len() {
        // SAFETY: buf is valid writable storage.
        let n = unsafe {
            libc::read(
                master.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if n > 0 {
            // SAFETY: the first n bytes were just filled.
            unsafe { libc::write(master.as_raw_fd(), buf.as_ptr().cast(), n as usize) };
            echoed += n as usize;
        } else {
            thread::sleep(Duration::from_millis(1));
        }
    }

    while serial.available() < message.len() {
        thread::sleep(Duration::from_millis(1));
    }

    let mut out = [0u8; 64];
    let n = serial.read(&mut out);
    println!(
        "read back {n} bytes: {:?} (rx callbacks: {})",
        String::from_utf8_lossy(&out[..n]),
        events.rx_events.load(Ordering::SeqCst)
    );

    serial.close();
    thread::sleep(Duration::from_millis(20));
}
