//! serialring - SPSC byte rings driven over a POSIX serial device
//!
//! A serial port driver core: two lock-free single-producer/single-consumer
//! byte rings plus one background worker that couples them to a configured
//! TTY with `poll(2)` and scatter/gather I/O. User-facing reads and writes
//! never block; progress is reported through callbacks fired from the worker
//! thread.
//!
//! # Key pieces
//!
//! - [`Ring`] - bounded SPSC byte queue with atomic head/tail and two-span
//!   region access for vectored device I/O
//! - [`SerialConfig`] - baudrate/framing/flow-control line parameters
//! - [`SerialEvents`] - capability object receiving rx/tx-empty/close
//!   callbacks
//! - [`Serial`] - the handle: create, open, read/write/available, close
//!
//! # Example
//!
//! ```no_run
//! use serialring::{Serial, SerialConfig};
//! use std::sync::Arc;
//!
//! let serial = Serial::create(1024, 1024, Arc::new(()))?;
//! serial.open("/dev/ttyUSB0", &SerialConfig::new(115200))?;
//!
//! serial.write(b"AT\r\n");
//!
//! let mut buf = [0u8; 64];
//! let n = serial.read(&mut buf);
//! println!("got {n} bytes");
//!
//! serial.close();
//! # Ok::<(), serialring::SerialError>(())
//! ```

#[cfg(not(unix))]
compile_error!("serialring targets POSIX terminal semantics and requires a unix platform");

mod config;
mod error;
mod invariants;
mod notify;
mod port;
mod ring;
mod serial;
mod worker;

pub use config::SerialConfig;
pub use error::SerialError;
pub use ring::Ring;
pub use serial::{Serial, SerialEvents};
