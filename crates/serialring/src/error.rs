//! Error types for serial handle operations.

use thiserror::Error;

/// Errors surfaced by handle creation and `open`.
///
/// Runtime device failures are never surfaced through this type: the worker
/// treats them as terminal for the session and reports them only by firing
/// the close callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerialError {
    /// The handle is not in a state that allows the operation.
    #[error("invalid state")]
    InvalidState,

    /// Ring or handle allocation failed.
    #[error("memory allocation error")]
    Memory,

    /// A descriptor-level operation failed (pipe creation, fcntl).
    #[error("IO error")]
    Io,

    /// The baudrate has no terminal speed constant on this platform.
    #[error("invalid baudrate")]
    Baudrate,

    /// Byte size outside 5..=8.
    #[error("invalid byte size")]
    Bytesize,

    /// Parity is not one of 'N', 'E', 'O', 'M', 'S'.
    #[error("invalid parity")]
    Parity,

    /// Stop bits other than 1 or 2.
    #[error("invalid stop bits")]
    Stopbits,

    /// The device could not be opened.
    #[error("open error")]
    Open,

    /// Fetching or applying terminal attributes failed.
    #[error("termios error")]
    Termios,

    /// The worker thread could not be spawned.
    #[error("thread create error")]
    Thread,

    /// A device ioctl failed. Reserved for modem-line control.
    #[error("ioctl error")]
    Ioctl,
}

impl SerialError {
    /// Returns `true` for configuration errors: `open` failed before touching
    /// any resource state and the handle can be reopened with fixed
    /// parameters.
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Baudrate | Self::Bytesize | Self::Parity | Self::Stopbits
        )
    }

    /// Returns `true` for resource errors: the environment, not the
    /// parameters, rejected the operation.
    #[inline]
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Self::Memory | Self::Io | Self::Open | Self::Termios | Self::Thread | Self::Ioctl
        )
    }
}
