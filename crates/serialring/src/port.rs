//! Device open and line-discipline configuration.
//!
//! The attribute edits are pure functions over `libc::termios` so the flag
//! algebra can be tested without a device; `open_port` wires them to the
//! `tcgetattr`/`tcsetattr` round trip.

use crate::{SerialConfig, SerialError};
use std::ffi::CString;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

fn speed_constant(baudrate: u32) -> Result<libc::speed_t, SerialError> {
    let speed = match baudrate {
        0 => libc::B0,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460800 => libc::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        500000 => libc::B500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        576000 => libc::B576000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921600 => libc::B921600,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1000000 => libc::B1000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1152000 => libc::B1152000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1500000 => libc::B1500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        2000000 => libc::B2000000,
        _ => return Err(SerialError::Baudrate),
    };

    Ok(speed)
}

fn set_baudrate(attr: &mut libc::termios, baudrate: u32) -> Result<(), SerialError> {
    let speed = speed_constant(baudrate)?;

    // SAFETY: attr is a valid termios block.
    if unsafe { libc::cfsetispeed(attr, speed) } != 0 {
        return Err(SerialError::Baudrate);
    }
    // SAFETY: same attr, still valid.
    if unsafe { libc::cfsetospeed(attr, speed) } != 0 {
        return Err(SerialError::Baudrate);
    }

    Ok(())
}

fn set_bytesize(attr: &mut libc::termios, bytesize: u8) -> Result<(), SerialError> {
    attr.c_cflag &= !libc::CSIZE;

    attr.c_cflag |= match bytesize {
        5 => libc::CS5,
        6 => libc::CS6,
        7 => libc::CS7,
        8 => libc::CS8,
        _ => return Err(SerialError::Bytesize),
    };

    Ok(())
}

fn set_parity(attr: &mut libc::termios, parity: char) -> Result<(), SerialError> {
    attr.c_iflag &= !(libc::INPCK | libc::ISTRIP);

    match parity {
        'N' => {
            attr.c_cflag &= !(libc::PARENB | libc::PARODD);
        }
        'E' => {
            attr.c_cflag &= !libc::PARODD;
            attr.c_cflag |= libc::PARENB;
        }
        'O' => {
            attr.c_cflag |= libc::PARENB | libc::PARODD;
        }
        // Mark/space parity needs CMSPAR; platforms without it fall back to
        // generic odd/even.
        'M' => {
            attr.c_cflag |= libc::PARENB | libc::PARODD;
            #[cfg(any(target_os = "linux", target_os = "android"))]
            {
                attr.c_cflag |= libc::CMSPAR;
            }
        }
        'S' => {
            attr.c_cflag &= !libc::PARODD;
            attr.c_cflag |= libc::PARENB;
            #[cfg(any(target_os = "linux", target_os = "android"))]
            {
                attr.c_cflag |= libc::CMSPAR;
            }
        }
        _ => return Err(SerialError::Parity),
    }

    Ok(())
}

fn set_stopbits(attr: &mut libc::termios, stopbits: u8) -> Result<(), SerialError> {
    match stopbits {
        1 => attr.c_cflag &= !libc::CSTOPB,
        2 => attr.c_cflag |= libc::CSTOPB,
        _ => return Err(SerialError::Stopbits),
    }

    Ok(())
}

fn set_xonxoff(attr: &mut libc::termios, xonxoff: bool) {
    if xonxoff {
        attr.c_iflag |= libc::IXON | libc::IXOFF | libc::IXANY;
    } else {
        attr.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    }
}

fn set_rtscts(attr: &mut libc::termios, rtscts: bool) {
    if rtscts {
        attr.c_cflag |= libc::CRTSCTS;
    } else {
        attr.c_cflag &= !libc::CRTSCTS;
    }
}

fn set_dsrdtr(_attr: &mut libc::termios, _dsrdtr: bool) {
    // Reserved.
}

/// Edits a fetched attribute block into the raw byte-pump discipline.
///
/// Canonical input translations, output post-processing and all echo/signal
/// processing go away; the receiver is enabled and modem control lines are
/// ignored. `VMIN = 0, VTIME = 0` keeps read semantics consistent with the
/// non-blocking descriptor.
fn configure_attrs(attr: &mut libc::termios, config: &SerialConfig) -> Result<(), SerialError> {
    attr.c_iflag &= !(libc::IGNBRK | libc::INLCR | libc::IGNCR | libc::ICRNL);
    attr.c_oflag &= !(libc::OPOST | libc::ONLCR | libc::OCRNL);
    attr.c_cflag |= libc::CREAD | libc::CLOCAL;
    attr.c_lflag &= !(libc::ISIG
        | libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::IEXTEN);

    attr.c_cc[libc::VMIN] = 0;
    attr.c_cc[libc::VTIME] = 0;

    set_baudrate(attr, config.baudrate)?;
    set_bytesize(attr, config.bytesize)?;
    set_parity(attr, config.parity)?;
    set_stopbits(attr, config.stopbits)?;
    set_xonxoff(attr, config.xonxoff);
    set_rtscts(attr, config.rtscts);
    set_dsrdtr(attr, config.dsrdtr);

    Ok(())
}

/// Opens the device read-write, non-blocking, without becoming its
/// controlling terminal, and applies `config` immediately.
///
/// On any failure the descriptor is closed before returning.
pub(crate) fn open_port(path: &str, config: &SerialConfig) -> Result<OwnedFd, SerialError> {
    let cpath = CString::new(path).map_err(|_| SerialError::Open)?;

    // SAFETY: cpath is a valid NUL-terminated string.
    let raw = unsafe {
        libc::open(
            cpath.as_ptr(),
            libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
        )
    };
    if raw < 0 {
        return Err(SerialError::Open);
    }
    // SAFETY: raw is a freshly opened descriptor we exclusively own.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // SAFETY: fd is open; attr is zero-initialized storage tcgetattr fills.
    let mut attr = unsafe { mem::zeroed::<libc::termios>() };
    if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut attr) } != 0 {
        return Err(SerialError::Termios);
    }

    configure_attrs(&mut attr, config)?;

    // SAFETY: fd is open and attr was filled by tcgetattr.
    if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &attr) } != 0 {
        return Err(SerialError::Termios);
    }

    log::debug!(
        "opened {} at {}-{}-{}-{}",
        path,
        config.baudrate,
        config.bytesize,
        config.parity,
        config.stopbits
    );

    Ok(fd)
}
