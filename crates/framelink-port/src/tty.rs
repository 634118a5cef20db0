use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PortError, Result};
use crate::sys::{self, Readiness};
use crate::traits::{PortSettings, StreamPort};

/// Serial device port (UART, USB CDC-ACM, pty).
///
/// The line is switched to raw 8N1 mode at the configured baud rate. Paths
/// that are not terminals (FIFOs, character devices without termios) are
/// accepted as-is so the same port type can drive test fixtures.
pub struct TtyPort {
    settings: PortSettings,
    file: Option<File>,
    write_timeout: Duration,
}

impl TtyPort {
    /// Default upper bound on waiting for the device to accept output.
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Create a closed port for `settings`.
    pub fn new(settings: PortSettings) -> Self {
        Self {
            settings,
            file: None,
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Override how long a write may wait for the device to drain.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    fn fd(&self) -> Result<RawFd> {
        self.file
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| PortError::not_open(&self.settings.name))
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        let name = &self.settings.name;
        self.file.as_mut().ok_or_else(|| PortError::not_open(name))
    }
}

impl StreamPort for TtyPort {
    fn settings(&self) -> &PortSettings {
        &self.settings
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let speed = baud_constant(self.settings.baud).ok_or_else(|| PortError::UnsupportedBaud {
            port: self.settings.name.clone(),
            baud: self.settings.baud,
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.settings.name)
            .map_err(|source| PortError::Open {
                port: self.settings.name.clone(),
                source,
            })?;

        configure_raw(file.as_raw_fd(), speed, &self.settings.name).map_err(|source| {
            PortError::Open {
                port: self.settings.name.clone(),
                source,
            }
        })?;

        info!(port = %self.settings.name, baud = self.settings.baud, "opened serial port");
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            info!(port = %self.settings.name, "closed serial port");
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let fd = self.fd()?;
        sys::bytes_available(fd).map_err(|e| PortError::io(&self.settings.name, e))
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Ok(0);
        }

        match sys::wait_readable(fd, timeout).map_err(|e| PortError::io(&self.settings.name, e))? {
            Readiness::TimedOut => return Ok(0),
            Readiness::HungUp => {
                return Err(PortError::Disconnected {
                    port: self.settings.name.clone(),
                })
            }
            Readiness::Readable => {}
        }

        let name = self.settings.name.clone();
        let file = self.file_mut()?;
        loop {
            match file.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(PortError::io(&name, err)),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let fd = self.fd()?;
        let name = self.settings.name.clone();
        let write_timeout = self.write_timeout;
        let file = self.file_mut()?;

        let mut offset = 0usize;
        while offset < data.len() {
            match file.write(&data[offset..]) {
                Ok(0) => return Err(PortError::Disconnected { port: name }),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    match sys::wait_writable(fd, write_timeout)
                        .map_err(|e| PortError::io(&name, e))?
                    {
                        Readiness::Readable => continue,
                        Readiness::HungUp => return Err(PortError::Disconnected { port: name }),
                        Readiness::TimedOut => {
                            return Err(PortError::io(
                                &name,
                                std::io::Error::from(ErrorKind::TimedOut),
                            ))
                        }
                    }
                }
                Err(err) => return Err(PortError::io(&name, err)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let fd = self.fd()?;
        loop {
            // SAFETY: `fd` is an open descriptor owned by this port.
            if unsafe { libc::tcdrain(fd) } == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ENOTTY) | Some(libc::EINVAL) => return Ok(()),
                _ => return Err(PortError::io(&self.settings.name, err)),
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        let fd = self.fd()?;
        // SAFETY: `fd` is an open descriptor owned by this port.
        if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOTTY) | Some(libc::EINVAL) => Ok(()),
            _ => Err(PortError::io(&self.settings.name, err)),
        }
    }
}

impl std::fmt::Debug for TtyPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtyPort")
            .field("name", &self.settings.name)
            .field("baud", &self.settings.baud)
            .field("open", &self.file.is_some())
            .finish()
    }
}

/// Put `fd` into raw mode at `speed`. Non-terminals are left untouched.
fn configure_raw(fd: RawFd, speed: libc::speed_t, name: &str) -> std::io::Result<()> {
    // SAFETY: termios is a plain C struct; all-zero is a valid bit pattern and
    // tcgetattr overwrites it before use.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `tio` is a valid writable termios and `fd` is open.
    if unsafe { libc::tcgetattr(fd, &mut tio) } == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOTTY) {
            debug!(port = %name, "not a terminal; skipping line configuration");
            return Ok(());
        }
        return Err(err);
    }

    // SAFETY: `tio` was initialised by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        if libc::cfsetispeed(&mut tio, speed) == -1 || libc::cfsetospeed(&mut tio, speed) == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is fully initialised and `fd` is open.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Map a numeric baud rate to its termios speed constant.
pub fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}
