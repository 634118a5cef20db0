use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PortError, Result};
use crate::sys::{self, Readiness};
use crate::traits::{PortSettings, StreamPort};

/// Virtual endpoint reached over a Unix domain socket.
///
/// Useful for bridging to software peers (terminal emulators behind socat,
/// simulators, test harnesses) that expose a stream socket instead of a
/// device node. The baud rate in [`PortSettings`] is carried for reporting
/// only.
pub struct UnixSocketPort {
    settings: PortSettings,
    stream: Option<UnixStream>,
    write_timeout: Duration,
}

impl UnixSocketPort {
    /// Default upper bound on a blocked write.
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a closed port that will connect to the socket at `settings.name`.
    pub fn new(settings: PortSettings) -> Self {
        Self {
            settings,
            stream: None,
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Wrap an already connected stream (e.g. one half of `UnixStream::pair`).
    pub fn from_stream(settings: PortSettings, stream: UnixStream) -> Result<Self> {
        stream
            .set_write_timeout(Some(Self::DEFAULT_WRITE_TIMEOUT))
            .map_err(|e| PortError::io(&settings.name, e))?;
        Ok(Self {
            settings,
            stream: Some(stream),
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Override how long a write may block.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Socket path this port connects to.
    pub fn path(&self) -> &Path {
        Path::new(&self.settings.name)
    }

    fn stream_mut(&mut self) -> Result<&mut UnixStream> {
        let name = &self.settings.name;
        self.stream.as_mut().ok_or_else(|| PortError::not_open(name))
    }
}

impl StreamPort for UnixSocketPort {
    fn settings(&self) -> &PortSettings {
        &self.settings
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let path_len = self.settings.name.len();
        if path_len >= Self::MAX_PATH_LEN {
            return Err(PortError::Open {
                port: self.settings.name.clone(),
                source: std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("socket path too long ({path_len} bytes, max {})", Self::MAX_PATH_LEN),
                ),
            });
        }

        let stream = UnixStream::connect(&self.settings.name).map_err(|source| PortError::Open {
            port: self.settings.name.clone(),
            source,
        })?;
        stream
            .set_write_timeout(Some(self.write_timeout))
            .map_err(|source| PortError::Open {
                port: self.settings.name.clone(),
                source,
            })?;

        info!(port = %self.settings.name, "connected to unix domain socket");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.shutdown(std::net::Shutdown::Both) {
                // Already torn down by the peer; the descriptor is released regardless.
                debug!(port = %self.settings.name, error = %err, "socket shutdown failed");
            }
            info!(port = %self.settings.name, "closed unix domain socket");
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let name = self.settings.name.clone();
        let fd = self.stream_mut()?.as_raw_fd();
        let pending = sys::bytes_available(fd).map_err(|e| PortError::io(&name, e))?;
        if pending > 0 {
            return Ok(pending);
        }

        // An empty queue is also what a hung-up peer looks like.
        match sys::wait_readable(fd, Duration::ZERO).map_err(|e| PortError::io(&name, e))? {
            Readiness::HungUp => Err(PortError::Disconnected { port: name }),
            Readiness::Readable if sys::peer_closed(fd).map_err(|e| PortError::io(&name, e))? => {
                Err(PortError::Disconnected { port: name })
            }
            _ => Ok(0),
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let name = self.settings.name.clone();
        let stream = self.stream_mut()?;
        if buf.is_empty() {
            return Ok(0);
        }

        match sys::wait_readable(stream.as_raw_fd(), timeout).map_err(|e| PortError::io(&name, e))? {
            Readiness::TimedOut => return Ok(0),
            Readiness::HungUp => return Err(PortError::Disconnected { port: name }),
            Readiness::Readable => {}
        }

        loop {
            match stream.read(buf) {
                Ok(0) => return Err(PortError::Disconnected { port: name }),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(PortError::io(&name, err)),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let name = self.settings.name.clone();
        let stream = self.stream_mut()?;

        let mut offset = 0usize;
        while offset < data.len() {
            match stream.write(&data[offset..]) {
                Ok(0) => return Err(PortError::Disconnected { port: name }),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(PortError::Disconnected { port: name })
                }
                Err(err) => return Err(PortError::io(&name, err)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let name = self.settings.name.clone();
        let stream = self.stream_mut()?;
        loop {
            match stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PortError::io(&name, err)),
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut scratch = [0u8; 256];
        loop {
            let pending = self.bytes_available()?;
            if pending == 0 {
                return Ok(());
            }
            let want = pending.min(scratch.len());
            if self.read(&mut scratch[..want], Duration::ZERO)? == 0 {
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for UnixSocketPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketPort")
            .field("path", &self.settings.name)
            .field("open", &self.stream.is_some())
            .finish()
    }
}
