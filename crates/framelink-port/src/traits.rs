use std::time::Duration;

use crate::error::Result;

/// Default line rate used when none is configured.
pub const DEFAULT_BAUD: u32 = 9600;

/// Identity and line rate of a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Device path, socket path or fake name.
    pub name: String,
    /// Baud rate. Ignored by transports without a line rate.
    pub baud: u32,
}

impl PortSettings {
    pub fn new(name: impl Into<String>, baud: u32) -> Self {
        Self {
            name: name.into(),
            baud,
        }
    }
}

/// A byte-oriented connection that can be opened, polled and closed.
///
/// This is the only I/O surface the codec and the bridge depend on. Every
/// method except `open`, `close` and the accessors fails with
/// [`PortError::NotOpen`](crate::PortError::NotOpen) while the port is closed.
pub trait StreamPort {
    /// Identity and rate this port was created with.
    fn settings(&self) -> &PortSettings;

    /// Port identity, used in logs and errors.
    fn name(&self) -> &str {
        &self.settings().name
    }

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Open the port. Opening an already open port is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Close the port. Closing a closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout` for the first one.
    ///
    /// Returns `Ok(0)` when the timeout elapses with nothing to read.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Block until written bytes have been handed to the transport.
    fn flush(&mut self) -> Result<()>;

    /// Discard any stale input buffered before the caller started reading.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: StreamPort + ?Sized> StreamPort for Box<P> {
    fn settings(&self) -> &PortSettings {
        (**self).settings()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }
}

/// A port that can be moved to the bridge thread.
pub type BoxedPort = Box<dyn StreamPort + Send>;
