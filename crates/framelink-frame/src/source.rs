use std::io::{ErrorKind, Read};
use std::time::Duration;

use framelink_port::StreamPort;

use crate::error::{FrameError, Result};

/// A pull-based byte source the decoder scans.
///
/// `None` / a short count means the source timed out or ran out of data;
/// the decoder turns that into [`DecodeOutcome::NoData`](crate::DecodeOutcome::NoData).
pub trait ByteSource {
    /// Read one byte, or `None` if nothing arrived in time.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Fill as much of `buf` as arrives in time and return how much was read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        for (filled, slot) in buf.iter_mut().enumerate() {
            match self.read_byte()? {
                Some(byte) => *slot = byte,
                None => return Ok(filled),
            }
        }
        Ok(buf.len())
    }
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let Some((&first, rest)) = self.split_first() else {
            return Ok(None);
        };
        *self = rest;
        Ok(Some(first))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.len());
        let (head, rest) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = rest;
        Ok(n)
    }
}

/// Adapts a `std::io::Read` stream.
///
/// End of stream, `WouldBlock` and `TimedOut` all count as "no more data";
/// interrupted reads are retried.
pub struct ReadSource<R> {
    inner: R,
}

impl<R: Read> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok((self.read_bytes(&mut byte)? == 1).then_some(byte[0]))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(filled)
    }
}

/// Reads from a [`StreamPort`], waiting at most `timeout` per read call.
pub struct PortSource<'a, P: ?Sized> {
    port: &'a mut P,
    timeout: Duration,
}

impl<'a, P: StreamPort + ?Sized> PortSource<'a, P> {
    pub fn new(port: &'a mut P, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl<P: StreamPort + ?Sized> ByteSource for PortSource<'_, P> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = self.port.read(&mut byte, self.timeout)?;
        Ok((n == 1).then_some(byte[0]))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = self.port.read(&mut buf[filled..], self.timeout)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}
