use bytes::{Bytes, BytesMut};
use framelink_port::StreamPort;
use tracing::debug;

use crate::codec::{decode, encode_frame, DecodeOutcome, FrameConfig, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};
use crate::source::PortSource;

/// Sends and receives complete frames over one [`StreamPort`].
///
/// Corrupt or oversized frames on the receive side are skipped silently;
/// callers only ever see whole, checksum-verified payloads.
pub struct FrameTransceiver<P> {
    port: P,
    buf: BytesMut,
    config: FrameConfig,
}

impl<P: StreamPort> FrameTransceiver<P> {
    /// Create a transceiver with default configuration.
    pub fn new(port: P) -> Self {
        Self::with_config(port, FrameConfig::default())
    }

    /// Create a transceiver with explicit configuration.
    pub fn with_config(port: P, config: FrameConfig) -> Self {
        Self {
            port,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            config,
        }
    }

    /// Open the port and drop any input that arrived before we were listening.
    pub fn open(&mut self) -> Result<()> {
        self.port.open()?;
        self.port.clear_input()?;
        Ok(())
    }

    /// Close the port.
    pub fn close(&mut self) -> Result<()> {
        self.port.close()?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Encode and send one payload, then flush.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::InvalidPayloadSize {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;
        self.port.write(&self.buf)?;
        self.port.flush()?;

        debug!(port = %self.port.name(), size = payload.len(), "sent frame");
        Ok(())
    }

    /// Wait for the next valid frame whose payload fits in `max_len` bytes.
    ///
    /// Returns `Ok(None)` when the port stops producing bytes (each read waits
    /// at most the configured read timeout) before a valid frame arrives.
    pub fn receive(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let timeout = self.config.read_timeout;
        let mut source = PortSource::new(&mut self.port, timeout);

        match decode(&mut source, max_len)? {
            DecodeOutcome::Payload(payload) => {
                debug!(port = %self.port.name(), size = payload.len(), "received frame");
                Ok(Some(payload))
            }
            DecodeOutcome::NoData => Ok(None),
        }
    }

    /// [`receive`](Self::receive) bounded by the configured maximum payload size.
    pub fn recv(&mut self) -> Result<Option<Bytes>> {
        self.receive(self.config.max_payload_size)
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.port.is_open() {
            return Err(FrameError::PortClosed {
                port: self.port.name().to_string(),
            });
        }
        Ok(())
    }

    /// Borrow the underlying port.
    pub fn get_ref(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the underlying port.
    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transceiver and return the port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Update the per-read timeout used while scanning.
    pub fn set_read_timeout(&mut self, timeout: std::time::Duration) {
        self.config.read_timeout = timeout;
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
