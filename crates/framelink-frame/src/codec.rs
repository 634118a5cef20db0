use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::source::ByteSource;

/// Start-of-frame sentinel.
pub const HEADER_BYTE: u8 = 0xAA;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Header + length + checksum.
pub const OVERHEAD: usize = 3;

/// Largest frame on the wire.
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD + OVERHEAD;

/// Default per-read timeout used while scanning a port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (overhead + payload).
    pub fn wire_size(&self) -> usize {
        OVERHEAD + self.payload.len()
    }
}

/// Result of scanning a byte source for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A frame with a valid length and checksum was found.
    Payload(Bytes),
    /// The source ran dry (timeout or end of stream) before a full frame arrived.
    NoData,
}

impl DecodeOutcome {
    /// The payload, if one was decoded.
    pub fn into_payload(self) -> Option<Bytes> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::NoData => None,
        }
    }
}

/// XOR of the header sentinel, the length byte and every payload byte.
pub fn checksum(length: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(HEADER_BYTE ^ length, |acc, byte| acc ^ byte)
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────┬──────────────────┬────────────┐
/// │ Header     │ Length     │ Payload          │ Checksum   │
/// │ 0xAA (1B)  │ (1B)       │ (Length bytes)   │ XOR (1B)   │
/// └────────────┴────────────┴──────────────────┴────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u8::try_from(payload.len()).map_err(|_| FrameError::InvalidPayloadSize {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })?;
    dst.reserve(OVERHEAD + payload.len());
    dst.put_u8(HEADER_BYTE);
    dst.put_u8(length);
    dst.put_slice(payload);
    dst.put_u8(checksum(length, payload));
    Ok(())
}

/// Encode a payload into a freshly allocated frame.
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(OVERHEAD + payload.len());
    encode_frame(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Scan `src` for the next valid frame whose payload fits in `max_payload` bytes.
///
/// Stray bytes before a header are skipped one at a time. A candidate whose
/// length exceeds `max_payload` is dropped and scanning resumes with the byte
/// after its length byte. A candidate with a bad checksum is dropped along
/// with the bytes already read for it. A source that runs dry mid-frame
/// yields [`DecodeOutcome::NoData`]; the partial frame is not retried.
pub fn decode<S: ByteSource + ?Sized>(src: &mut S, max_payload: usize) -> Result<DecodeOutcome> {
    let mut skipped = 0usize;
    loop {
        let Some(byte) = src.read_byte()? else {
            if skipped > 0 {
                trace!(skipped, "source drained while searching for header");
            }
            return Ok(DecodeOutcome::NoData);
        };
        if byte != HEADER_BYTE {
            skipped += 1;
            continue;
        }

        let Some(length) = src.read_byte()? else {
            return Ok(DecodeOutcome::NoData);
        };
        if usize::from(length) > max_payload {
            trace!(length, max_payload, "candidate length exceeds capacity; resynchronising");
            continue;
        }

        let mut payload = BytesMut::zeroed(usize::from(length));
        if src.read_bytes(&mut payload)? < payload.len() {
            trace!(length, "frame truncated before payload completed");
            return Ok(DecodeOutcome::NoData);
        }
        let Some(received) = src.read_byte()? else {
            trace!(length, "frame truncated before checksum");
            return Ok(DecodeOutcome::NoData);
        };

        let expected = checksum(length, &payload);
        if received != expected {
            trace!(
                length,
                expected = format_args!("{expected:#04x}"),
                received = format_args!("{received:#04x}"),
                "checksum mismatch; resynchronising"
            );
            continue;
        }

        if skipped > 0 {
            trace!(skipped, "skipped stray bytes before frame");
        }
        return Ok(DecodeOutcome::Payload(payload.freeze()));
    }
}

/// Decode the next frame from an accumulation buffer.
///
/// Applies the same resynchronisation rules as [`decode`], but instead of
/// giving up on a partial frame it leaves the partial bytes in `src` and
/// returns `None` so the caller can append more data and try again.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Option<Bytes> {
    loop {
        match src.iter().position(|&b| b == HEADER_BYTE) {
            Some(0) => {}
            Some(skip) => src.advance(skip),
            None => {
                src.clear();
                return None;
            }
        }

        if src.len() < 2 {
            return None; // Need more data
        }

        let length = src[1];
        if usize::from(length) > max_payload {
            src.advance(2);
            continue;
        }

        let total = OVERHEAD + usize::from(length);
        if src.len() < total {
            return None; // Need more data
        }

        if checksum(length, &src[2..total - 1]) != src[total - 1] {
            src.advance(total);
            continue;
        }

        src.advance(2);
        let payload = src.split_to(usize::from(length)).freeze();
        src.advance(1);
        return Some(payload);
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 255.
    pub max_payload_size: usize,
    /// Upper bound for each blocking read while scanning a port.
    pub read_timeout: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}
