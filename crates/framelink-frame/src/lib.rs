//! Checksummed framing for unreliable byte streams.
//!
//! Every message travels as:
//! - A 1-byte header sentinel (`0xAA`)
//! - A 1-byte payload length (0-255)
//! - The payload
//! - A 1-byte XOR checksum over header, length and payload
//!
//! The decoder resynchronises on its own after noise, dropped bytes or
//! corruption, so callers only ever see whole, verified payloads.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod source;
pub mod transceiver;

#[cfg(feature = "async")]
pub use async_codec::SerialFrameCodec;
pub use codec::{
    checksum, decode, decode_frame, encode, encode_frame, DecodeOutcome, Frame, FrameConfig,
    DEFAULT_READ_TIMEOUT, HEADER_BYTE, MAX_FRAME_SIZE, MAX_PAYLOAD, OVERHEAD,
};
pub use error::{FrameError, Result};
pub use source::{ByteSource, PortSource, ReadSource};
pub use transceiver::FrameTransceiver;
