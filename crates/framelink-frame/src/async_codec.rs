use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for framelink frames.
///
/// Decoding resynchronises exactly like the blocking decoder: noise and
/// corrupt frames are dropped, partial frames wait for more input.
#[derive(Debug, Clone)]
pub struct SerialFrameCodec {
    max_payload: usize,
}

impl SerialFrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    /// Drop frames whose payload would exceed `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for SerialFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SerialFrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(decode_frame(src, self.max_payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let frame = decode_frame(src, self.max_payload);
        if frame.is_none() {
            // A trailing partial frame can never complete.
            src.clear();
        }
        Ok(frame)
    }
}

impl Encoder<&[u8]> for SerialFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        encode_frame(item, dst)
    }
}

impl Encoder<Bytes> for SerialFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst)
    }
}
