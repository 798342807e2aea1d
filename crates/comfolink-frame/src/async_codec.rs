//! `tokio_util::codec` adapter for envelope framing.
//!
//! The decoder side is the stream reassembler: bytes are accumulated until a
//! whole frame is available, then exactly one frame is split off per call.
//! Frames are handed out raw (prefix included) so that a malformed envelope
//! can be dropped by the consumer without desynchronizing the stream.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_envelope, Envelope, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};

/// Frame reassembler and envelope encoder for async streams.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_frame_size: usize,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(src, self.max_frame_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<&Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Envelope, dst: &mut BytesMut) -> Result<()> {
        if item.body_len() > self.max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.body_len(),
                max: self.max_frame_size,
            });
        }
        encode_envelope(item, dst)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&Envelope>::encode(self, &item, dst)
    }
}
