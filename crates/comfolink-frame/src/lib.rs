//! Length-prefixed envelope framing for the ventilation gateway protocol.
//!
//! Every message on the gateway TCP session is an envelope:
//! - A 4-byte big-endian length that does not count itself
//! - The 16-byte source and destination identifiers
//! - A 2-byte big-endian operation length, the operation header bytes
//! - The command body, filling the rest of the frame
//!
//! The length prefix doubles as the stream delimiter, so the reassembly
//! helpers here always hand out whole frames regardless of how the socket
//! chunked the bytes.

pub mod codec;
pub mod error;
pub mod id;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::EnvelopeCodec;
pub use codec::{
    decode_frame, encode_envelope, peek_length, read_frame_at, Envelope, FrameConfig,
    DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use id::{DeviceId, ID_SIZE};
pub use reader::FrameReader;
pub use writer::FrameWriter;
