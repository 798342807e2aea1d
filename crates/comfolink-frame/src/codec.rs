use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};
use crate::id::{DeviceId, ID_SIZE};

/// Length prefix at the start of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed envelope header: length (4) + source (16) + destination (16) + operation length (2).
pub const HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + ID_SIZE + ID_SIZE + 2;

/// Default maximum frame body size: 1 MiB.
///
/// Gateway messages are a few hundred bytes at most; anything near this is a
/// desynchronized stream.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

const OPERATION_LEN_OFFSET: usize = LENGTH_PREFIX_SIZE + ID_SIZE + ID_SIZE;

/// A gateway envelope: routing header, operation header and command body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Identifier of the sender.
    pub source: DeviceId,
    /// Identifier of the receiver.
    pub destination: DeviceId,
    /// Serialized operation header (message kind, status, reference).
    pub operation: Bytes,
    /// Serialized command body.
    pub command: Bytes,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(
        source: DeviceId,
        destination: DeviceId,
        operation: impl Into<Bytes>,
        command: impl Into<Bytes>,
    ) -> Self {
        Self {
            source,
            destination,
            operation: operation.into(),
            command: command.into(),
        }
    }

    /// Value of the length prefix: everything after the prefix itself.
    pub fn body_len(&self) -> usize {
        HEADER_SIZE - LENGTH_PREFIX_SIZE + self.operation.len() + self.command.len()
    }

    /// The total wire size of this envelope (prefix included).
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.body_len()
    }

    /// Parse one whole frame, length prefix included.
    ///
    /// Operation and command are sliced out of `frame` without copying.
    pub fn parse(frame: Bytes) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: frame.len(),
                needed: HEADER_SIZE,
            });
        }

        let declared = read_u32(&frame[..LENGTH_PREFIX_SIZE]) as usize;
        let actual = frame.len() - LENGTH_PREFIX_SIZE;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        let op_len = u16::from_be_bytes([
            frame[OPERATION_LEN_OFFSET],
            frame[OPERATION_LEN_OFFSET + 1],
        ]) as usize;
        let available = frame.len() - HEADER_SIZE;
        if op_len > available {
            return Err(FrameError::OperationOverflow {
                len: op_len,
                available,
            });
        }

        let source = DeviceId::try_from(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + ID_SIZE])?;
        let destination =
            DeviceId::try_from(&frame[LENGTH_PREFIX_SIZE + ID_SIZE..OPERATION_LEN_OFFSET])?;
        let operation = frame.slice(HEADER_SIZE..HEADER_SIZE + op_len);
        let command = frame.slice(HEADER_SIZE + op_len..);

        Ok(Self {
            source,
            destination,
            operation,
            command,
        })
    }
}

/// Encode an envelope into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬───────────┬───────────┬──────────┐
/// │ Length      │ Source      │ Destination │ Op length │ Operation │ Command  │
/// │ (4B BE)     │ (16B)       │ (16B)       │ (2B BE)   │           │          │
/// └─────────────┴─────────────┴─────────────┴───────────┴───────────┴──────────┘
/// ```
/// Length counts every byte after itself.
pub fn encode_envelope(envelope: &Envelope, dst: &mut BytesMut) -> Result<()> {
    if envelope.operation.len() > u16::MAX as usize {
        return Err(FrameError::OperationTooLarge {
            size: envelope.operation.len(),
        });
    }
    let body_len = envelope.body_len();
    if body_len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(LENGTH_PREFIX_SIZE + body_len);
    dst.put_u32(body_len as u32);
    dst.put_slice(envelope.source.as_bytes());
    dst.put_slice(envelope.destination.as_bytes());
    dst.put_u16(envelope.operation.len() as u16);
    dst.put_slice(&envelope.operation);
    dst.put_slice(&envelope.command);
    Ok(())
}

/// Peek the big-endian length prefix, if at least four bytes are present.
pub fn peek_length(src: &[u8]) -> Option<u32> {
    src.get(..LENGTH_PREFIX_SIZE).map(read_u32)
}

/// Locate the frame starting at `offset`.
///
/// Returns the next read position (`offset + 4 + length`) and the whole
/// frame, or `None` when the buffer does not hold the complete frame yet.
pub fn read_frame_at(buf: &[u8], offset: usize) -> Option<(usize, &[u8])> {
    let rest = buf.get(offset..)?;
    let body_len = peek_length(rest)? as usize;
    let end = LENGTH_PREFIX_SIZE.checked_add(body_len)?;
    let frame = rest.get(..end)?;
    Some((offset + end, frame))
}

/// Split one whole frame off the front of a reassembly buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes (length prefix included) from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Bytes>> {
    let Some(body_len) = peek_length(src) else {
        return Ok(None); // Need more data
    };
    let body_len = body_len as usize;

    if body_len > max_frame_size {
        debug!(size = body_len, max = max_frame_size, "rejecting oversized frame");
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_frame_size,
        });
    }

    let complete = read_frame_at(src, 0).map(|(end, _)| end);
    match complete {
        Some(end) => {
            trace!(len = end, buffered = src.len(), "frame complete");
            Ok(Some(src.split_to(end).freeze()))
        }
        None => {
            trace!(need = LENGTH_PREFIX_SIZE + body_len, buffered = src.len(), "partial frame");
            src.reserve(LENGTH_PREFIX_SIZE + body_len - src.len());
            Ok(None) // Need more data
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame body size in bytes. Default: 1 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
