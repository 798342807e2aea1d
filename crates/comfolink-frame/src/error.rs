/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The operation header does not fit its 16-bit length field.
    #[error("operation header too large ({size} bytes, max 65535)")]
    OperationTooLarge { size: usize },

    /// The frame is shorter than the fixed envelope header.
    #[error("truncated envelope ({len} bytes, header needs {needed})")]
    Truncated { len: usize, needed: usize },

    /// The length prefix disagrees with the number of bytes in the frame.
    #[error("envelope length mismatch (declared {declared}, actual {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The operation length points past the end of the frame.
    #[error("operation length {len} exceeds remaining {available} bytes")]
    OperationOverflow { len: usize, available: usize },

    /// An identifier could not be parsed.
    #[error("invalid device identifier: {0}")]
    InvalidId(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
