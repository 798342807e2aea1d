use std::net::SocketAddr;
use std::time::Duration;

use comfolink_frame::FrameError;

use crate::connection::SocketState;

/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the device.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The connect attempt did not complete in time.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    /// A send was attempted while no connection is open.
    #[error("connection not open (state: {0:?})")]
    NotOpen(SocketState),

    /// The OS reported a failure while writing.
    #[error("write failed: {0}")]
    Write(#[source] FrameError),

    /// The inbound byte stream could not be split into frames.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
