use std::time::Duration;

use crate::kind::GatewayStatus;
use crate::message::CodecError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] comfolink_transport::TransportError),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No session confirmation arrived within the start budget.
    #[error("no session confirmation after {0:?}")]
    ConnectTimeout(Duration),

    /// The device answered with a non-OK result.
    #[error("request rejected by device: {0}")]
    RequestRejected(GatewayStatus),

    /// A caller-initiated session start is already waiting for confirmation.
    #[error("session start already in progress")]
    StartInProgress,

    /// The connection dropped while a confirmation was outstanding.
    #[error("connection lost while waiting for confirmation")]
    ConnectionLost,

    /// No device answered the discovery broadcast.
    #[error("no gateway answered discovery within {0:?}")]
    DiscoveryTimeout(Duration),

    /// I/O error outside the session connection (discovery socket).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session task has stopped or the session was closed.
    #[error("session closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
