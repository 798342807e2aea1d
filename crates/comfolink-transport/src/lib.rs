//! TCP transport for the ventilation gateway protocol.
//!
//! Owns the single TCP connection to the device:
//! - [`tcp`] opens sockets with the options the gateway expects
//!   (no-delay, keepalive probing)
//! - [`connection`] runs the reader task that reassembles the byte stream
//!   into whole frames and reports connection events
//! - [`Transport`] is the owner-facing handle: connect, send, close, and
//!   bookkeeping of the socket state
//!
//! Events from every connection flow into one channel so that a single
//! consumer observes frames in wire order.

pub mod connection;
pub mod error;
pub mod tcp;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionId, SocketState, TransportEvent};
pub use error::{Result, TransportError};
pub use tcp::{connect_stream, TransportConfig, DEFAULT_PORT};
pub use transport::Transport;
