//! Session layer for the ventilation gateway protocol.
//!
//! This is the "just works" layer: find the gateway with [`discover`], open a
//! [`Session`], issue requests and watch [`SessionEvent`]s. The session keeps
//! itself alive with periodic keepalives and reconnects (re-registering
//! sensors) when the connection drops.
//!
//! Message bodies are serialized through the [`MessageCodec`] trait;
//! [`GatewayCodec`] is the protocol-buffers encoding the gateway speaks.

pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod kind;
pub mod message;
pub mod pending;
pub mod proto;
pub mod session;
pub mod status;

pub use config::{DiscoveryConfig, Identity, SessionConfig};
pub use discovery::{discover, Discovered};
pub use error::{Result, SessionError};
pub use event::{DisconnectReason, InboundMessage, SessionEvent};
pub use kind::{kind_name, GatewayStatus};
pub use message::{
    CodecError, Command, DecodedMessage, DiscoveryResponse, EncodedMessage, MessageCodec,
    RegisteredApp, SensorId, SessionConfirm,
};
pub use pending::{PendingRequest, PendingRequests};
pub use proto::GatewayCodec;
pub use session::{Session, SessionStart};
pub use status::{SessionPhase, SessionStatus};
