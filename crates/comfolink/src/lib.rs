//! Client for the ventilation gateway protocol.
//!
//! comfolink talks to a ventilation unit's LAN gateway: it finds the gateway
//! with a UDP broadcast, opens a TCP session, keeps it alive and recovers it
//! when the connection drops.
//!
//! # Crate Structure
//!
//! - [`frame`] - Length-prefixed envelope framing and endpoint identifiers
//! - [`transport`] - TCP connection ownership and frame reassembly
//! - [`session`] - Discovery, the session actor and the gateway message codec

/// Re-export frame types.
pub mod frame {
    pub use comfolink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use comfolink_transport::*;
}

/// Re-export session types.
pub mod session {
    pub use comfolink_session::*;
}

pub use comfolink_session::{
    discover, Discovered, DiscoveryConfig, GatewayCodec, Identity, SensorId, Session,
    SessionConfig, SessionError, SessionEvent,
};
