use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;

use crate::kind::{kind_name, GatewayStatus};

/// A message received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: u16,
    pub status: GatewayStatus,
    pub description: Option<String>,
    pub reference: Option<u32>,
    /// Undecoded command body.
    pub payload: Bytes,
    pub received_at: SystemTime,
}

impl InboundMessage {
    pub fn kind_name(&self) -> &'static str {
        kind_name(self.kind)
    }
}

/// Why the session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The gateway closed the session because another client took it over.
    OtherSession,
    /// The TCP connection was lost.
    Disconnected,
}

/// Notifications published by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Every decoded inbound message, whether or not the session acted on it.
    Receive(InboundMessage),
    Disconnect(DisconnectReason),
    /// A transport failure the session is recovering from.
    Error(String),
}
