//! Codec-agnostic message types and the [`MessageCodec`] seam.
//!
//! The session never looks inside command bodies. It builds [`Command`]s,
//! hands them to a codec for serialization, and gets back the few header
//! fields it needs to route responses.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use comfolink_frame::{DeviceId, Envelope};
use serde::Serialize;

use crate::kind::{self, GatewayStatus};

/// A message body or header could not be serialized or parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A process data object the client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SensorId {
    /// Process data id.
    pub pdid: u32,
    /// Value type of the process data object.
    pub pdo_type: u32,
}

impl SensorId {
    pub const fn new(pdid: u32, pdo_type: u32) -> Self {
        Self { pdid, pdo_type }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pdid, self.pdo_type)
    }
}

/// Parses `PDID:TYPE`, e.g. `117:1`.
impl FromStr for SensorId {
    type Err = CodecError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (pdid, pdo_type) = s
            .split_once(':')
            .ok_or_else(|| CodecError::new(format!("expected PDID:TYPE, got '{s}'")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|err| CodecError::new(format!("invalid sensor '{s}': {err}")))
        };
        Ok(Self::new(parse(pdid)?, parse(pdo_type)?))
    }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartSession { takeover: bool },
    CloseSession,
    KeepAlive,
    ListRegisteredApps,
    RegisterApp {
        client: DeviceId,
        pin: u32,
        device_name: String,
    },
    DeregisterApp { client: DeviceId },
    RegisterSensor(SensorId),
    SendCommand { node_id: u32, message: Bytes },
    VersionRequest,
    TimeRequest,
}

impl Command {
    /// Kind carried in the operation header.
    pub fn kind(&self) -> u16 {
        match self {
            Self::StartSession { .. } => kind::START_SESSION_REQUEST,
            Self::CloseSession => kind::CLOSE_SESSION_REQUEST,
            Self::KeepAlive => kind::KEEP_ALIVE,
            Self::ListRegisteredApps => kind::LIST_REGISTERED_APPS_REQUEST,
            Self::RegisterApp { .. } => kind::REGISTER_APP_REQUEST,
            Self::DeregisterApp { .. } => kind::DEREGISTER_APP_REQUEST,
            Self::RegisterSensor(_) => kind::CN_RPDO_REQUEST,
            Self::SendCommand { .. } => kind::CN_RMI_REQUEST,
            Self::VersionRequest => kind::VERSION_REQUEST,
            Self::TimeRequest => kind::CN_TIME_REQUEST,
        }
    }

    /// Kind of the response that settles this request, if one is expected.
    pub fn expected_kind(&self) -> Option<u16> {
        match self {
            Self::StartSession { .. } => Some(kind::START_SESSION_CONFIRM),
            Self::CloseSession | Self::KeepAlive => None,
            Self::ListRegisteredApps => Some(kind::LIST_REGISTERED_APPS_CONFIRM),
            Self::RegisterApp { .. } => Some(kind::REGISTER_APP_CONFIRM),
            Self::DeregisterApp { .. } => Some(kind::DEREGISTER_APP_CONFIRM),
            Self::RegisterSensor(_) => Some(kind::CN_RPDO_CONFIRM),
            Self::SendCommand { .. } => Some(kind::CN_RMI_RESPONSE),
            Self::VersionRequest => Some(kind::VERSION_CONFIRM),
            Self::TimeRequest => Some(kind::CN_TIME_CONFIRM),
        }
    }

    pub fn name(&self) -> &'static str {
        kind::kind_name(self.kind())
    }
}

/// Serialized operation header and command body, ready for an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub operation: Bytes,
    pub command: Bytes,
}

/// Routing fields extracted from an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub kind: u16,
    pub status: GatewayStatus,
    pub description: Option<String>,
    pub reference: Option<u32>,
    /// Undecoded command body.
    pub payload: Bytes,
}

/// Fields of a session confirmation the session acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfirm {
    pub device_name: Option<String>,
    pub resumed: bool,
}

/// A gateway's answer to the discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    /// Address the gateway reports for itself, as sent.
    pub address: String,
    pub device_id: DeviceId,
    pub version: Option<u32>,
}

/// An app entry from the gateway's registration list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredApp {
    #[serde(serialize_with = "serialize_id")]
    pub id: DeviceId,
    pub device_name: String,
}

fn serialize_id<S: serde::Serializer>(id: &DeviceId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

/// Serialization of operation headers, request bodies and discovery datagrams.
///
/// [`crate::GatewayCodec`] is the protocol-buffers implementation used by
/// default; tests and alternative firmwares can supply their own.
pub trait MessageCodec: Send + Sync + 'static {
    /// Serialize `command` with the given diagnostic reference number.
    fn encode(&self, command: &Command, reference: u32) -> Result<EncodedMessage, CodecError>;

    /// Extract kind, status and reference from an inbound envelope.
    fn decode(&self, envelope: &Envelope) -> Result<DecodedMessage, CodecError>;

    /// Parse the body of a session confirmation.
    fn decode_session_confirm(&self, payload: &[u8]) -> Result<SessionConfirm, CodecError>;

    /// The datagram broadcast to find gateways.
    fn discovery_request(&self) -> Bytes;

    /// Parse a discovery answer.
    fn decode_discovery(&self, datagram: &[u8]) -> Result<DiscoveryResponse, CodecError>;

    /// Parse the body of a registered-apps confirmation.
    fn decode_registered_apps(&self, _payload: &[u8]) -> Result<Vec<RegisteredApp>, CodecError> {
        Err(CodecError::new("registered apps are not decoded by this codec"))
    }
}
