//! Protocol-buffers implementation of [`MessageCodec`].
//!
//! Only the messages the session itself sends or acts on are modelled. Enum
//! fields are carried as `uint32`; proto2 enums share the varint encoding.

use bytes::Bytes;
use comfolink_frame::{DeviceId, Envelope};
use prost::Message as ProstMessage;

use crate::kind::GatewayStatus;
use crate::message::{
    CodecError, Command, DecodedMessage, DiscoveryResponse, EncodedMessage, MessageCodec,
    RegisteredApp, SessionConfirm,
};

/// Zone every sensor subscription is made in.
const RPDO_ZONE: u32 = 1;
/// Subscription timeout meaning "until the session ends".
const RPDO_TIMEOUT_NEVER: u32 = u32::MAX;

#[derive(Clone, PartialEq, ProstMessage)]
struct GatewayOperation {
    #[prost(uint32, optional, tag = "1")]
    r#type: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    result: Option<u32>,
    #[prost(string, optional, tag = "3")]
    result_description: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    reference: Option<u32>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct StartSessionRequest {
    #[prost(bool, optional, tag = "1")]
    takeover: Option<bool>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct StartSessionConfirm {
    #[prost(string, optional, tag = "1")]
    devicename: Option<String>,
    #[prost(bool, optional, tag = "2")]
    resumed: Option<bool>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct RegisterAppRequest {
    #[prost(bytes = "vec", optional, tag = "1")]
    uuid: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "2")]
    pin: Option<u32>,
    #[prost(string, optional, tag = "3")]
    devicename: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct DeregisterAppRequest {
    #[prost(bytes = "vec", optional, tag = "1")]
    uuid: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct CnRpdoRequest {
    #[prost(uint32, optional, tag = "1")]
    pdid: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    zone: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    r#type: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    timeout: Option<u32>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct CnRmiRequest {
    #[prost(uint32, optional, tag = "1")]
    node_id: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    message: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct CnTimeRequest {
    #[prost(uint32, optional, tag = "1")]
    set_time: Option<u32>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct SearchGatewayRequest {}

#[derive(Clone, PartialEq, ProstMessage)]
struct SearchGatewayResponse {
    #[prost(string, optional, tag = "1")]
    ipaddress: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    uuid: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "3")]
    version: Option<u32>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct DiscoveryOperation {
    #[prost(message, optional, tag = "1")]
    search_gateway_request: Option<SearchGatewayRequest>,
    #[prost(message, optional, tag = "2")]
    search_gateway_response: Option<SearchGatewayResponse>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct RegisteredAppEntry {
    #[prost(bytes = "vec", optional, tag = "1")]
    uuid: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    devicename: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
struct ListRegisteredAppsConfirm {
    #[prost(message, repeated, tag = "1")]
    apps: Vec<RegisteredAppEntry>,
}

impl From<prost::DecodeError> for CodecError {
    fn from(e: prost::DecodeError) -> Self {
        CodecError::new(format!("protobuf decode error: {e}"))
    }
}

/// The gateway's own protocol-buffers message encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayCodec;

impl GatewayCodec {
    pub fn new() -> Self {
        Self
    }

    fn command_body(command: &Command) -> Bytes {
        let body = match command {
            Command::StartSession { takeover } => StartSessionRequest {
                takeover: Some(*takeover),
            }
            .encode_to_vec(),
            Command::RegisterApp {
                client,
                pin,
                device_name,
            } => RegisterAppRequest {
                uuid: Some(client.as_bytes().to_vec()),
                pin: Some(*pin),
                devicename: Some(device_name.clone()),
            }
            .encode_to_vec(),
            Command::DeregisterApp { client } => DeregisterAppRequest {
                uuid: Some(client.as_bytes().to_vec()),
            }
            .encode_to_vec(),
            Command::RegisterSensor(sensor) => CnRpdoRequest {
                pdid: Some(sensor.pdid),
                zone: Some(RPDO_ZONE),
                r#type: Some(sensor.pdo_type),
                timeout: Some(RPDO_TIMEOUT_NEVER),
            }
            .encode_to_vec(),
            Command::SendCommand { node_id, message } => CnRmiRequest {
                node_id: Some(*node_id),
                message: Some(message.to_vec()),
            }
            .encode_to_vec(),
            Command::TimeRequest => CnTimeRequest { set_time: None }.encode_to_vec(),
            Command::CloseSession
            | Command::KeepAlive
            | Command::ListRegisteredApps
            | Command::VersionRequest => return Bytes::new(),
        };
        Bytes::from(body)
    }
}

impl MessageCodec for GatewayCodec {
    fn encode(&self, command: &Command, reference: u32) -> Result<EncodedMessage, CodecError> {
        let operation = GatewayOperation {
            r#type: Some(u32::from(command.kind())),
            result: None,
            result_description: None,
            reference: Some(reference),
        };

        Ok(EncodedMessage {
            operation: Bytes::from(operation.encode_to_vec()),
            command: Self::command_body(command),
        })
    }

    fn decode(&self, envelope: &Envelope) -> Result<DecodedMessage, CodecError> {
        let operation = GatewayOperation::decode(envelope.operation.clone())?;
        let kind = operation
            .r#type
            .ok_or_else(|| CodecError::new("operation header without a type"))?;
        let kind = u16::try_from(kind)
            .map_err(|_| CodecError::new(format!("operation type {kind} out of range")))?;

        Ok(DecodedMessage {
            kind,
            status: GatewayStatus::from_code(operation.result.unwrap_or(0)),
            description: operation.result_description,
            reference: operation.reference,
            payload: envelope.command.clone(),
        })
    }

    fn decode_session_confirm(&self, payload: &[u8]) -> Result<SessionConfirm, CodecError> {
        let confirm = StartSessionConfirm::decode(payload)?;
        Ok(SessionConfirm {
            device_name: confirm.devicename,
            resumed: confirm.resumed.unwrap_or(false),
        })
    }

    fn discovery_request(&self) -> Bytes {
        let request = DiscoveryOperation {
            search_gateway_request: Some(SearchGatewayRequest {}),
            search_gateway_response: None,
        };
        Bytes::from(request.encode_to_vec())
    }

    fn decode_discovery(&self, datagram: &[u8]) -> Result<DiscoveryResponse, CodecError> {
        let operation = DiscoveryOperation::decode(datagram)?;
        let response = operation
            .search_gateway_response
            .ok_or_else(|| CodecError::new("datagram is not a gateway response"))?;
        let address = response
            .ipaddress
            .ok_or_else(|| CodecError::new("gateway response without an address"))?;
        let uuid = response
            .uuid
            .ok_or_else(|| CodecError::new("gateway response without an identifier"))?;
        let device_id = DeviceId::try_from(uuid.as_slice())
            .map_err(|e| CodecError::new(format!("gateway identifier: {e}")))?;

        Ok(DiscoveryResponse {
            address,
            device_id,
            version: response.version,
        })
    }

    fn decode_registered_apps(&self, payload: &[u8]) -> Result<Vec<RegisteredApp>, CodecError> {
        let confirm = ListRegisteredAppsConfirm::decode(payload)?;
        confirm
            .apps
            .into_iter()
            .map(|app| {
                let uuid = app.uuid.unwrap_or_default();
                let id = DeviceId::try_from(uuid.as_slice())
                    .map_err(|e| CodecError::new(format!("registered app identifier: {e}")))?;
                Ok(RegisteredApp {
                    id,
                    device_name: app.devicename.unwrap_or_default(),
                })
            })
            .collect()
    }
}
