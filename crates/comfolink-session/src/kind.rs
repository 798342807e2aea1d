use std::fmt;

use serde::{Serialize, Serializer};

/// Register this client with the device.
pub const REGISTER_APP_REQUEST: u16 = 2;
/// Open (or take over) the session.
pub const START_SESSION_REQUEST: u16 = 3;
/// Close the session. Also sent by the device when another client takes over.
pub const CLOSE_SESSION_REQUEST: u16 = 4;
/// List registered clients.
pub const LIST_REGISTERED_APPS_REQUEST: u16 = 5;
/// Remove a registered client.
pub const DEREGISTER_APP_REQUEST: u16 = 6;
/// Ask for gateway and device versions.
pub const VERSION_REQUEST: u16 = 18;
/// Read (or set) the device clock.
pub const CN_TIME_REQUEST: u16 = 30;
pub const CN_TIME_CONFIRM: u16 = 31;
/// Unsolicited node topology notification.
pub const CN_NODE_NOTIFICATION: u16 = 32;
/// Remote method invocation on a node.
pub const CN_RMI_REQUEST: u16 = 33;
pub const CN_RMI_RESPONSE: u16 = 34;
/// Subscribe to a process data object (sensor).
pub const CN_RPDO_REQUEST: u16 = 38;
pub const CN_RPDO_CONFIRM: u16 = 39;
/// Sensor value update for a subscribed process data object.
pub const CN_RPDO_NOTIFICATION: u16 = 40;
pub const CN_ALARM_NOTIFICATION: u16 = 41;
pub const REGISTER_APP_CONFIRM: u16 = 52;
pub const START_SESSION_CONFIRM: u16 = 53;
pub const CLOSE_SESSION_CONFIRM: u16 = 54;
pub const LIST_REGISTERED_APPS_CONFIRM: u16 = 55;
pub const DEREGISTER_APP_CONFIRM: u16 = 56;
pub const VERSION_CONFIRM: u16 = 68;
pub const GATEWAY_NOTIFICATION: u16 = 100;
pub const KEEP_ALIVE: u16 = 101;

/// Human-readable name of a message kind, for logs and CLI output.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        REGISTER_APP_REQUEST => "RegisterAppRequest",
        START_SESSION_REQUEST => "StartSessionRequest",
        CLOSE_SESSION_REQUEST => "CloseSessionRequest",
        LIST_REGISTERED_APPS_REQUEST => "ListRegisteredAppsRequest",
        DEREGISTER_APP_REQUEST => "DeregisterAppRequest",
        VERSION_REQUEST => "VersionRequest",
        CN_TIME_REQUEST => "CnTimeRequest",
        CN_TIME_CONFIRM => "CnTimeConfirm",
        CN_NODE_NOTIFICATION => "CnNodeNotification",
        CN_RMI_REQUEST => "CnRmiRequest",
        CN_RMI_RESPONSE => "CnRmiResponse",
        CN_RPDO_REQUEST => "CnRpdoRequest",
        CN_RPDO_CONFIRM => "CnRpdoConfirm",
        CN_RPDO_NOTIFICATION => "CnRpdoNotification",
        CN_ALARM_NOTIFICATION => "CnAlarmNotification",
        REGISTER_APP_CONFIRM => "RegisterAppConfirm",
        START_SESSION_CONFIRM => "StartSessionConfirm",
        CLOSE_SESSION_CONFIRM => "CloseSessionConfirm",
        LIST_REGISTERED_APPS_CONFIRM => "ListRegisteredAppsConfirm",
        DEREGISTER_APP_CONFIRM => "DeregisterAppConfirm",
        VERSION_CONFIRM => "VersionConfirm",
        GATEWAY_NOTIFICATION => "GatewayNotification",
        KEEP_ALIVE => "KeepAlive",
        _ => "Unknown",
    }
}

/// Result code carried in the operation header of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GatewayStatus {
    #[default]
    Ok,
    BadRequest,
    InternalError,
    NotReachable,
    OtherSession,
    NotAllowed,
    NoResources,
    NotExist,
    RmiError,
    /// A code this client does not know.
    Unknown(u32),
}

impl GatewayStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::BadRequest,
            2 => Self::InternalError,
            3 => Self::NotReachable,
            4 => Self::OtherSession,
            5 => Self::NotAllowed,
            6 => Self::NoResources,
            7 => Self::NotExist,
            8 => Self::RmiError,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::BadRequest => 1,
            Self::InternalError => 2,
            Self::NotReachable => 3,
            Self::OtherSession => 4,
            Self::NotAllowed => 5,
            Self::NoResources => 6,
            Self::NotExist => 7,
            Self::RmiError => 8,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "BAD_REQUEST",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotReachable => "NOT_REACHABLE",
            Self::OtherSession => "OTHER_SESSION",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::NoResources => "NO_RESOURCES",
            Self::NotExist => "NOT_EXIST",
            Self::RmiError => "RMI_ERROR",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for GatewayStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in 0..=8 {
            assert_eq!(GatewayStatus::from_code(code).code(), code);
        }
        assert_eq!(GatewayStatus::from_code(42), GatewayStatus::Unknown(42));
        assert_eq!(GatewayStatus::from_code(4), GatewayStatus::OtherSession);
    }

    #[test]
    fn status_display() {
        assert_eq!(GatewayStatus::Ok.to_string(), "OK");
        assert_eq!(GatewayStatus::NotAllowed.to_string(), "NOT_ALLOWED");
        assert_eq!(GatewayStatus::Unknown(12).to_string(), "UNKNOWN(12)");
    }

    #[test]
    fn kind_names() {
        assert_eq!(kind_name(START_SESSION_CONFIRM), "StartSessionConfirm");
        assert_eq!(kind_name(KEEP_ALIVE), "KeepAlive");
        assert_eq!(kind_name(999), "Unknown");
    }
}
