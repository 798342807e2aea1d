use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use comfolink_frame::DeviceId;
use comfolink_transport::{TransportConfig, DEFAULT_PORT};

/// Identifiers placed in every envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// This client's identifier.
    pub local: DeviceId,
    /// The gateway's identifier.
    pub device: DeviceId,
}

impl Identity {
    pub fn new(local: DeviceId, device: DeviceId) -> Self {
        Self { local, device }
    }

    /// Identity with a freshly generated client identifier.
    pub fn generated(device: DeviceId) -> Self {
        Self::new(DeviceId::random(), device)
    }
}

/// Configuration for a [`crate::Session`].
#[derive(Clone)]
pub struct SessionConfig {
    /// Gateway TCP address.
    pub address: SocketAddr,
    pub identity: Identity,
    /// PIN sent with app registration.
    /// Treated as a credential and redacted in debug output.
    pub pin: u32,
    /// Name this client registers under.
    pub device_name: String,
    /// Interval between keepalives once connected. Default: 15s.
    pub keepalive_interval: Duration,
    /// Delay before each reconnect attempt. Default: 15s.
    pub reconnect_interval: Duration,
    /// How long a session start waits for its confirmation. Default: 15s.
    pub start_timeout: Duration,
    /// Gap between sensor re-registrations after a reconnect. Default: 100ms.
    pub replay_delay: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the request channel into the session task.
    pub request_capacity: usize,
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn new(address: SocketAddr, identity: Identity) -> Self {
        Self {
            address,
            identity,
            pin: 0,
            device_name: "comfolink".to_string(),
            keepalive_interval: Duration::from_secs(15),
            reconnect_interval: Duration::from_secs(15),
            start_timeout: Duration::from_secs(15),
            replay_delay: Duration::from_millis(100),
            event_capacity: 256,
            request_capacity: 32,
            transport: TransportConfig::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("address", &self.address)
            .field("identity", &self.identity)
            .field("pin", &format_args!("<redacted>"))
            .field("device_name", &self.device_name)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("start_timeout", &self.start_timeout)
            .field("replay_delay", &self.replay_delay)
            .field("event_capacity", &self.event_capacity)
            .field("request_capacity", &self.request_capacity)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Configuration for [`crate::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local address the discovery socket binds to. Default: `0.0.0.0:56747`.
    pub bind: SocketAddr,
    /// Where the request is sent. Default: `255.255.255.255:56747`.
    pub target: SocketAddr,
    /// How long to wait for an answer. Default: 5s.
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            target: SocketAddr::from((Ipv4Addr::BROADCAST, DEFAULT_PORT)),
            timeout: Duration::from_secs(5),
        }
    }
}
