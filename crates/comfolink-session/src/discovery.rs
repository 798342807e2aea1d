use std::net::{IpAddr, SocketAddr};

use comfolink_frame::DeviceId;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::error::{Result, SessionError};
use crate::message::MessageCodec;

const MAX_DATAGRAM_SIZE: usize = 1500;

/// A gateway found by [`discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub address: IpAddr,
    pub device_id: DeviceId,
    /// TCP port of the gateway (the port the broadcast was sent to).
    pub port: u16,
    pub version: Option<u32>,
}

impl Discovered {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Broadcast a search request and return the first gateway that answers.
///
/// Our own request echoed back by the broadcast and datagrams the codec
/// cannot parse are skipped. One socket per call, no retries.
pub async fn discover(config: &DiscoveryConfig, codec: &dyn MessageCodec) -> Result<Discovered> {
    let socket = UdpSocket::bind(config.bind).await?;
    socket.set_broadcast(true)?;

    let request = codec.discovery_request();
    socket.send_to(&request, config.target).await?;
    debug!(target_addr = %config.target, bind = %config.bind, "discovery request sent");

    let answer = tokio::time::timeout(config.timeout, async {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            let datagram = &buf[..len];

            if datagram == &request[..] {
                debug!(%from, "ignoring discovery echo");
                continue;
            }

            match codec.decode_discovery(datagram) {
                Ok(response) => return Ok::<_, SessionError>((response, from)),
                Err(err) => debug!(%from, len, error = %err, "ignoring undecodable datagram"),
            }
        }
    })
    .await
    .map_err(|_| SessionError::DiscoveryTimeout(config.timeout))?;

    let (response, from) = answer?;
    let address = match response.address.parse::<IpAddr>() {
        Ok(address) => address,
        Err(_) => {
            debug!(reported = %response.address, %from, "unparseable gateway address, using sender");
            from.ip()
        }
    };

    let discovered = Discovered {
        address,
        device_id: response.device_id,
        port: config.target.port(),
        version: response.version,
    };
    info!(address = %discovered.address, device_id = %discovered.device_id, "gateway discovered");
    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::proto::{device, GatewayCodec};

    fn loopback_config(target: SocketAddr, timeout: Duration) -> DiscoveryConfig {
        DiscoveryConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            target,
            timeout,
        }
    }

    #[tokio::test]
    async fn skips_echo_and_garbage_then_resolves() {
        let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = gateway.local_addr().unwrap();
        let id = DeviceId::from_bytes([0x42; 16]);

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = gateway.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &[0x0A, 0x00]);

            gateway.send_to(&[0x0A, 0x00], from).await.unwrap();
            gateway.send_to(&[0xFF, 0x01], from).await.unwrap();
            let answer = device::discovery_response("10.0.0.7", id, 1);
            gateway.send_to(&answer, from).await.unwrap();
        });

        let found = discover(&loopback_config(target, Duration::from_secs(5)), &GatewayCodec)
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(found.address, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(found.device_id, id);
        assert_eq!(found.port, target.port());
        assert_eq!(found.version, Some(1));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = gateway.local_addr().unwrap();

        let err = discover(&loopback_config(target, Duration::from_millis(100)), &GatewayCodec)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::DiscoveryTimeout(d) if d == Duration::from_millis(100)));
    }
}
