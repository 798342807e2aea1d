use std::net::SocketAddr;
use std::time::Duration;

use comfolink_frame::DEFAULT_MAX_FRAME_SIZE;
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::error::{Result, TransportError};

/// TCP (and UDP discovery) port the gateway listens on.
pub const DEFAULT_PORT: u16 = 56747;

/// Socket and timing options for the gateway connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Disable Nagle's algorithm. Default: true.
    pub no_delay: bool,
    /// Close the connection when nothing is read for this long. Default: 10s.
    pub idle_timeout: Option<Duration>,
    /// Idle time before the kernel starts sending TCP keepalives. Default: 15s.
    pub keepalive: Option<Duration>,
    /// Upper bound for the TCP handshake. Default: 10s.
    pub connect_timeout: Duration,
    /// Largest accepted frame body. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Capacity of the connection event channel.
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            no_delay: true,
            idle_timeout: Some(Duration::from_secs(10)),
            keepalive: Some(Duration::from_secs(15)),
            connect_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            event_buffer: 64,
        }
    }
}

/// Open a TCP connection to the device with the configured socket options.
pub async fn connect_stream(addr: SocketAddr, config: &TransportConfig) -> Result<TcpStream> {
    let connect_err = |source| TransportError::Connect { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(connect_err)?;

    if let Some(idle) = config.keepalive {
        socket.set_keepalive(true).map_err(connect_err)?;
        set_keepalive_idle(&socket, idle).map_err(connect_err)?;
    }

    let stream = tokio::time::timeout(config.connect_timeout, socket.connect(addr))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            addr,
            timeout: config.connect_timeout,
        })?
        .map_err(connect_err)?;

    stream.set_nodelay(config.no_delay).map_err(connect_err)?;
    debug!(%addr, no_delay = config.no_delay, keepalive = ?config.keepalive, "tcp connected");
    Ok(stream)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const KEEPALIVE_IDLE_OPTION: libc::c_int = libc::TCP_KEEPIDLE;
#[cfg(any(target_os = "macos", target_os = "ios"))]
const KEEPALIVE_IDLE_OPTION: libc::c_int = libc::TCP_KEEPALIVE;

/// Set the idle time before the first keepalive (`TCP_KEEPIDLE`).
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
))]
fn set_keepalive_idle(socket: &TcpSocket, idle: Duration) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let secs = idle.as_secs().clamp(1, i32::MAX as u64) as libc::c_int;
    let fd = socket.as_raw_fd();

    // SAFETY: `secs` outlives the call and its size is passed alongside the pointer;
    // `fd` is an open socket owned by `socket` for the duration of the call.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            KEEPALIVE_IDLE_OPTION,
            (&secs as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Keepalive idle time is left at the OS default on other platforms.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
fn set_keepalive_idle(_socket: &TcpSocket, _idle: Duration) -> std::io::Result<()> {
    Ok(())
}
