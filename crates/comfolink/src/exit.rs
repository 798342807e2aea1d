use std::fmt;
use std::io;

use comfolink_frame::FrameError;
use comfolink_session::SessionError;
use comfolink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const REJECTED: i32 = 40;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { .. } | TransportError::NotOpen(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::ConnectTimeout { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        TransportError::Write(err) | TransportError::Frame(err) => frame_error(context, err),
        TransportError::Io(source) => io_error(context, source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        FrameError::InvalidId(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Io(source) => io_error(context, source),
        SessionError::Codec(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SessionError::ConnectTimeout(_) | SessionError::DiscoveryTimeout(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        SessionError::RequestRejected(_) => CliError::new(REJECTED, format!("{context}: {err}")),
        SessionError::ConnectionLost => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SessionError::StartInProgress | SessionError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}
