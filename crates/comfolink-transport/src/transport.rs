use std::future::Future;
use std::net::SocketAddr;

use comfolink_frame::{Envelope, EnvelopeCodec};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionEvent, ConnectionId, SocketState};
use crate::error::{Result, TransportError};
use crate::tcp::{connect_stream, TransportConfig};

/// Owner-facing handle for the gateway TCP connection.
///
/// At most one connection is live at a time. Every connection posts into the
/// same event channel, tagged with its [`ConnectionId`]; feed each received
/// event back through [`Transport::handle_event`] so the socket state tracks
/// what the reader saw and events from replaced connections are recognised.
pub struct Transport {
    config: TransportConfig,
    events: mpsc::Sender<ConnectionEvent>,
    next_id: u64,
    connection: Option<Connection>,
    state: SocketState,
}

impl Transport {
    /// Create an idle transport and the receiver for its connection events.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let transport = Self {
            config,
            events,
            next_id: 0,
            connection: None,
            state: SocketState::Idle,
        };
        (transport, rx)
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SocketState::Open
    }

    /// Id of the live connection, if any.
    pub fn current(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(Connection::id)
    }

    /// Address of the connected device, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(Connection::peer)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Open a new connection, closing the previous one first.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<ConnectionId> {
        self.close().await;
        let dial = self.begin_connect(addr);
        let result = dial.await;
        self.finish_connect(addr, result)
    }

    /// Start a connection attempt without holding on to the transport.
    ///
    /// Any previous connection is dropped and the state becomes `Connecting`.
    /// The returned future owns everything it needs, so it can be spawned;
    /// hand its output to [`Transport::finish_connect`].
    pub fn begin_connect(
        &mut self,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<TcpStream>> + Send + 'static {
        if let Some(previous) = self.connection.take() {
            debug!(connection = %previous.id(), "dropping previous connection");
        }
        self.state = SocketState::Connecting;
        let config = self.config.clone();
        async move { connect_stream(addr, &config).await }
    }

    /// Take over the stream from a finished connection attempt.
    ///
    /// Spawns the reader and moves to `Open`, or to `Closed` if the attempt
    /// failed.
    pub fn finish_connect(
        &mut self,
        addr: SocketAddr,
        result: Result<TcpStream>,
    ) -> Result<ConnectionId> {
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                self.state = SocketState::Closed;
                return Err(err);
            }
        };

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let codec = EnvelopeCodec::with_max_frame_size(self.config.max_frame_size);
        let connection = match Connection::spawn(
            id,
            stream,
            codec,
            self.config.idle_timeout,
            self.events.clone(),
        ) {
            Ok(connection) => connection,
            Err(err) => {
                self.state = SocketState::Closed;
                return Err(err);
            }
        };

        info!(connection = %id, %addr, "connected to device");
        self.connection = Some(connection);
        self.state = SocketState::Open;
        Ok(id)
    }

    /// Write one envelope to the live connection.
    ///
    /// A write failure marks the socket closed; the reader keeps running so
    /// its own terminal event still arrives.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let connection = match (self.state, self.connection.as_mut()) {
            (SocketState::Open, Some(connection)) => connection,
            (state, _) => return Err(TransportError::NotOpen(state)),
        };

        if let Err(err) = connection.send(envelope).await {
            warn!(connection = %connection.id(), error = %err, "write failed");
            self.state = SocketState::Closed;
            return Err(err);
        }
        Ok(())
    }

    /// Close the live connection. Calling this with nothing open is a no-op,
    /// apart from abandoning a connect started with [`Transport::begin_connect`].
    pub async fn close(&mut self) {
        let Some(connection) = self.connection.take() else {
            if self.state == SocketState::Connecting {
                self.state = SocketState::Closed;
            }
            return;
        };

        self.state = SocketState::Closing;
        debug!(connection = %connection.id(), "closing connection");
        connection.close().await;
        self.state = SocketState::Closed;
    }

    /// Update the socket state for an event taken off the event channel.
    ///
    /// Returns `false` when the event belongs to a connection that has since
    /// been replaced or closed; such events should be ignored.
    pub fn handle_event(&mut self, event: &ConnectionEvent) -> bool {
        if self.current() != Some(event.connection) {
            debug!(connection = %event.connection, "dropping event from stale connection");
            return false;
        }

        if event.event.is_terminal() {
            self.connection = None;
            self.state = SocketState::Closed;
        }
        true
    }
}
