use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use comfolink_frame::{Envelope, EnvelopeCodec};
use futures_util::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TransportError};

const READ_BUFFER_CAPACITY: usize = 4 * 1024;

/// Lifecycle of the TCP socket as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Identifies one TCP connection over the life of a [`crate::Transport`].
///
/// Events from a superseded connection still arrive on the shared channel;
/// the id lets the consumer discard them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// One whole frame, length prefix included, in wire order.
    Frame(Bytes),
    /// Nothing was read for the idle period; the connection is being closed.
    Timeout(Duration),
    /// The socket failed; the connection is being closed.
    Error(TransportError),
    /// The device closed the connection.
    Disconnected,
}

impl TransportEvent {
    /// Whether the event ends the connection it came from.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportEvent::Frame(_))
    }
}

/// A [`TransportEvent`] tagged with the connection it came from.
#[derive(Debug)]
pub struct ConnectionEvent {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

/// An open TCP connection: the framed write half plus the reader task.
pub(crate) struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: FramedWrite<OwnedWriteHalf, EnvelopeCodec>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Split the stream and start reassembling inbound frames.
    pub(crate) fn spawn(
        id: ConnectionId,
        stream: TcpStream,
        codec: EnvelopeCodec,
        idle_timeout: Option<Duration>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let reader = tokio::spawn(read_loop(id, read_half, codec, idle_timeout, events));

        Ok(Self {
            id,
            peer,
            writer: FramedWrite::new(write_half, codec),
            reader,
        })
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.writer
            .send(envelope)
            .await
            .map_err(TransportError::Write)
    }

    /// Shut down the write half and stop the reader.
    pub(crate) async fn close(mut self) {
        if let Err(err) = SinkExt::<&Envelope>::close(&mut self.writer).await {
            debug!(connection = %self.id, error = %err, "shutdown on close failed");
        }
        self.reader.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read bytes, reassemble frames and forward them until the connection ends.
///
/// Exactly one terminal event is posted when the loop exits on its own.
async fn read_loop(
    id: ConnectionId,
    mut read_half: OwnedReadHalf,
    mut codec: EnvelopeCodec,
    idle_timeout: Option<Duration>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

    let terminal = loop {
        let read = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read_half.read_buf(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    warn!(connection = %id, idle = ?limit, "no data from device, closing");
                    break TransportEvent::Timeout(limit);
                }
            },
            None => read_half.read_buf(&mut buf).await,
        };

        match read {
            Ok(0) => {
                if !buf.is_empty() {
                    debug!(connection = %id, pending = buf.len(), "closed with partial frame");
                }
                info!(connection = %id, "device closed the connection");
                break TransportEvent::Disconnected;
            }
            Ok(n) => trace!(connection = %id, bytes = n, buffered = buf.len(), "read"),
            Err(err) => {
                warn!(connection = %id, error = %err, "socket error");
                break TransportEvent::Error(TransportError::Io(err));
            }
        }

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    trace!(connection = %id, len = frame.len(), "frame");
                    let event = ConnectionEvent {
                        connection: id,
                        event: TransportEvent::Frame(frame),
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(connection = %id, error = %err, "unrecoverable framing error");
                    let event = ConnectionEvent {
                        connection: id,
                        event: TransportEvent::Error(err.into()),
                    };
                    let _ = events.send(event).await;
                    return;
                }
            }
        }
    };

    let _ = events
        .send(ConnectionEvent {
            connection: id,
            event: terminal,
        })
        .await;
}
