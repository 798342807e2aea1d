#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use comfolink_frame::{DeviceId, Envelope, EnvelopeCodec};
use comfolink_session::kind::{self, GatewayStatus};
use comfolink_session::{
    CodecError, Command, DecodedMessage, DiscoveryResponse, EncodedMessage, Identity,
    MessageCodec, SessionConfig, SessionConfirm,
};
use comfolink_transport::TransportConfig;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::Framed;

pub const CLIENT_ID: DeviceId = DeviceId::from_bytes([0xC1; 16]);
pub const GATEWAY_ID: DeviceId = DeviceId::from_bytes([0x6A; 16]);

/// Fixed-layout codec so the fake gateway can read and write messages
/// without protocol buffers.
///
/// Operation: kind (u16 BE), status (u8), reference (u32 BE).
/// Start session body: takeover (u8). Confirmation body: resumed (u8).
/// Sensor body: pdid (u32 BE), type (u32 BE).
pub struct TestCodec;

impl TestCodec {
    pub fn operation(kind: u16, status: GatewayStatus, reference: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(7);
        buf.put_u16(kind);
        buf.put_u8(status.code() as u8);
        buf.put_u32(reference);
        buf.freeze()
    }

    pub fn parse_operation(operation: &[u8]) -> Option<(u16, GatewayStatus, u32)> {
        if operation.len() != 7 {
            return None;
        }
        let kind = u16::from_be_bytes([operation[0], operation[1]]);
        let status = GatewayStatus::from_code(u32::from(operation[2]));
        let reference = u32::from_be_bytes([operation[3], operation[4], operation[5], operation[6]]);
        Some((kind, status, reference))
    }
}

impl MessageCodec for TestCodec {
    fn encode(&self, command: &Command, reference: u32) -> Result<EncodedMessage, CodecError> {
        let body = match command {
            Command::StartSession { takeover } => Bytes::from(vec![u8::from(*takeover)]),
            Command::RegisterSensor(sensor) => {
                let mut buf = BytesMut::with_capacity(8);
                buf.put_u32(sensor.pdid);
                buf.put_u32(sensor.pdo_type);
                buf.freeze()
            }
            Command::SendCommand { message, .. } => message.clone(),
            _ => Bytes::new(),
        };
        Ok(EncodedMessage {
            operation: Self::operation(command.kind(), GatewayStatus::Ok, reference),
            command: body,
        })
    }

    fn decode(&self, envelope: &Envelope) -> Result<DecodedMessage, CodecError> {
        let (kind, status, reference) = Self::parse_operation(&envelope.operation)
            .ok_or_else(|| CodecError::new("bad test operation"))?;
        Ok(DecodedMessage {
            kind,
            status,
            description: None,
            reference: Some(reference),
            payload: envelope.command.clone(),
        })
    }

    fn decode_session_confirm(&self, payload: &[u8]) -> Result<SessionConfirm, CodecError> {
        Ok(SessionConfirm {
            device_name: None,
            resumed: payload.first() == Some(&1),
        })
    }

    fn discovery_request(&self) -> Bytes {
        Bytes::from_static(&[0x0A, 0x00])
    }

    fn decode_discovery(&self, _datagram: &[u8]) -> Result<DiscoveryResponse, CodecError> {
        Err(CodecError::new("discovery is not used in session tests"))
    }
}

/// Short timings so lifecycle tests finish quickly.
pub fn test_config(address: SocketAddr) -> SessionConfig {
    let mut config = SessionConfig::new(address, Identity::new(CLIENT_ID, GATEWAY_ID));
    config.keepalive_interval = Duration::from_millis(150);
    config.reconnect_interval = Duration::from_millis(200);
    config.start_timeout = Duration::from_millis(300);
    config.replay_delay = Duration::from_millis(20);
    config.transport = TransportConfig {
        idle_timeout: None,
        connect_timeout: Duration::from_secs(2),
        ..TransportConfig::default()
    };
    config
}

/// How the fake gateway answers session starts.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub answer_start: bool,
    pub start_status: GatewayStatus,
    pub resumed: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            answer_start: true,
            start_status: GatewayStatus::Ok,
            resumed: false,
        }
    }
}

/// A request the fake gateway received.
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: usize,
    pub kind: u16,
    pub body: Bytes,
    pub at: Instant,
}

enum Control {
    Push {
        kind: u16,
        status: GatewayStatus,
        body: Bytes,
    },
    Drop,
}

/// A loopback TCP server speaking the envelope framing with [`TestCodec`].
pub struct FakeGateway {
    pub addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>>,
    received: mpsc::UnboundedReceiver<Received>,
    accept_task: JoinHandle<()>,
}

impl FakeGateway {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Mutex::new(script));
        let current = Arc::new(Mutex::new(None));
        let (received_tx, received) = mpsc::unbounded_channel();

        let accept_task = {
            let script = Arc::clone(&script);
            let current = Arc::clone(&current);
            tokio::spawn(async move {
                let mut connection = 0usize;
                while let Ok((stream, _)) = listener.accept().await {
                    connection += 1;
                    let (control_tx, control_rx) = mpsc::unbounded_channel();
                    *current.lock().unwrap() = Some(control_tx);
                    tokio::spawn(serve(
                        connection,
                        stream,
                        Arc::clone(&script),
                        received_tx.clone(),
                        control_rx,
                    ));
                }
            })
        };

        Self {
            addr,
            script,
            current,
            received,
            accept_task,
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Send a message to the client on the current connection.
    pub fn push(&self, kind: u16, status: GatewayStatus, body: Bytes) {
        if let Some(control) = self.current.lock().unwrap().as_ref() {
            let _ = control.send(Control::Push { kind, status, body });
        }
    }

    /// Close the current connection from the gateway side.
    pub fn drop_connection(&self) {
        if let Some(control) = self.current.lock().unwrap().take() {
            let _ = control.send(Control::Drop);
        }
    }

    pub async fn next_request(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("gateway received a request in time")
            .expect("gateway running")
    }

    /// Next request of `kind`, skipping keepalives and anything else.
    pub async fn next_of_kind(&mut self, kind: u16) -> Received {
        loop {
            let request = self.next_request().await;
            if request.kind == kind {
                return request;
            }
        }
    }

    /// Requests received within `window`, keepalives excluded.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<Received> {
        let deadline = Instant::now() + window;
        let mut requests = Vec::new();
        while let Ok(Some(request)) = tokio::time::timeout_at(deadline, self.received.recv()).await
        {
            if request.kind != kind::KEEP_ALIVE {
                requests.push(request);
            }
        }
        requests
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    connection: usize,
    stream: TcpStream,
    script: Arc<Mutex<Script>>,
    received: mpsc::UnboundedSender<Received>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let mut framed = Framed::new(stream, EnvelopeCodec::new());
    let mut reference = 1000u32;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(Ok(frame)) = frame else {
                    return;
                };
                let request = Envelope::parse(frame).unwrap();
                let (kind, _, _) = TestCodec::parse_operation(&request.operation).unwrap();
                let _ = received.send(Received {
                    connection,
                    kind,
                    body: request.command.clone(),
                    at: Instant::now(),
                });

                if kind == kind::START_SESSION_REQUEST {
                    let script = *script.lock().unwrap();
                    if script.answer_start {
                        reference += 1;
                        let reply = Envelope::new(
                            GATEWAY_ID,
                            CLIENT_ID,
                            TestCodec::operation(kind::START_SESSION_CONFIRM, script.start_status, reference),
                            Bytes::from(vec![u8::from(script.resumed)]),
                        );
                        if framed.send(reply).await.is_err() {
                            return;
                        }
                    }
                }
            }
            command = control.recv() => match command {
                Some(Control::Push { kind, status, body }) => {
                    reference += 1;
                    let message = Envelope::new(
                        GATEWAY_ID,
                        CLIENT_ID,
                        TestCodec::operation(kind, status, reference),
                        body,
                    );
                    if framed.send(message).await.is_err() {
                        return;
                    }
                }
                Some(Control::Drop) | None => return,
            },
        }
    }
}
