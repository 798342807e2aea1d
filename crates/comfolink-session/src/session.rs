//! The session actor and the handle callers use to drive it.
//!
//! One task owns the connection, the pending-request list, the registered
//! sensors, the timers and the status. Callers post requests over a channel
//! and get a oneshot reply; inbound traffic and connection changes are
//! published on a broadcast channel and a status watch.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use comfolink_frame::{DeviceId, Envelope};
use comfolink_transport::{ConnectionEvent, Transport, TransportError, TransportEvent};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::{Identity, SessionConfig};
use crate::error::{Result, SessionError};
use crate::event::{DisconnectReason, InboundMessage, SessionEvent};
use crate::kind::{self, kind_name};
use crate::message::{Command, DecodedMessage, MessageCodec, SensorId};
use crate::pending::PendingRequests;
use crate::proto::GatewayCodec;
use crate::status::{join_opt, sleep_until_opt, SessionPhase, SessionStatus, Timers};

/// Outcome of a confirmed session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStart {
    /// The gateway resumed the previous session.
    pub resumed: bool,
}

type StartReply = oneshot::Sender<Result<SessionStart>>;

enum Request {
    Start { force: bool, reply: StartReply },
    Send {
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    Close { reply: oneshot::Sender<Result<()>> },
}

/// Handle to a running session.
///
/// Cheap to clone. The session task stops once every handle is dropped.
/// Request operations resolve once the request is written to the socket;
/// responses arrive as [`SessionEvent::Receive`] on [`Session::subscribe`].
/// Requests made while no connection is open wait for one to be established.
#[derive(Clone)]
pub struct Session {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Receiver<SessionStatus>,
    config: Arc<SessionConfig>,
}

impl Session {
    /// Start a session task using the protocol-buffers gateway codec.
    ///
    /// Must be called within a tokio runtime. Nothing is sent until
    /// [`Session::start_session`] or another request is made.
    pub fn spawn(config: SessionConfig) -> Self {
        Self::with_codec(config, Arc::new(GatewayCodec))
    }

    /// Start a session task with an explicit message codec.
    pub fn with_codec(config: SessionConfig, codec: Arc<dyn MessageCodec>) -> Self {
        let (requests, request_rx) = mpsc::channel(config.request_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (status_tx, status) = watch::channel(SessionStatus::default());
        let (transport, transport_rx) = Transport::new(config.transport.clone());
        let config = Arc::new(config);

        let actor = Actor::new(Arc::clone(&config), codec, transport, status_tx, events.clone());
        tokio::spawn(actor.run(request_rx, transport_rx));

        Self {
            requests,
            events,
            status,
            config,
        }
    }

    /// Client and gateway identifiers used in every envelope.
    pub fn identity(&self) -> Identity {
        self.config.identity
    }

    /// The configuration the session was spawned with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Open a session and wait for the gateway to confirm it.
    ///
    /// `force` takes the session over from another client. Fails with
    /// [`SessionError::ConnectTimeout`] when no confirmation arrives within
    /// the start timeout and with [`SessionError::RequestRejected`] when the
    /// gateway refuses; both schedule a reconnect. If a reconnect attempt is
    /// already waiting for its confirmation, the call waits for that attempt
    /// instead of sending a second request.
    pub async fn start_session(&self, force: bool) -> Result<SessionStart> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Start { force, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Send a keepalive now, outside the periodic schedule.
    pub async fn keep_alive(&self) -> Result<()> {
        self.send(Command::KeepAlive).await
    }

    /// Close the session, cancel timers and forget registered sensors.
    ///
    /// Without a confirmed session nothing is sent. The local teardown always
    /// happens; an error only reports that the close request could not be
    /// written. Calling it twice is fine.
    pub async fn close_session(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Close { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Ask for the apps registered on the gateway. The list arrives as a
    /// `ListRegisteredAppsConfirm` message.
    pub async fn list_registered_apps(&self) -> Result<()> {
        self.send(Command::ListRegisteredApps).await
    }

    /// Register this client under the configured name and PIN.
    pub async fn register_app(&self) -> Result<()> {
        self.send(Command::RegisterApp {
            client: self.config.identity.local,
            pin: self.config.pin,
            device_name: self.config.device_name.clone(),
        })
        .await
    }

    /// Remove another client's registration.
    pub async fn deregister_app(&self, client: DeviceId) -> Result<()> {
        self.send(Command::DeregisterApp { client }).await
    }

    /// Subscribe to a sensor. Subscriptions are repeated after a reconnect.
    pub async fn register_sensor(&self, sensor: SensorId) -> Result<()> {
        self.send(Command::RegisterSensor(sensor)).await
    }

    /// Send a remote method invocation to a node.
    pub async fn send_command(&self, node_id: u32, message: impl Into<Bytes>) -> Result<()> {
        self.send(Command::SendCommand {
            node_id,
            message: message.into(),
        })
        .await
    }

    /// Ask for the gateway and ventilation unit firmware versions.
    pub async fn version_request(&self) -> Result<()> {
        self.send(Command::VersionRequest).await
    }

    /// Ask for the ventilation unit's clock.
    pub async fn time_request(&self) -> Result<()> {
        self.send(Command::TimeRequest).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Send { command, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    async fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// A session start waiting for its confirmation.
struct StartAttempt {
    id: u64,
    /// Covers both the TCP connect and the confirmation.
    deadline: Instant,
    reply: Option<StartReply>,
}

/// What happens once an outbound request is written, or fails to be.
enum Followup {
    /// A caller's request. Sensor registrations are remembered on success.
    Reply(oneshot::Sender<Result<()>>),
    /// The session start of the attempt with this id.
    Start(u64),
    KeepAlive,
    Replay(SensorId),
}

impl Followup {
    /// Only caller requests and session starts open a connection.
    fn may_connect(&self) -> bool {
        matches!(self, Followup::Reply(_) | Followup::Start(_))
    }
}

/// An encoded request waiting for the connection.
struct Outbound {
    command: Command,
    envelope: Envelope,
    followup: Followup,
}

type Dial = JoinHandle<comfolink_transport::Result<TcpStream>>;

struct Actor {
    config: Arc<SessionConfig>,
    codec: Arc<dyn MessageCodec>,
    transport: Transport,
    /// Connect in progress. Runs as its own task so the actor keeps serving.
    connecting: Option<Dial>,
    /// Requests held until `connecting` finishes, in submission order.
    outbox: VecDeque<Outbound>,
    pending: PendingRequests,
    /// Registered sensors in registration order, without duplicates.
    sensors: Vec<SensorId>,
    replay: VecDeque<SensorId>,
    timers: Timers,
    start: Option<StartAttempt>,
    next_attempt: u64,
    status: SessionStatus,
    /// A session was requested and not closed since. Lost sessions are restored.
    recover: bool,
    /// The session was lost; the next confirmation re-registers sensors.
    replay_owed: bool,
    next_reference: u32,
    status_tx: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl Actor {
    fn new(
        config: Arc<SessionConfig>,
        codec: Arc<dyn MessageCodec>,
        transport: Transport,
        status_tx: watch::Sender<SessionStatus>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            codec,
            transport,
            connecting: None,
            outbox: VecDeque::new(),
            pending: PendingRequests::new(),
            sensors: Vec::new(),
            replay: VecDeque::new(),
            timers: Timers::default(),
            start: None,
            next_attempt: 0,
            status: SessionStatus::default(),
            recover: false,
            replay_owed: false,
            next_reference: 0,
            status_tx,
            events,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut transport_events: mpsc::Receiver<ConnectionEvent>,
    ) {
        loop {
            let start_deadline = self.start.as_ref().map(|attempt| attempt.deadline);

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(event) = transport_events.recv() => self.handle_transport(event),
                dialed = join_opt(&mut self.connecting) => self.on_connected(dialed).await,
                () = sleep_until_opt(self.timers.keepalive) => self.on_keepalive().await,
                () = sleep_until_opt(self.timers.reconnect) => self.on_reconnect().await,
                () = sleep_until_opt(self.timers.replay) => self.on_replay().await,
                () = sleep_until_opt(start_deadline) => self.on_start_timeout(),
            }

            self.publish();
        }

        debug!("all session handles dropped, stopping");
        if let Some(dial) = self.connecting.take() {
            dial.abort();
        }
        self.transport.close().await;
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Start { force, reply } => self.request_start(force, reply).await,
            Request::Send { command, reply } => {
                self.dispatch(command, Followup::Reply(reply)).await;
            }
            Request::Close { reply } => {
                let result = self.close().await;
                self.publish();
                let _ = reply.send(result);
            }
        }
    }

    async fn request_start(&mut self, force: bool, reply: StartReply) {
        if let Some(attempt) = self.start.as_mut() {
            if attempt.reply.is_none() {
                debug!("waiting on the reconnect attempt in progress");
                attempt.reply = Some(reply);
            } else {
                let _ = reply.send(Err(SessionError::StartInProgress));
            }
            return;
        }

        self.recover = true;
        self.begin_start(force, Some(reply)).await;
    }

    async fn begin_start(&mut self, takeover: bool, reply: Option<StartReply>) {
        self.status.phase = SessionPhase::Connecting;
        self.next_attempt += 1;
        let id = self.next_attempt;
        self.start = Some(StartAttempt {
            id,
            deadline: Instant::now() + self.config.start_timeout,
            reply,
        });
        self.dispatch(Command::StartSession { takeover }, Followup::Start(id))
            .await;
    }

    /// Encode one request and write it, or queue it behind a connect.
    async fn dispatch(&mut self, command: Command, followup: Followup) {
        let envelope = match self.encode(&command) {
            Ok(envelope) => envelope,
            Err(err) => return self.complete(command, followup, Err(err)),
        };

        if self.transport.is_open() {
            let result = self.write(&command, &envelope).await;
            self.complete(command, followup, result);
        } else if followup.may_connect() {
            debug!(command = command.name(), "queued until connected");
            self.outbox.push_back(Outbound {
                command,
                envelope,
                followup,
            });
            self.begin_connect();
        } else {
            let err = TransportError::NotOpen(self.transport.state());
            self.complete(command, followup, Err(err.into()));
        }
    }

    fn encode(&mut self, command: &Command) -> Result<Envelope> {
        let reference = self.next_reference;
        self.next_reference = self.next_reference.wrapping_add(1);
        let encoded = self.codec.encode(command, reference)?;
        trace!(command = command.name(), reference, "request encoded");
        Ok(Envelope::new(
            self.config.identity.local,
            self.config.identity.device,
            encoded.operation,
            encoded.command,
        ))
    }

    /// Write to the open connection. Only written requests become pending.
    async fn write(&mut self, command: &Command, envelope: &Envelope) -> Result<()> {
        self.transport.send(envelope).await?;
        if let Some(expected) = command.expected_kind() {
            self.pending.push(expected, Instant::now());
        }
        debug!(command = command.name(), "request sent");
        Ok(())
    }

    fn begin_connect(&mut self) {
        if self.connecting.is_some() {
            return;
        }
        let dial = self.transport.begin_connect(self.config.address);
        self.connecting = Some(tokio::spawn(dial));
    }

    async fn on_connected(
        &mut self,
        dialed: std::result::Result<comfolink_transport::Result<TcpStream>, JoinError>,
    ) {
        self.connecting = None;
        let result = dialed.unwrap_or_else(|err| Err(TransportError::Io(io::Error::other(err))));

        match self.transport.finish_connect(self.config.address, result) {
            Ok(connection) => {
                debug!(%connection, queued = self.outbox.len(), "sending queued requests");
                while let Some(outbound) = self.outbox.pop_front() {
                    let result = self.write(&outbound.command, &outbound.envelope).await;
                    self.complete(outbound.command, outbound.followup, result);
                }
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                while let Some(outbound) = self.outbox.pop_front() {
                    let failure = SessionError::Transport(shared_failure(&err));
                    self.complete(outbound.command, outbound.followup, Err(failure));
                }
            }
        }
    }

    fn complete(&mut self, command: Command, followup: Followup, result: Result<()>) {
        match followup {
            Followup::Reply(reply) => {
                if let (Ok(()), Command::RegisterSensor(sensor)) = (&result, &command) {
                    if !self.sensors.contains(sensor) {
                        self.sensors.push(*sensor);
                    }
                }
                self.publish();
                let _ = reply.send(result);
            }
            Followup::Start(id) => self.on_start_sent(id, result),
            Followup::KeepAlive => match result {
                Ok(()) => {
                    self.timers.keepalive = Some(Instant::now() + self.config.keepalive_interval);
                    self.timers.reconnect = None;
                }
                Err(err) => {
                    warn!(error = %err, "keepalive failed");
                    self.status.connected = false;
                    self.replay_owed = true;
                    self.schedule_reconnect();
                }
            },
            Followup::Replay(sensor) => match result {
                Ok(()) => debug!(%sensor, "sensor registered again"),
                Err(err) => warn!(%sensor, error = %err, "sensor registration failed"),
            },
        }
    }

    fn on_start_sent(&mut self, id: u64, result: Result<()>) {
        let err = match result {
            Ok(()) => return,
            Err(err) => err,
        };

        warn!(error = %err, "session start could not be sent");
        let attempt = self.start.take_if(|attempt| attempt.id == id);
        if self.recover {
            self.schedule_reconnect();
        }
        self.publish();
        if let Some(reply) = attempt.and_then(|attempt| attempt.reply) {
            let _ = reply.send(Err(err));
        }
    }

    /// Tear the session down locally, then report whether the gateway was told.
    async fn close(&mut self) -> Result<()> {
        self.timers.clear();
        self.recover = false;
        self.replay_owed = false;
        if let Some(dial) = self.connecting.take() {
            dial.abort();
        }

        let sent = if !self.status.connected {
            debug!("no session to close, nothing sent");
            Ok(())
        } else if !self.transport.is_open() {
            debug!("connection already gone, close request not sent");
            Ok(())
        } else {
            let command = Command::CloseSession;
            match self.encode(&command) {
                Ok(envelope) => self.write(&command, &envelope).await,
                Err(err) => Err(err),
            }
        };

        self.sensors.clear();
        self.replay.clear();
        self.pending.clear();
        if let Some(reply) = self.start.take().and_then(|attempt| attempt.reply) {
            let _ = reply.send(Err(SessionError::Closed));
        }
        while let Some(outbound) = self.outbox.pop_front() {
            self.complete(outbound.command, outbound.followup, Err(SessionError::Closed));
        }
        self.status = SessionStatus {
            phase: SessionPhase::Closed,
            ..SessionStatus::default()
        };
        self.transport.close().await;

        match &sent {
            Ok(()) => info!("session closed"),
            Err(err) => warn!(error = %err, "close request not sent"),
        }
        sent
    }

    fn handle_transport(&mut self, event: ConnectionEvent) {
        if !self.transport.handle_event(&event) {
            return;
        }

        match event.event {
            TransportEvent::Frame(frame) => self.handle_frame(frame),
            TransportEvent::Timeout(idle) => {
                self.emit(SessionEvent::Error(format!(
                    "no data from gateway for {idle:?}"
                )));
                self.connection_lost();
            }
            TransportEvent::Error(err) => {
                self.emit(SessionEvent::Error(err.to_string()));
                self.connection_lost();
            }
            TransportEvent::Disconnected => self.connection_lost(),
        }
    }

    fn handle_frame(&mut self, frame: Bytes) {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                return;
            }
        };
        let message = match self.codec.decode(&envelope) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping undecodable message");
                return;
            }
        };

        if self.pending.resolve(message.kind).is_none() {
            trace!(kind = message.kind, "unsolicited message");
        }

        match message.kind {
            kind::START_SESSION_CONFIRM => self.on_start_confirm(&message),
            kind::CN_TIME_CONFIRM
            | kind::CN_NODE_NOTIFICATION
            | kind::REGISTER_APP_CONFIRM
            | kind::LIST_REGISTERED_APPS_CONFIRM => {
                info!(kind = kind_name(message.kind), status = %message.status, "gateway reply");
            }
            kind::CLOSE_SESSION_REQUEST => {
                warn!("gateway closed the session, another client took over");
                self.emit(SessionEvent::Disconnect(DisconnectReason::OtherSession));
            }
            _ => {}
        }

        self.emit(SessionEvent::Receive(InboundMessage {
            kind: message.kind,
            status: message.status,
            description: message.description,
            reference: message.reference,
            payload: message.payload,
            received_at: SystemTime::now(),
        }));
    }

    fn on_start_confirm(&mut self, message: &DecodedMessage) {
        let attempt = self.start.take();
        if attempt.is_none() && !self.recover {
            debug!("ignoring session confirmation, no session requested");
            return;
        }
        let reply = attempt.and_then(|attempt| attempt.reply);

        if !message.status.is_ok() {
            warn!(status = %message.status, "session start rejected");
            self.status.connected = false;
            self.timers.keepalive = None;
            self.schedule_reconnect();
            self.publish();
            if let Some(reply) = reply {
                let _ = reply.send(Err(SessionError::RequestRejected(message.status)));
            }
            return;
        }

        let resumed = match self.codec.decode_session_confirm(&message.payload) {
            Ok(confirm) => confirm.resumed,
            Err(err) => {
                warn!(error = %err, "unreadable session confirmation body");
                false
            }
        };

        let now = Instant::now();
        self.status.connected = true;
        self.status.resumed = resumed;
        self.status.phase = SessionPhase::Connected;
        self.timers.reconnect = None;
        self.timers.keepalive = Some(now + self.config.keepalive_interval);
        info!(resumed, "session confirmed");

        if std::mem::take(&mut self.replay_owed) && !self.sensors.is_empty() {
            debug!(sensors = self.sensors.len(), "replaying sensor registrations");
            self.replay = self.sensors.iter().copied().collect();
            self.timers.replay = Some(now);
        }

        self.publish();
        if let Some(reply) = reply {
            let _ = reply.send(Ok(SessionStart { resumed }));
        }
    }

    fn on_start_timeout(&mut self) {
        let Some(attempt) = self.start.take() else {
            return;
        };

        warn!(timeout = ?self.config.start_timeout, "no session confirmation");
        self.timers.keepalive = None;
        self.schedule_reconnect();
        self.publish();
        if let Some(reply) = attempt.reply {
            let _ = reply.send(Err(SessionError::ConnectTimeout(self.config.start_timeout)));
        }
    }

    async fn on_keepalive(&mut self) {
        self.timers.keepalive = None;

        if !self.status.connected {
            if self.recover {
                self.schedule_reconnect();
            }
            return;
        }

        let now = Instant::now();
        for entry in self.pending.stale(now, self.config.keepalive_interval) {
            warn!(
                kind = kind_name(entry.expected_kind),
                waited = ?now.saturating_duration_since(entry.submitted_at),
                "no response received, suspected timeout"
            );
        }

        self.dispatch(Command::KeepAlive, Followup::KeepAlive).await;
    }

    async fn on_reconnect(&mut self) {
        self.timers.reconnect = None;
        if self.status.connected || self.start.is_some() || self.connecting.is_some() {
            return;
        }

        info!("starting reconnection");
        self.replay_owed = true;
        self.begin_start(false, None).await;
    }

    async fn on_replay(&mut self) {
        self.timers.replay = None;
        if !self.status.connected {
            self.replay.clear();
            return;
        }
        let Some(sensor) = self.replay.pop_front() else {
            return;
        };

        self.dispatch(Command::RegisterSensor(sensor), Followup::Replay(sensor))
            .await;

        if !self.replay.is_empty() {
            self.timers.replay = Some(Instant::now() + self.config.replay_delay);
        }
    }

    /// Mark the connection gone and, if a session is wanted, schedule a reconnect.
    fn connection_lost(&mut self) {
        info!("gateway connection lost");
        self.status.connected = false;
        self.timers.keepalive = None;
        self.timers.replay = None;
        self.replay.clear();
        let attempt = self.start.take();

        if self.recover {
            self.replay_owed = true;
            self.schedule_reconnect();
        } else if self.status.phase != SessionPhase::Closed {
            self.status.phase = SessionPhase::Disconnected;
        }
        self.publish();

        if let Some(reply) = attempt.and_then(|attempt| attempt.reply) {
            let _ = reply.send(Err(SessionError::ConnectionLost));
        }
        self.emit(SessionEvent::Disconnect(DisconnectReason::Disconnected));
    }

    fn schedule_reconnect(&mut self) {
        let at = Instant::now() + self.config.reconnect_interval;
        if self.timers.arm_reconnect(at) {
            info!(delay = ?self.config.reconnect_interval, "reconnect scheduled");
        }
        if !self.status.connected {
            self.status.phase = SessionPhase::Reconnecting;
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn publish(&mut self) {
        let mut status = self.status;
        status.reconnect_armed = self.timers.reconnect.is_some();
        self.status = status;
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// The same connect failure, once for every request that waited on it.
fn shared_failure(err: &TransportError) -> TransportError {
    match err {
        TransportError::Connect { addr, source } => TransportError::Connect {
            addr: *addr,
            source: io::Error::new(source.kind(), source.to_string()),
        },
        TransportError::ConnectTimeout { addr, timeout } => TransportError::ConnectTimeout {
            addr: *addr,
            timeout: *timeout,
        },
        other => TransportError::Io(io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use comfolink_transport::SocketState;
    use tokio::net::TcpListener;

    use super::*;
    use crate::kind::GatewayStatus;

    struct Harness {
        actor: Actor,
        _transport_rx: mpsc::Receiver<ConnectionEvent>,
        _status_rx: watch::Receiver<SessionStatus>,
    }

    fn harness(addr: SocketAddr) -> Harness {
        let identity = Identity::new(
            DeviceId::from_bytes([0xC1; 16]),
            DeviceId::from_bytes([0x6A; 16]),
        );
        let mut config = SessionConfig::new(addr, identity);
        config.transport.idle_timeout = None;
        config.transport.connect_timeout = Duration::from_secs(2);

        let (transport, transport_rx) = Transport::new(config.transport.clone());
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (events, _) = broadcast::channel(16);
        let actor = Actor::new(
            Arc::new(config),
            Arc::new(GatewayCodec),
            transport,
            status_tx,
            events,
        );
        Harness {
            actor,
            _transport_rx: transport_rx,
            _status_rx: status_rx,
        }
    }

    async fn refused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    /// Wait for the detached connect and hand its result to the actor.
    async fn settle_connect(actor: &mut Actor) {
        let dialed = actor
            .connecting
            .as_mut()
            .expect("connect in progress")
            .await;
        actor.on_connected(dialed).await;
    }

    fn confirm(status: GatewayStatus) -> DecodedMessage {
        DecodedMessage {
            kind: kind::START_SESSION_CONFIRM,
            status,
            description: None,
            reference: None,
            payload: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn requests_wait_for_a_detached_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = harness(listener.local_addr().unwrap());
        let (reply, mut replied) = oneshot::channel();

        h.actor
            .dispatch(Command::VersionRequest, Followup::Reply(reply))
            .await;
        assert!(h.actor.connecting.is_some());
        assert_eq!(h.actor.outbox.len(), 1);
        assert!(h.actor.pending.is_empty());
        assert!(replied.try_recv().is_err());

        settle_connect(&mut h.actor).await;
        let _peer = listener.accept().await.unwrap();

        assert!(matches!(replied.try_recv(), Ok(Ok(()))));
        assert!(h.actor.outbox.is_empty());
        assert_eq!(h.actor.pending.len(), 1);
    }

    #[tokio::test]
    async fn failed_connects_leave_nothing_pending() {
        let mut h = harness(refused_addr().await);
        h.actor.recover = true;

        for _ in 0..3 {
            h.actor.on_reconnect().await;
            settle_connect(&mut h.actor).await;

            assert!(h.actor.start.is_none());
            assert!(h.actor.timers.reconnect.is_some());
        }

        assert!(h.actor.pending.is_empty());
        assert!(h.actor.outbox.is_empty());
        assert!(!h.actor.status.connected);
        assert_eq!(h.actor.status.phase, SessionPhase::Reconnecting);
    }

    #[tokio::test]
    async fn caller_request_fails_with_the_connect_error() {
        let mut h = harness(refused_addr().await);
        let (reply, mut replied) = oneshot::channel();

        h.actor.dispatch(Command::TimeRequest, Followup::Reply(reply)).await;
        settle_connect(&mut h.actor).await;

        assert!(matches!(
            replied.try_recv(),
            Ok(Err(SessionError::Transport(TransportError::Connect { .. })))
        ));
        assert!(h.actor.pending.is_empty());
    }

    #[tokio::test]
    async fn close_tears_down_without_a_connection() {
        let mut h = harness(refused_addr().await);
        let now = Instant::now();
        h.actor.status.connected = true;
        h.actor.status.phase = SessionPhase::Connected;
        h.actor.recover = true;
        h.actor.replay_owed = true;
        h.actor.sensors.push(SensorId::new(117, 1));
        h.actor.replay.push_back(SensorId::new(117, 1));
        h.actor.timers.keepalive = Some(now);
        h.actor.timers.replay = Some(now);
        h.actor.timers.reconnect = Some(now);
        let (reply, mut started) = oneshot::channel();
        h.actor.start = Some(StartAttempt {
            id: 7,
            deadline: now + Duration::from_secs(15),
            reply: Some(reply),
        });

        h.actor.close().await.unwrap();

        // the close request is never worth opening a connection for
        assert!(h.actor.connecting.is_none());
        assert_ne!(h.actor.transport.state(), SocketState::Connecting);

        assert!(h.actor.timers.keepalive.is_none());
        assert!(h.actor.timers.replay.is_none());
        assert!(h.actor.timers.reconnect.is_none());
        assert!(h.actor.sensors.is_empty());
        assert!(h.actor.replay.is_empty());
        assert!(!h.actor.recover);
        assert!(!h.actor.replay_owed);
        assert!(!h.actor.status.connected);
        assert_eq!(h.actor.status.phase, SessionPhase::Closed);
        assert!(matches!(started.try_recv(), Ok(Err(SessionError::Closed))));
    }

    #[tokio::test]
    async fn close_abandons_queued_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = harness(listener.local_addr().unwrap());
        let (reply, mut replied) = oneshot::channel();

        h.actor
            .dispatch(Command::ListRegisteredApps, Followup::Reply(reply))
            .await;
        assert!(h.actor.connecting.is_some());

        h.actor.close().await.unwrap();

        assert!(h.actor.connecting.is_none());
        assert!(h.actor.outbox.is_empty());
        assert!(h.actor.pending.is_empty());
        assert_eq!(h.actor.transport.state(), SocketState::Closed);
        assert!(matches!(replied.try_recv(), Ok(Err(SessionError::Closed))));
    }

    #[tokio::test]
    async fn late_confirmation_after_timeout_replays_sensors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = harness(listener.local_addr().unwrap());
        let flow = SensorId::new(117, 1);
        let temperature = SensorId::new(276, 6);
        h.actor.sensors = vec![flow, temperature];
        h.actor.recover = true;

        h.actor.on_reconnect().await;
        settle_connect(&mut h.actor).await;
        let _peer = listener.accept().await.unwrap();

        h.actor.on_start_timeout();
        assert!(h.actor.start.is_none());
        assert!(h.actor.timers.reconnect.is_some());

        h.actor.on_start_confirm(&confirm(GatewayStatus::Ok));

        assert!(h.actor.status.connected);
        assert!(h.actor.timers.reconnect.is_none());
        assert_eq!(h.actor.replay, VecDeque::from([flow, temperature]));
        assert!(h.actor.timers.replay.is_some());
        assert!(!h.actor.replay_owed);
    }

    #[tokio::test]
    async fn first_confirmation_does_not_replay() {
        let mut h = harness(refused_addr().await);
        h.actor.sensors = vec![SensorId::new(117, 1)];
        h.actor.recover = true;
        h.actor.start = Some(StartAttempt {
            id: 1,
            deadline: Instant::now() + Duration::from_secs(15),
            reply: None,
        });

        h.actor.on_start_confirm(&confirm(GatewayStatus::Ok));

        assert!(h.actor.status.connected);
        assert!(h.actor.replay.is_empty());
        assert!(h.actor.timers.replay.is_none());
    }

    #[tokio::test]
    async fn failed_keepalive_arms_one_reconnect_until_confirmed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = harness(listener.local_addr().unwrap());
        h.actor.recover = true;
        h.actor.status.connected = true;
        h.actor.status.phase = SessionPhase::Connected;

        // nothing open, so the keepalive cannot be written
        h.actor.on_keepalive().await;
        assert!(!h.actor.status.connected);
        assert!(h.actor.connecting.is_none());
        let armed = h.actor.timers.reconnect.expect("reconnect armed");

        h.actor.status.connected = true;
        h.actor.on_keepalive().await;
        assert_eq!(h.actor.timers.reconnect, Some(armed));
        assert!(h.actor.pending.is_empty());

        h.actor.on_reconnect().await;
        settle_connect(&mut h.actor).await;
        let _peer = listener.accept().await.unwrap();
        h.actor.on_start_confirm(&confirm(GatewayStatus::Ok));

        assert!(h.actor.status.connected);
        assert!(h.actor.timers.reconnect.is_none());
        assert!(h.actor.timers.keepalive.is_some());
        assert_eq!(h.actor.status.phase, SessionPhase::Connected);
    }

    #[tokio::test]
    async fn confirmation_after_close_is_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = harness(listener.local_addr().unwrap());
        h.actor.recover = true;

        h.actor.on_reconnect().await;
        settle_connect(&mut h.actor).await;
        let _peer = listener.accept().await.unwrap();
        assert!(h.actor.start.is_some());

        h.actor.close().await.unwrap();
        h.actor.on_start_confirm(&confirm(GatewayStatus::Ok));

        assert!(!h.actor.status.connected);
        assert_eq!(h.actor.status.phase, SessionPhase::Closed);
        assert!(h.actor.timers.keepalive.is_none());
        assert!(h.actor.timers.reconnect.is_none());
    }
}
