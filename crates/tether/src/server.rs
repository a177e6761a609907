//! The relay server: session table, handshake, and fan-out.
//!
//! `RelayServer` owns a transport and a [`SessionManager`]. Everything
//! happens inside [`tick`](RelayServer::tick), on whichever thread drives
//! it:
//!
//! ```text
//! tick(dt)
//!   1. drain the transport: handshakes, frames, inbound envelopes
//!        inbound envelope → Dispatcher → (Recipient, ServerMessage) → sessions
//!   2. session timers: retransmission, heartbeats, timeouts
//!   3. reap terminated sessions, announce departures
//!   4. write every session's outbox to the transport
//! ```
//!
//! The relay never echoes a message to its sender: every relayed message
//! goes to `Recipient::AllExcept(sender)`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tether_protocol::{
    ClientMessage, ClientToServerId, EncodedMessage, Message, MessageReader, PROTOCOL_VERSION,
    ProtocolError, Recipient, ServerMessage, SessionId,
};
use tether_session::{CloseReason, Frame, RejectReason, SessionManager};
use tether_tick::Tickable;
use tether_transport::{Transport, UdpTransport};

use crate::{Dispatched, Dispatcher, ServerConfig, TetherError};

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Something the host may want to know about. Drained with
/// [`RelayServer::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A peer completed the handshake and got a session id.
    ParticipantJoined { id: SessionId, addr: SocketAddr },

    /// A session was removed. `reason` says whether it disconnected,
    /// timed out, or stopped acknowledging.
    ParticipantLeft { id: SessionId, reason: CloseReason },

    /// An inbound envelope could not be decoded and was not relayed.
    MessageRejected { id: SessionId, error: ProtocolError },

    /// A `Connect` was turned away.
    ConnectionRejected { addr: SocketAddr, reason: RejectReason },
}

// ---------------------------------------------------------------------------
// Relay handlers
// ---------------------------------------------------------------------------

/// Handler context: who sent the message being dispatched, and what the
/// handlers want sent in response.
#[derive(Debug)]
struct Relay {
    sender: SessionId,
    default_avatar: String,
    /// Last avatar name each participant announced.
    avatar_names: HashMap<SessionId, String>,
    outgoing: Vec<(Recipient, ServerMessage)>,
}

impl Relay {
    fn new(default_avatar: String) -> Self {
        Self {
            sender: SessionId(0),
            default_avatar,
            avatar_names: HashMap::new(),
            outgoing: Vec::new(),
        }
    }

    /// Turns a client message into its server→client counterpart,
    /// addressed to everyone but the sender.
    fn relay(&mut self, msg: ClientMessage) {
        let sender = self.sender;
        let out = match msg {
            ClientMessage::AvatarSpawned { avatar } => {
                let avatar_name = avatar
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| self.default_avatar.clone());
                self.avatar_names.insert(sender, avatar_name.clone());
                ServerMessage::SpawnRemoteAvatar {
                    sender,
                    avatar_name,
                }
            }
            ClientMessage::UpdateAvatarTransform(pose) => {
                ServerMessage::MoveAvatarTransform { sender, pose }
            }
            ClientMessage::UpdateAvatarBones { bones } => {
                ServerMessage::MoveAvatarBones { sender, bones }
            }
            ClientMessage::UpdateRigidbodyTransform { object_id, pose } => {
                ServerMessage::MoveRigidbodyTransform { object_id, pose }
            }
        };
        self.outgoing.push((Recipient::AllExcept(sender), out));
    }

    fn avatar_name(&self, id: SessionId) -> &str {
        self.avatar_names
            .get(&id)
            .map_or(self.default_avatar.as_str(), String::as_str)
    }
}

/// One handler per client→server id. Each decodes every field before
/// relaying, so a truncated message produces an error and nothing else.
fn relay_dispatcher() -> Dispatcher<Relay> {
    let mut dispatcher = Dispatcher::new();
    for id in ClientToServerId::ALL {
        dispatcher.register(id, move |relay: &mut Relay, reader: &mut MessageReader| {
            let msg = ClientMessage::decode(id, reader)?;
            relay.relay(msg);
            Ok(())
        });
    }
    dispatcher
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), tether::TetherError> {
/// use tether::RelayServer;
///
/// let mut server = RelayServer::builder()
///     .port(7777)
///     .max_connections(16)
///     .bind()
///     .await?;
/// server.tick(std::time::Duration::from_millis(10));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayServerBuilder {
    config: ServerConfig,
}

impl RelayServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    pub fn default_avatar(mut self, name: impl Into<String>) -> Self {
        self.config.default_avatar = name.into();
        self
    }

    pub fn announce_departures(mut self, announce: bool) -> Self {
        self.config.announce_departures = announce;
        self
    }

    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Builds a relay over an already-bound transport.
    pub fn build<T: Transport>(self, transport: T) -> Result<RelayServer<T>, TetherError> {
        self.config.validate()?;
        Ok(RelayServer::new(transport, self.config))
    }

    /// Binds a UDP socket on all interfaces at the configured port.
    pub async fn bind(self) -> Result<RelayServer<UdpTransport>, TetherError> {
        self.config.validate()?;
        let transport = UdpTransport::bind(self.config.bind_addr()).await?;
        Ok(RelayServer::new(transport, self.config))
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

pub struct RelayServer<T: Transport> {
    transport: T,
    sessions: SessionManager,
    dispatcher: Dispatcher<Relay>,
    relay: Relay,
    /// Nonce of the last session each address replaced, so a delayed
    /// `Connect` from that attempt cannot replace its successor.
    retired: HashMap<SocketAddr, u32>,
    config: ServerConfig,
    now: Duration,
    events: Vec<ServerEvent>,
    stopped: bool,
}

impl RelayServer<UdpTransport> {
    /// Starts configuring a relay. [`RelayServerBuilder::build`] accepts
    /// any transport; [`RelayServerBuilder::bind`] binds UDP.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Binds UDP `port` and accepts up to `max_connections` sessions,
    /// everything else at its default.
    pub async fn start(port: u16, max_connections: usize) -> Result<Self, TetherError> {
        Self::builder()
            .port(port)
            .max_connections(max_connections)
            .bind()
            .await
    }
}

impl<T: Transport> RelayServer<T> {
    /// Wraps a bound transport. The config is used as given; prefer the
    /// builder, which validates it.
    pub fn new(transport: T, config: ServerConfig) -> Self {
        tracing::info!(
            addr = %transport.local_addr(),
            max_connections = config.max_connections,
            "relay listening"
        );
        Self {
            sessions: SessionManager::new(config.session_config(), config.max_connections),
            dispatcher: relay_dispatcher(),
            relay: Relay::new(config.default_avatar.clone()),
            retired: HashMap::new(),
            transport,
            config,
            now: Duration::ZERO,
            events: Vec::new(),
            stopped: false,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The relay's logical clock: the sum of every `dt` it was ticked with.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Every session id in the table, any state, ascending.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.ids()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.connected_ids().len()
    }

    /// The avatar name the relay announces for `id`.
    pub fn avatar_name(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(id).map(|_| self.relay.avatar_name(id))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Takes every event queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Sending ----------------------------------------------------------

    /// Queues a server-authored message for every connected session the
    /// recipient includes. Returns how many sessions it was queued on.
    /// Frames go out at the end of the next tick.
    pub fn send(&mut self, recipient: Recipient, msg: &ServerMessage) -> Result<usize, TetherError> {
        let encoded = msg.to_message().finalize()?;
        Ok(self.fan_out(recipient, &encoded))
    }

    fn fan_out(&mut self, recipient: Recipient, encoded: &EncodedMessage) -> usize {
        let now = self.now;
        let mut queued = 0;
        for session in self.sessions.iter_mut() {
            let Some(id) = session.id() else { continue };
            if !session.is_connected() || !recipient.includes(id) {
                continue;
            }
            match session.send(encoded, now) {
                Ok(()) => queued += 1,
                Err(e) => {
                    tracing::debug!(session_id = %id, error = %e, "message dropped for session");
                }
            }
        }
        queued
    }

    fn send_logged(&mut self, recipient: Recipient, msg: &ServerMessage) {
        if let Err(e) = self.send(recipient, msg) {
            tracing::debug!(id = %msg.id(), error = %e, "server message not sent");
        }
    }

    // -- Tick -------------------------------------------------------------

    /// Runs one relay step. See the module docs for the order of work.
    /// Does nothing after [`stop`](Self::stop).
    pub fn tick(&mut self, dt: Duration) {
        if self.stopped {
            return;
        }
        self.now += dt;
        self.receive();
        self.sessions.tick_all(self.now);
        self.reap();
        self.flush();
    }

    fn receive(&mut self) {
        while let Some(datagram) = self.transport.try_recv() {
            let from = datagram.from;
            let frame = match Frame::decode(datagram.data) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(addr = %from, error = %e, "undecodable frame");
                    continue;
                }
            };
            match self.sessions.id_for(&from) {
                Some(id) if self.is_new_connection(id, &frame) => {
                    self.replace_session(id);
                    self.handle_stranger(from, frame);
                }
                Some(id) => self.handle_frame(id, frame),
                None => self.handle_stranger(from, frame),
            }
        }
    }

    /// A `Connect` whose nonce differs from the one `id` was opened with:
    /// the peer restarted its end and is not retrying a lost `Accept`.
    fn is_new_connection(&self, id: SessionId, frame: &Frame) -> bool {
        let Frame::Connect { nonce, .. } = frame else {
            return false;
        };
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        session.nonce() != *nonce && self.retired.get(&session.remote()) != Some(nonce)
    }

    /// Retires the session the peer abandoned. It leaves through `reap`
    /// like any other departure, so the others hear about it before the
    /// new connection is accepted.
    fn replace_session(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            tracing::info!(session_id = %id, remote = %session.remote(), "peer reconnected, replacing session");
            session.supersede();
            self.retired.insert(session.remote(), session.nonce());
        }
        self.reap();
    }

    fn handle_frame(&mut self, id: SessionId, frame: Frame) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let delivered = session.handle_frame(frame, self.now);
        for envelope in delivered {
            self.handle_envelope(id, envelope);
        }
    }

    /// Decodes one inbound envelope and relays whatever its handler
    /// produced. Relayed messages go out in arrival order.
    fn handle_envelope(&mut self, sender: SessionId, envelope: Bytes) {
        let (raw_id, mut reader) = match Message::parse(envelope) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.reject_message(sender, e);
                return;
            }
        };

        self.relay.sender = sender;
        match self.dispatcher.dispatch(&mut self.relay, raw_id, &mut reader) {
            Ok(Dispatched::Handled) => {}
            Ok(Dispatched::Unhandled) => {
                tracing::debug!(session_id = %sender, id = raw_id, "unknown message type, ignoring");
            }
            Err(e) => {
                self.relay.outgoing.clear();
                self.reject_message(sender, e);
                return;
            }
        }

        for (recipient, msg) in std::mem::take(&mut self.relay.outgoing) {
            self.send_logged(recipient, &msg);
        }
    }

    fn reject_message(&mut self, sender: SessionId, error: ProtocolError) {
        tracing::debug!(session_id = %sender, error = %error, "discarding malformed message");
        self.events.push(ServerEvent::MessageRejected { id: sender, error });
    }

    /// A frame from an address with no live session. Only `Connect` is
    /// meaningful; anything else is a leftover from a removed session.
    fn handle_stranger(&mut self, addr: SocketAddr, frame: Frame) {
        let Frame::Connect { version, nonce } = frame else {
            tracing::trace!(%addr, kind = frame.kind_name(), "frame from unknown peer, ignoring");
            return;
        };
        if version != PROTOCOL_VERSION {
            tracing::debug!(%addr, version, expected = PROTOCOL_VERSION, "protocol version mismatch");
            self.refuse(addr, RejectReason::VersionMismatch);
            return;
        }
        match self.sessions.accept(addr, nonce, self.now) {
            Ok(id) => self.on_join(id, addr),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "cannot accept connection");
                self.refuse(addr, RejectReason::ServerFull);
            }
        }
    }

    fn refuse(&mut self, addr: SocketAddr, reason: RejectReason) {
        tracing::info!(%addr, %reason, "connection refused");
        write(&self.transport, addr, &Frame::Reject { reason }.encode());
        self.events.push(ServerEvent::ConnectionRejected { addr, reason });
    }

    /// A new participant starts with the default avatar: it is told its
    /// own identity, everyone else is told it arrived, and it is told who
    /// is already here.
    fn on_join(&mut self, id: SessionId, addr: SocketAddr) {
        tracing::info!(session_id = %id, %addr, "participant joined");

        let welcome = ServerMessage::SpawnRemoteAvatar {
            sender: id,
            avatar_name: self.relay.default_avatar.clone(),
        };
        self.send_logged(Recipient::Session(id), &welcome);
        self.send_logged(Recipient::AllExcept(id), &welcome);

        for other in self.sessions.connected_ids() {
            if other == id {
                continue;
            }
            let roster = ServerMessage::SpawnRemoteAvatar {
                sender: other,
                avatar_name: self.relay.avatar_name(other).to_owned(),
            };
            self.send_logged(Recipient::Session(id), &roster);
        }

        self.events.push(ServerEvent::ParticipantJoined { id, addr });
    }

    /// Removes terminated sessions, sends their last frames, and tells
    /// the remaining participants.
    fn reap(&mut self) {
        for mut session in self.sessions.remove_terminated() {
            let Some(id) = session.id() else { continue };
            let reason = session.close_reason().unwrap_or(CloseReason::Local);
            for frame in session.drain_outbox() {
                write(&self.transport, session.remote(), &frame);
            }
            if reason != CloseReason::Superseded {
                self.retired.remove(&session.remote());
            }
            self.relay.avatar_names.remove(&id);

            tracing::info!(session_id = %id, %reason, "participant left");
            if self.config.announce_departures {
                self.send_logged(
                    Recipient::AllExcept(id),
                    &ServerMessage::ParticipantLeft { sender: id },
                );
            }
            self.events.push(ServerEvent::ParticipantLeft { id, reason });
        }
    }

    fn flush(&mut self) {
        for session in self.sessions.iter_mut() {
            let remote = session.remote();
            for frame in session.drain_outbox() {
                write(&self.transport, remote, &frame);
            }
        }
    }

    /// Disconnects every session gracefully and closes the transport.
    /// Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        let now = self.now;
        for session in self.sessions.iter_mut() {
            session.disconnect(now);
        }
        self.reap();
        self.flush();
        self.transport.close();
        self.stopped = true;
        tracing::info!("relay stopped");
    }
}

impl<T: Transport> Tickable for RelayServer<T> {
    fn tick(&mut self, dt: Duration) {
        RelayServer::tick(self, dt);
    }
}

/// Writes one frame. Loss is the transport's prerogative, so failures are
/// logged and otherwise ignored.
fn write<T: Transport>(transport: &T, addr: SocketAddr, frame: &[u8]) {
    if let Err(e) = transport.send_to(addr, frame) {
        tracing::debug!(%addr, error = %e, "send failed");
    }
}
