//! One participant's connection: handshake, liveness, and delivery.
//!
//! A [`Session`] never touches a socket. Incoming frames are fed to
//! [`Session::handle_frame`]; outgoing frames pile up in an outbox that
//! the owner drains and writes to its transport. Time is whatever the
//! owner says it is (`now` is a logical clock, not `Instant::now()`).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tether_protocol::{DeliveryMode, EncodedMessage, PROTOCOL_VERSION, SessionId};

use crate::reliability::{ReliableChannel, Received};
use crate::{Frame, RejectReason, SessionError};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing knobs for every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Silence longer than this ends the session as `TimedOut`.
    ///
    /// Default: 10 seconds.
    pub timeout: Duration,

    /// An idle session sends a heartbeat this often so the peer's
    /// timeout never fires on a healthy link.
    ///
    /// Default: 1 second.
    pub heartbeat_interval: Duration,

    /// Unacked reliable frames (and unanswered `Connect`s) are resent
    /// this often.
    ///
    /// Default: 100 ms.
    pub resend_interval: Duration,

    /// Retransmissions of one reliable frame before the session gives up
    /// and times out.
    ///
    /// Default: 50.
    pub max_resends: u32,

    /// How long a client waits for `Accept` before reporting failure.
    ///
    /// Default: 5 seconds.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(1),
            resend_interval: Duration::from_millis(100),
            max_resends: 50,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a session.
///
/// ```text
///   Connecting ──(accept)──→ Connected ──(silence / no acks)──→ TimedOut
///       │                        │
///       └──────(close)───────────┴──────────(close)──────────→ Disconnected
/// ```
///
/// `TimedOut` and `Disconnected` are terminal. A session enters one of
/// them exactly once and never leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    TimedOut,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TimedOut | Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::TimedOut => "timed out",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// How a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// This side called `disconnect()`.
    Local,
    /// The peer sent `Disconnect`.
    Remote,
    /// No traffic within the timeout window.
    TimedOut,
    /// A reliable frame went unacknowledged through every retransmission.
    RetransmitExhausted,
    /// The server refused the handshake.
    Rejected(RejectReason),
    /// No `Accept` within the connect timeout.
    ConnectTimeout,
    /// The peer connected again from the same address.
    Superseded,
}

impl CloseReason {
    /// The error a caller should see for this close, if it is a failure.
    pub fn as_error(self) -> Option<SessionError> {
        match self {
            Self::Local | Self::Remote | Self::Superseded => None,
            Self::TimedOut | Self::RetransmitExhausted => Some(SessionError::ConnectionTimedOut),
            Self::Rejected(_) | Self::ConnectTimeout => Some(SessionError::ConnectionFailed(self)),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "closed locally"),
            Self::Remote => write!(f, "closed by peer"),
            Self::TimedOut => write!(f, "timed out"),
            Self::RetransmitExhausted => write!(f, "reliable retransmissions exhausted"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::ConnectTimeout => write!(f, "no response to connect"),
            Self::Superseded => write!(f, "replaced by a new connection"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One end of a connection.
#[derive(Debug)]
pub struct Session {
    id: Option<SessionId>,
    remote: SocketAddr,
    /// Picked by the client per connection attempt, echoed by the server.
    nonce: u32,
    state: SessionState,
    close_reason: Option<CloseReason>,
    config: SessionConfig,
    reliable: ReliableChannel,
    outbox: Vec<Bytes>,
    started_at: Duration,
    last_recv: Duration,
    last_send: Duration,
}

impl Session {
    /// Server side: a session for a peer whose `Connect` was accepted.
    /// Starts `Connected` with the `Accept` frame already queued.
    pub fn accepted(
        id: SessionId,
        remote: SocketAddr,
        nonce: u32,
        config: SessionConfig,
        now: Duration,
    ) -> Self {
        let mut session = Self::new(Some(id), remote, nonce, SessionState::Connected, config, now);
        session.queue_accept(now);
        session
    }

    /// Client side: a session that is still waiting for `Accept`.
    /// The first `Connect` is already queued, under a fresh random nonce.
    pub fn connecting(remote: SocketAddr, config: SessionConfig, now: Duration) -> Self {
        let nonce = rand::random();
        let mut session = Self::new(None, remote, nonce, SessionState::Connecting, config, now);
        session.queue_connect(now);
        session
    }

    fn new(
        id: Option<SessionId>,
        remote: SocketAddr,
        nonce: u32,
        state: SessionState,
        config: SessionConfig,
        now: Duration,
    ) -> Self {
        Self {
            id,
            remote,
            nonce,
            state,
            close_reason: None,
            config,
            reliable: ReliableChannel::new(),
            outbox: Vec::new(),
            started_at: now,
            last_recv: now,
            last_send: now,
        }
    }

    // -- Accessors --------------------------------------------------------

    /// The server-assigned id. `None` on a client until `Accept` arrives.
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// The handshake nonce this session was opened with.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Logical time of the last frame received from the peer.
    pub fn last_activity(&self) -> Duration {
        self.last_recv
    }

    /// Reliable frames awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.reliable.in_flight()
    }

    /// Takes every frame queued for the peer, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outbox)
    }

    // -- Sending ----------------------------------------------------------

    /// Queues an envelope for the peer using its delivery mode.
    ///
    /// Reliable envelopes are kept for retransmission until acked;
    /// unreliable ones are written once. Sending on anything but a
    /// `Connected` session fails with [`SessionError::SendAfterDisconnect`]
    /// and has no other effect.
    pub fn send(&mut self, message: &EncodedMessage, now: Duration) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::SendAfterDisconnect);
        }
        match message.mode() {
            DeliveryMode::Reliable => {
                let frame = self
                    .reliable
                    .send(message.bytes().clone(), now)
                    .ok_or(SessionError::SendQueueFull {
                        in_flight: self.reliable.in_flight(),
                    })?;
                self.queue(frame, now);
            }
            DeliveryMode::Unreliable => {
                let frame = Frame::Unreliable {
                    envelope: message.bytes().clone(),
                };
                self.queue(frame.encode(), now);
            }
        }
        Ok(())
    }

    fn queue(&mut self, frame: Bytes, now: Duration) {
        self.outbox.push(frame);
        self.last_send = now;
    }

    fn queue_connect(&mut self, now: Duration) {
        let frame = Frame::Connect {
            version: PROTOCOL_VERSION,
            nonce: self.nonce,
        };
        self.queue(frame.encode(), now);
    }

    fn queue_accept(&mut self, now: Duration) {
        if let Some(session_id) = self.id {
            let frame = Frame::Accept {
                session_id,
                nonce: self.nonce,
            };
            self.queue(frame.encode(), now);
        }
    }

    // -- Receiving --------------------------------------------------------

    /// Applies one frame from the peer and returns any envelopes that are
    /// now ready for the application, in delivery order.
    pub fn handle_frame(&mut self, frame: Frame, now: Duration) -> Vec<Bytes> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.last_recv = now;

        match frame {
            Frame::Connect { nonce, .. } => {
                // Same nonce: our Accept was lost and the peer is still
                // knocking. A new nonce belongs to the owner to sort out
                // (see `supersede`).
                if self.is_connected() && nonce == self.nonce {
                    self.queue_accept(now);
                }
                Vec::new()
            }
            Frame::Accept { session_id, nonce } => {
                if self.state != SessionState::Connecting {
                    return Vec::new();
                }
                if nonce != self.nonce {
                    tracing::debug!(remote = %self.remote, "accept for an earlier connection, ignoring");
                    return Vec::new();
                }
                self.id = Some(session_id);
                self.state = SessionState::Connected;
                tracing::info!(session_id = %session_id, remote = %self.remote, "handshake complete");
                Vec::new()
            }
            Frame::Reject { reason } => {
                if self.state == SessionState::Connecting {
                    self.close(SessionState::Disconnected, CloseReason::Rejected(reason));
                }
                Vec::new()
            }
            Frame::Disconnect => {
                self.close(SessionState::Disconnected, CloseReason::Remote);
                Vec::new()
            }
            Frame::Heartbeat => Vec::new(),
            Frame::Unreliable { envelope } => {
                if self.is_connected() {
                    vec![envelope]
                } else {
                    Vec::new()
                }
            }
            Frame::Reliable { seq, envelope } => {
                if !self.is_connected() {
                    return Vec::new();
                }
                self.queue(Frame::Ack { seq }.encode(), now);
                match self.reliable.receive(seq, envelope) {
                    Received::Deliver(ready) => ready,
                    Received::Buffered => Vec::new(),
                    Received::Duplicate => {
                        tracing::trace!(seq, remote = %self.remote, "duplicate reliable frame");
                        Vec::new()
                    }
                }
            }
            Frame::Ack { seq } => {
                self.reliable.ack(seq);
                Vec::new()
            }
        }
    }

    // -- Time -------------------------------------------------------------

    /// Drives handshake retries, retransmission, heartbeats, and timeout
    /// detection. Call on a steady cadence with the current logical time.
    pub fn tick(&mut self, now: Duration) {
        match self.state {
            SessionState::Connecting => self.tick_connecting(now),
            SessionState::Connected => self.tick_connected(now),
            SessionState::TimedOut | SessionState::Disconnected => {}
        }
    }

    fn tick_connecting(&mut self, now: Duration) {
        if now.saturating_sub(self.started_at) >= self.config.connect_timeout {
            self.close(SessionState::Disconnected, CloseReason::ConnectTimeout);
            return;
        }
        if now.saturating_sub(self.last_send) >= self.config.resend_interval {
            self.queue_connect(now);
        }
    }

    fn tick_connected(&mut self, now: Duration) {
        if now.saturating_sub(self.last_recv) >= self.config.timeout {
            self.close(SessionState::TimedOut, CloseReason::TimedOut);
            return;
        }

        match self
            .reliable
            .due_resends(now, self.config.resend_interval, self.config.max_resends)
        {
            Ok(frames) => {
                if !frames.is_empty() {
                    tracing::trace!(count = frames.len(), remote = %self.remote, "retransmitting");
                    for frame in frames {
                        self.queue(frame, now);
                    }
                }
            }
            Err(exhausted) => {
                tracing::warn!(
                    seq = exhausted.seq,
                    remote = %self.remote,
                    "reliable frame never acknowledged, giving up"
                );
                self.close(SessionState::TimedOut, CloseReason::RetransmitExhausted);
                return;
            }
        }

        if now.saturating_sub(self.last_send) >= self.config.heartbeat_interval {
            self.queue(Frame::Heartbeat.encode(), now);
        }
    }

    /// Graceful close. Every unacked reliable frame is sent one last time,
    /// then `Disconnect`. Calling this on a terminal session does nothing.
    pub fn disconnect(&mut self, now: Duration) {
        if self.is_terminal() {
            return;
        }
        let flush: Vec<Bytes> = self.reliable.unacked().cloned().collect();
        for frame in flush {
            self.queue(frame, now);
        }
        self.queue(Frame::Disconnect.encode(), now);
        self.close(SessionState::Disconnected, CloseReason::Local);
    }

    /// Ends a server-side session whose peer started over with a new
    /// handshake. Nothing more is sent to the old connection: queued and
    /// unacked frames are discarded, and no `Disconnect` goes out, since
    /// the address now belongs to the new connection.
    pub fn supersede(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.outbox.clear();
        self.reliable = ReliableChannel::new();
        self.close(SessionState::Disconnected, CloseReason::Superseded);
    }

    fn close(&mut self, state: SessionState, reason: CloseReason) {
        if self.is_terminal() {
            return;
        }
        tracing::debug!(
            session_id = ?self.id,
            remote = %self.remote,
            reason = %reason,
            "session closed"
        );
        self.state = state;
        self.close_reason = Some(reason);
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::{ClientToServerId, Message, Pose};

    const MS: Duration = Duration::from_millis(1);

    fn addr() -> SocketAddr {
        "127.0.0.1:7777".parse().unwrap()
    }

    const NONCE: u32 = 0x5eed;

    fn server_session() -> Session {
        let mut s = Session::accepted(SessionId(1), addr(), NONCE, SessionConfig::default(), Duration::ZERO);
        s.drain_outbox();
        s
    }

    fn reliable_msg() -> EncodedMessage {
        Message::client(ClientToServerId::AvatarSpawned).finalize().unwrap()
    }

    fn unreliable_msg() -> EncodedMessage {
        Message::client(ClientToServerId::UpdateAvatarTransform)
            .add(Pose::default())
            .finalize()
            .unwrap()
    }

    fn frames(session: &mut Session) -> Vec<Frame> {
        session
            .drain_outbox()
            .into_iter()
            .map(|b| Frame::decode(b).unwrap())
            .collect()
    }

    // =====================================================================
    // Handshake
    // =====================================================================

    #[test]
    fn test_accepted_queues_accept_frame() {
        let mut s = Session::accepted(SessionId(4), addr(), NONCE, SessionConfig::default(), Duration::ZERO);
        assert!(s.is_connected());
        assert_eq!(
            frames(&mut s),
            vec![Frame::Accept {
                session_id: SessionId(4),
                nonce: NONCE
            }]
        );
    }

    #[test]
    fn test_connecting_queues_connect_with_protocol_version() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        assert_eq!(s.state(), SessionState::Connecting);
        assert_eq!(s.id(), None);
        assert_eq!(
            frames(&mut s),
            vec![Frame::Connect {
                version: PROTOCOL_VERSION,
                nonce: s.nonce(),
            }]
        );
    }

    #[test]
    fn test_connecting_twice_picks_new_nonces() {
        let nonces: std::collections::HashSet<u32> = (0..8)
            .map(|_| Session::connecting(addr(), SessionConfig::default(), Duration::ZERO).nonce())
            .collect();
        assert!(nonces.len() > 1);
    }

    #[test]
    fn test_handle_frame_accept_completes_handshake() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        let nonce = s.nonce();
        s.handle_frame(
            Frame::Accept {
                session_id: SessionId(9),
                nonce,
            },
            10 * MS,
        );
        assert!(s.is_connected());
        assert_eq!(s.id(), Some(SessionId(9)));
    }

    #[test]
    fn test_handle_frame_accept_with_other_nonce_is_ignored() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        let stale = s.nonce().wrapping_add(1);
        s.handle_frame(
            Frame::Accept {
                session_id: SessionId(9),
                nonce: stale,
            },
            10 * MS,
        );
        assert_eq!(s.state(), SessionState::Connecting);
        assert_eq!(s.id(), None);
    }

    #[test]
    fn test_tick_connecting_resends_connect_each_interval() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        s.drain_outbox();
        s.tick(50 * MS);
        assert!(frames(&mut s).is_empty());
        s.tick(100 * MS);
        assert!(matches!(frames(&mut s)[..], [Frame::Connect { .. }]));
    }

    #[test]
    fn test_tick_connecting_past_timeout_fails() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        s.tick(Duration::from_secs(5));
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.close_reason(), Some(CloseReason::ConnectTimeout));
        assert!(matches!(
            s.close_reason().and_then(CloseReason::as_error),
            Some(SessionError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_handle_frame_reject_fails_connect() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        s.handle_frame(
            Frame::Reject {
                reason: RejectReason::ServerFull,
            },
            MS,
        );
        assert_eq!(
            s.close_reason(),
            Some(CloseReason::Rejected(RejectReason::ServerFull))
        );
    }

    #[test]
    fn test_duplicate_connect_re_sends_accept() {
        let mut s = server_session();
        s.handle_frame(
            Frame::Connect {
                version: PROTOCOL_VERSION,
                nonce: NONCE,
            },
            MS,
        );
        assert_eq!(
            frames(&mut s),
            vec![Frame::Accept {
                session_id: SessionId(1),
                nonce: NONCE
            }]
        );
    }

    #[test]
    fn test_connect_with_new_nonce_gets_no_accept() {
        let mut s = server_session();
        s.handle_frame(
            Frame::Connect {
                version: PROTOCOL_VERSION,
                nonce: NONCE + 1,
            },
            MS,
        );
        assert!(frames(&mut s).is_empty());
        assert!(s.is_connected());
    }

    #[test]
    fn test_supersede_drops_pending_frames_and_closes_quietly() {
        let mut s = server_session();
        s.send(&reliable_msg(), Duration::ZERO).unwrap();
        s.supersede();

        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.close_reason(), Some(CloseReason::Superseded));
        assert_eq!(s.close_reason().and_then(CloseReason::as_error), None);
        assert_eq!(s.in_flight(), 0);
        assert!(s.drain_outbox().is_empty());
    }

    // =====================================================================
    // send()
    // =====================================================================

    #[test]
    fn test_send_unreliable_written_once() {
        let mut s = server_session();
        s.send(&unreliable_msg(), Duration::ZERO).unwrap();
        assert!(matches!(frames(&mut s)[..], [Frame::Unreliable { .. }]));
        assert_eq!(s.in_flight(), 0);

        s.tick(Duration::from_millis(500));
        assert!(
            !frames(&mut s)
                .iter()
                .any(|f| matches!(f, Frame::Unreliable { .. })),
            "unreliable frames are never retransmitted"
        );
    }

    #[test]
    fn test_send_reliable_retransmits_until_acked() {
        let mut s = server_session();
        s.send(&reliable_msg(), Duration::ZERO).unwrap();
        assert!(matches!(frames(&mut s)[..], [Frame::Reliable { seq: 0, .. }]));

        s.tick(100 * MS);
        assert!(matches!(frames(&mut s)[..], [Frame::Reliable { seq: 0, .. }]));

        s.handle_frame(Frame::Ack { seq: 0 }, 150 * MS);
        s.tick(300 * MS);
        assert!(frames(&mut s).is_empty());
        assert_eq!(s.in_flight(), 0);
    }

    #[test]
    fn test_send_on_connecting_session_fails() {
        let mut s = Session::connecting(addr(), SessionConfig::default(), Duration::ZERO);
        assert_eq!(
            s.send(&reliable_msg(), Duration::ZERO),
            Err(SessionError::SendAfterDisconnect)
        );
    }

    #[test]
    fn test_send_after_disconnect_is_noop() {
        let mut s = server_session();
        s.disconnect(Duration::ZERO);
        s.drain_outbox();
        assert_eq!(
            s.send(&unreliable_msg(), MS),
            Err(SessionError::SendAfterDisconnect)
        );
        assert!(s.drain_outbox().is_empty());
    }

    // =====================================================================
    // Receiving
    // =====================================================================

    #[test]
    fn test_handle_frame_reliable_acks_and_delivers() {
        let mut s = server_session();
        let env = reliable_msg().into_bytes();
        let ready = s.handle_frame(
            Frame::Reliable {
                seq: 0,
                envelope: env.clone(),
            },
            MS,
        );
        assert_eq!(ready, vec![env]);
        assert_eq!(frames(&mut s), vec![Frame::Ack { seq: 0 }]);
    }

    #[test]
    fn test_handle_frame_duplicate_reliable_is_re_acked_not_delivered() {
        let mut s = server_session();
        let env = reliable_msg().into_bytes();
        s.handle_frame(Frame::Reliable { seq: 0, envelope: env.clone() }, MS);
        s.drain_outbox();

        let ready = s.handle_frame(Frame::Reliable { seq: 0, envelope: env }, 2 * MS);
        assert!(ready.is_empty());
        assert_eq!(frames(&mut s), vec![Frame::Ack { seq: 0 }]);
    }

    #[test]
    fn test_handle_frame_ignored_once_terminal() {
        let mut s = server_session();
        s.handle_frame(Frame::Disconnect, MS);
        assert_eq!(s.close_reason(), Some(CloseReason::Remote));
        let ready = s.handle_frame(
            Frame::Unreliable {
                envelope: unreliable_msg().into_bytes(),
            },
            2 * MS,
        );
        assert!(ready.is_empty());
    }

    // =====================================================================
    // Liveness
    // =====================================================================

    #[test]
    fn test_tick_idle_sends_heartbeat() {
        let mut s = server_session();
        s.tick(Duration::from_secs(1));
        assert_eq!(frames(&mut s), vec![Frame::Heartbeat]);
    }

    #[test]
    fn test_tick_silence_times_out_exactly_once() {
        let mut s = server_session();
        s.tick(Duration::from_millis(9_999));
        assert!(s.is_connected());

        s.tick(Duration::from_secs(10));
        assert_eq!(s.state(), SessionState::TimedOut);
        assert_eq!(s.close_reason(), Some(CloseReason::TimedOut));

        // Terminal: later ticks and closes change nothing.
        s.tick(Duration::from_secs(20));
        s.disconnect(Duration::from_secs(21));
        assert_eq!(s.state(), SessionState::TimedOut);
    }

    #[test]
    fn test_received_frame_refreshes_liveness() {
        let mut s = server_session();
        s.handle_frame(Frame::Heartbeat, Duration::from_secs(8));
        s.tick(Duration::from_secs(12));
        assert!(s.is_connected());
        assert_eq!(s.last_activity(), Duration::from_secs(8));
    }

    #[test]
    fn test_tick_retransmit_budget_exhausted_times_out() {
        let config = SessionConfig {
            max_resends: 2,
            ..SessionConfig::default()
        };
        let mut s = Session::accepted(SessionId(1), addr(), NONCE, config, Duration::ZERO);
        s.send(&reliable_msg(), Duration::ZERO).unwrap();
        for i in 1..=3u32 {
            // Keep the peer "alive" so only the retransmit budget matters.
            s.handle_frame(Frame::Heartbeat, i * 100 * MS);
            s.tick(i * 100 * MS);
        }
        assert_eq!(s.state(), SessionState::TimedOut);
        assert_eq!(s.close_reason(), Some(CloseReason::RetransmitExhausted));
        assert_eq!(
            s.close_reason().and_then(CloseReason::as_error),
            Some(SessionError::ConnectionTimedOut)
        );
    }

    // =====================================================================
    // disconnect()
    // =====================================================================

    #[test]
    fn test_disconnect_flushes_unacked_then_disconnect() {
        let mut s = server_session();
        s.send(&reliable_msg(), Duration::ZERO).unwrap();
        s.drain_outbox();

        s.disconnect(MS);
        let out = frames(&mut s);
        assert!(matches!(out[..], [Frame::Reliable { seq: 0, .. }, Frame::Disconnect]));
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.close_reason(), Some(CloseReason::Local));
    }
}
