//! The client endpoint: one session to the relay plus a handler table.
//!
//! `ClientEndpoint<T, C>` is generic over its transport and over a
//! host-owned context `C` that handlers mutate (a registry, a test
//! recorder, `()`...). Like the relay it does all of its work inside
//! [`tick`](ClientEndpoint::tick):
//!
//! ```text
//! tick(dt, ctx)
//!   1. drain the transport; each frame goes to the session
//!        delivered envelope → Dispatcher → handler(ctx, reader)
//!        state change      → lifecycle hook(ctx, event), queued event
//!   2. session timers: connect retries, retransmission, heartbeats, timeout
//!   3. write the session's outbox to the transport
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tether_protocol::{
    ClientMessage, EncodedMessage, Message, MessageReader, ProtocolError, ServerToClientId,
    SessionId,
};
use tether_session::{CloseReason, Frame, Session, SessionConfig, SessionError, SessionState};
use tether_transport::{Transport, TransportError};

use crate::{Dispatched, Dispatcher, TetherError};

/// Connection lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The relay accepted us and assigned this id.
    Connected { id: SessionId },
    /// The handshake never completed (rejected or timed out).
    ConnectionFailed { reason: CloseReason },
    /// An established connection ended.
    Disconnected { reason: CloseReason },
}

type LifecycleHook<C> = Box<dyn FnMut(&mut C, &ClientEvent) + Send>;

pub struct ClientEndpoint<T: Transport, C> {
    transport: T,
    config: SessionConfig,
    session: Option<Session>,
    /// Last state reported through an event.
    reported: SessionState,
    dispatcher: Dispatcher<C>,
    lifecycle: Option<LifecycleHook<C>>,
    events: Vec<ClientEvent>,
    now: Duration,
}

impl<T: Transport, C> ClientEndpoint<T, C> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
            reported: SessionState::Disconnected,
            dispatcher: Dispatcher::new(),
            lifecycle: None,
            events: Vec::new(),
            now: Duration::ZERO,
        }
    }

    /// Registers the handler for one server→client message type. A
    /// second registration for the same id replaces the first.
    pub fn register_handler<F>(&mut self, id: ServerToClientId, handler: F) -> bool
    where
        F: FnMut(&mut C, &mut MessageReader) -> Result<(), ProtocolError> + Send + 'static,
    {
        self.dispatcher.register(id, handler)
    }

    /// Installs a hook that runs on every [`ClientEvent`] at the moment
    /// it happens, before any message that arrived after it is
    /// dispatched.
    pub fn on_lifecycle<F>(&mut self, hook: F)
    where
        F: FnMut(&mut C, &ClientEvent) + Send + 'static,
    {
        self.lifecycle = Some(Box::new(hook));
    }

    // -- Accessors --------------------------------------------------------

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(Session::remote)
    }

    /// Our id, once the relay has accepted us.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session
            .as_ref()
            .filter(|s| s.is_connected())
            .and_then(Session::id)
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Disconnected, Session::state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Connection -------------------------------------------------------

    /// Starts connecting to the relay at `addr`. Completion or failure is
    /// reported later as a [`ClientEvent`]; nothing here waits.
    ///
    /// An existing connection is closed first, exactly as
    /// [`disconnect`](Self::disconnect) would: its terminal event fires
    /// (and the lifecycle hook runs) before the new attempt starts.
    pub fn connect(&mut self, addr: SocketAddr, ctx: &mut C) -> Result<(), TetherError> {
        if self.transport.is_closed() {
            return Err(TransportError::Closed.into());
        }
        if self.session.is_some() {
            self.disconnect(ctx);
        }

        tracing::info!(server = %addr, "connecting");
        self.session = Some(Session::connecting(addr, self.config.clone(), self.now));
        self.reported = SessionState::Connecting;
        self.flush();
        Ok(())
    }

    /// Graceful close: unacked reliable frames are flushed once, then
    /// `Disconnect` is sent. The `Disconnected` event fires immediately.
    pub fn disconnect(&mut self, ctx: &mut C) {
        if let Some(session) = self.session.as_mut() {
            session.disconnect(self.now);
        }
        self.observe(ctx);
        self.flush();
    }

    // -- Sending ----------------------------------------------------------

    /// Queues an envelope for the relay. Frames are written at the end of
    /// the next tick, or by an explicit [`flush`](Self::flush).
    ///
    /// # Errors
    /// [`SessionError::SendAfterDisconnect`] when not connected; the
    /// message is dropped.
    pub fn send(&mut self, message: &EncodedMessage) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.send(message, self.now),
            None => Err(SessionError::SendAfterDisconnect),
        }
    }

    /// Encodes and queues a typed message.
    pub fn send_message(&mut self, message: &ClientMessage) -> Result<(), TetherError> {
        let encoded = message.to_message().finalize()?;
        self.send(&encoded)?;
        Ok(())
    }

    /// Writes every queued frame to the transport.
    pub fn flush(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let remote = session.remote();
        for frame in session.drain_outbox() {
            if let Err(e) = self.transport.send_to(remote, &frame) {
                tracing::debug!(server = %remote, error = %e, "send failed");
            }
        }
    }

    // -- Tick -------------------------------------------------------------

    /// Advances the logical clock by `dt`, dispatches everything that
    /// arrived, drives the session's timers, and writes pending frames.
    pub fn tick(&mut self, dt: Duration, ctx: &mut C) {
        self.now += dt;
        self.receive(ctx);
        if let Some(session) = self.session.as_mut() {
            session.tick(self.now);
        }
        self.observe(ctx);
        self.flush();
    }

    fn receive(&mut self, ctx: &mut C) {
        while let Some(datagram) = self.transport.try_recv() {
            let Some(session) = self.session.as_mut() else {
                continue;
            };
            if datagram.from != session.remote() {
                tracing::trace!(addr = %datagram.from, "datagram from a stranger, ignoring");
                continue;
            }
            let frame = match Frame::decode(datagram.data) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "undecodable frame from relay");
                    continue;
                }
            };
            let delivered = session.handle_frame(frame, self.now);
            self.observe(ctx);
            for envelope in delivered {
                self.dispatch(ctx, envelope);
            }
        }
    }

    /// Routes one envelope. Unknown ids are ignored, so a client keeps
    /// working against a relay that speaks a newer protocol.
    fn dispatch(&mut self, ctx: &mut C, envelope: Bytes) {
        let (id, mut reader) = match Message::parse(envelope) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "discarding malformed envelope");
                return;
            }
        };
        match self.dispatcher.dispatch(ctx, id, &mut reader) {
            Ok(Dispatched::Handled) => {}
            Ok(Dispatched::Unhandled) => {
                tracing::trace!(id, "no handler registered, ignoring");
            }
            Err(e) => {
                tracing::debug!(id, error = %e, "handler rejected message");
            }
        }
    }

    /// Turns a session state change into at most one event.
    fn observe(&mut self, ctx: &mut C) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let state = session.state();
        if state == self.reported {
            return;
        }

        let event = match state {
            SessionState::Connecting => None,
            SessionState::Connected => session.id().map(|id| {
                tracing::info!(session_id = %id, server = %session.remote(), "connected");
                ClientEvent::Connected { id }
            }),
            SessionState::TimedOut | SessionState::Disconnected => {
                let reason = session.close_reason().unwrap_or(CloseReason::Local);
                if self.reported == SessionState::Connecting {
                    tracing::info!(%reason, "connection failed");
                    Some(ClientEvent::ConnectionFailed { reason })
                } else {
                    tracing::info!(%reason, "disconnected");
                    Some(ClientEvent::Disconnected { reason })
                }
            }
        };
        self.reported = state;

        if let Some(event) = event {
            if let Some(hook) = self.lifecycle.as_mut() {
                hook(ctx, &event);
            }
            self.events.push(event);
        }
    }
}
