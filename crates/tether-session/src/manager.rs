//! The session manager: the server's table of live connections.
//!
//! Owns every server-side [`Session`], keyed by id with a secondary index
//! by remote address (datagrams only carry an address). Ids are handed out
//! lowest-free from 1, so an id only comes back after its previous holder
//! has been removed.
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself. It is owned by the relay
//! and touched only from the tick thread; the socket's receive task hands
//! datagrams over through a channel instead of reaching in here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tether_protocol::SessionId;

use crate::{Session, SessionConfig, SessionError};

pub struct SessionManager {
    /// All sessions, any state, keyed by id.
    sessions: HashMap<SessionId, Session>,

    /// Remote address → session id. Kept in sync with `sessions`.
    by_addr: HashMap<SocketAddr, SessionId>,

    max_sessions: usize,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            by_addr: HashMap::new(),
            max_sessions,
            config,
        }
    }

    /// Creates a `Connected` session for a newly accepted peer, opened
    /// under the nonce from its `Connect`.
    ///
    /// A peer that already has a session gets its existing id back; the
    /// caller can tell the two apart with [`id_for`](Self::id_for) first.
    ///
    /// # Errors
    /// [`SessionError::ServerFull`] when `max_sessions` are already held.
    pub fn accept(
        &mut self,
        remote: SocketAddr,
        nonce: u32,
        now: Duration,
    ) -> Result<SessionId, SessionError> {
        if let Some(&id) = self.by_addr.get(&remote) {
            return Ok(id);
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::ServerFull {
                max: self.max_sessions,
            });
        }
        let id = self.lowest_free_id().ok_or(SessionError::ServerFull {
            max: self.max_sessions,
        })?;

        let session = Session::accepted(id, remote, nonce, self.config.clone(), now);
        self.sessions.insert(id, session);
        self.by_addr.insert(remote, id);

        tracing::info!(session_id = %id, %remote, "session accepted");
        Ok(id)
    }

    fn lowest_free_id(&self) -> Option<SessionId> {
        (1..=u16::MAX)
            .map(SessionId)
            .find(|id| !self.sessions.contains_key(id))
    }

    /// Looks up the session a datagram from `remote` belongs to.
    pub fn id_for(&self, remote: &SocketAddr) -> Option<SessionId> {
        self.by_addr.get(remote).copied()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Every session id, ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of sessions in the `Connected` state, ascending.
    pub fn connected_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.is_connected())
            .filter_map(Session::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Drives every session's timers.
    pub fn tick_all(&mut self, now: Duration) {
        for session in self.sessions.values_mut() {
            session.tick(now);
        }
    }

    /// Removes every session that reached a terminal state and returns
    /// them, ascending by id, so the caller can flush their last frames
    /// and notify whoever cares.
    ///
    /// Separate from `tick_all` so the caller decides when ids become
    /// reusable.
    pub fn remove_terminated(&mut self) -> Vec<Session> {
        let mut dead: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        dead.sort_unstable();
        dead.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Removes one session regardless of its state.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_addr.remove(&session.remote());
        tracing::info!(session_id = %id, remote = %session.remote(), "session removed");
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

// =========================================================================
// Tests
// =========================================================================
