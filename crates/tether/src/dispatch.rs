//! Message-type id → handler lookup table.
//!
//! Both the relay and the client route inbound envelopes through a
//! [`Dispatcher`]: the envelope's id selects at most one handler, which
//! reads the payload fields and updates a caller-owned context `C`.

use std::collections::HashMap;
use std::fmt;

use tether_protocol::{MessageReader, ProtocolError};

/// A handler for one message type.
///
/// Receives the context and a reader positioned just after the id. An
/// error discards the message; the caller logs it and moves on.
pub type Handler<C> =
    Box<dyn FnMut(&mut C, &mut MessageReader) -> Result<(), ProtocolError> + Send>;

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler ran and succeeded.
    Handled,
    /// No handler is registered for this id.
    Unhandled,
}

pub struct Dispatcher<C> {
    handlers: HashMap<u16, Handler<C>>,
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `id`, replacing any previous one.
    /// Returns `true` if a handler was replaced.
    pub fn register<F>(&mut self, id: impl Into<u16>, handler: F) -> bool
    where
        F: FnMut(&mut C, &mut MessageReader) -> Result<(), ProtocolError> + Send + 'static,
    {
        self.handlers.insert(id.into(), Box::new(handler)).is_some()
    }

    pub fn unregister(&mut self, id: impl Into<u16>) -> bool {
        self.handlers.remove(&id.into()).is_some()
    }

    pub fn contains(&self, id: impl Into<u16>) -> bool {
        self.handlers.contains_key(&id.into())
    }

    /// Runs the handler for `id`, if any.
    pub fn dispatch(
        &mut self,
        ctx: &mut C,
        id: u16,
        reader: &mut MessageReader,
    ) -> Result<Dispatched, ProtocolError> {
        match self.handlers.get_mut(&id) {
            Some(handler) => {
                handler(ctx, reader)?;
                Ok(Dispatched::Handled)
            }
            None => Ok(Dispatched::Unhandled),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Dispatcher").field("ids", &ids).finish()
    }
}
