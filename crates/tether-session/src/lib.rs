//! Connection sessions for Tether.
//!
//! This crate turns an unreliable datagram transport into per-peer
//! connections:
//!
//! 1. **Framing**: every datagram is a [`Frame`] (handshake, data, ack,
//!    heartbeat, disconnect)
//! 2. **Reliability**: sequence numbers, acks, in-order delivery, and
//!    bounded retransmission for `Reliable` envelopes
//! 3. **Lifecycle**: the [`Session`] state machine (connect, liveness,
//!    timeout, graceful close) and the server's [`SessionManager`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay Server / Client Endpoint (above)  ← send envelopes, tick(now)
//!     ↕
//! Session Layer (this crate)  ← frames, acks, timers, session table
//!     ↕
//! Protocol Layer (below)  ← EncodedMessage, DeliveryMode, SessionId
//! ```
//!
//! Nothing here performs I/O. Sessions queue outgoing frames; their owner
//! writes them to a transport.

mod error;
mod frame;
mod manager;
pub mod reliability;
mod session;

pub use error::SessionError;
pub use frame::{Frame, RejectReason};
pub use manager::SessionManager;
pub use session::{CloseReason, Session, SessionConfig, SessionState};
