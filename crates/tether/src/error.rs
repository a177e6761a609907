//! Unified error type for Tether.

use tether_protocol::ProtocolError;
use tether_registry::RegistryError;
use tether_session::SessionError;
use tether_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tether` crate you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant generates the `From` impls, so `?` converts layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (bind, send, closed socket).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown id).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (server full, send after disconnect, timeout).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A registry update was refused (unknown object, malformed bones).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}
