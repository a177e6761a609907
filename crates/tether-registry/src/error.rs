//! Error types for the object registry.

use tether_protocol::ObjectId;

/// Errors from registry updates. Each one leaves the registry unchanged
/// except where noted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No rigidbody with this id was registered at world setup.
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    /// A bone string could not be parsed into euler angles. The raw
    /// string is still stored on the avatar.
    #[error("malformed bone string: {0}")]
    MalformedBones(String),
}
