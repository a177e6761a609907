//! Client-side synchronized state for Tether.
//!
//! Maps a participant's session id to its avatar state and an object id to
//! its rigidbody state, and queues [`RegistryEvent`]s for the rendering and
//! physics collaborators that consume them. No network I/O happens here.

mod avatar;
mod bones;
mod error;
mod registry;
mod rigidbody;

pub use avatar::{AvatarState, AvatarTable};
pub use bones::BonePose;
pub use error::RegistryError;
pub use registry::{ObjectRegistry, RegistryEvent, RegistrySnapshot};
pub use rigidbody::{Owner, RigidbodyState, RigidbodyTable};
