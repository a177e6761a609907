//! # Tether
//!
//! Avatar and physics-object synchronization through a central relay.
//!
//! Participants connect to a [`RelayServer`] over UDP. Each one streams
//! its avatar pose, bone rotations, and the rigidbodies it is holding; the
//! relay forwards every message to everyone except the sender. On the
//! receiving side a [`SyncClient`] applies the updates to an
//! [`ObjectRegistry`](tether_registry::ObjectRegistry) and queues events
//! for rendering and physics.
//!
//! Nothing runs in the background except the socket's receive task: the
//! host calls `tick(dt)` on a steady cadence (a
//! [`TickScheduler`](tether_tick::TickScheduler) or its own frame loop).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let mut relay = RelayServer::start(7777, 10).await?;
//!
//! let transport = UdpTransport::bind("0.0.0.0:0").await?;
//! let mut client = SyncClient::new(transport, SessionConfig::default(), 4);
//! client.connect("127.0.0.1:7777".parse().unwrap())?;
//!
//! loop {
//!     relay.tick(Duration::from_millis(10));
//!     client.tick(Duration::from_millis(10));
//!     for event in client.drain_events() {
//!         println!("{event:?}");
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod dispatch;
mod error;
mod server;
mod sync;

pub use client::{ClientEndpoint, ClientEvent};
pub use config::{ClientConfig, DEFAULT_AVATAR, DEFAULT_PORT, ServerConfig};
pub use dispatch::{Dispatched, Dispatcher, Handler};
pub use error::TetherError;
pub use server::{RelayServer, RelayServerBuilder, ServerEvent};
pub use sync::SyncClient;

pub use tether_protocol as protocol;
pub use tether_registry as registry;
pub use tether_session as session;
pub use tether_tick as tick;
pub use tether_transport as transport;

/// Everything a relay host or a client needs in one import.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientEndpoint, ClientEvent, RelayServer, ServerConfig, ServerEvent,
        SyncClient, TetherError,
    };
    pub use tether_protocol::{
        ClientMessage, DeliveryMode, ObjectId, Pose, Quat, Recipient, ServerMessage, SessionId,
        Vec3,
    };
    pub use tether_registry::{BonePose, ObjectRegistry, Owner, RegistryEvent};
    pub use tether_session::{CloseReason, SessionConfig};
    pub use tether_tick::{TickScheduler, Tickable};
    pub use tether_transport::{MemoryNetwork, Transport, UdpTransport};
}
