//! Server and client configuration.
//!
//! Both configs deserialize from JSON with every field optional; missing
//! fields take the defaults below. Binaries layer command-line flags on
//! top.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_session::SessionConfig;

use crate::TetherError;

/// Default listen/connect port.
pub const DEFAULT_PORT: u16 = 7777;

/// Avatar announced for participants that have not picked one.
pub const DEFAULT_AVATAR: &str = "Cyborg";

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP listen port.
    pub port: u16,

    /// Maximum concurrent sessions. Further `Connect`s are rejected with
    /// `ServerFull`.
    pub max_connections: usize,

    /// Silence (in milliseconds) after which a session times out.
    pub timeout_ms: u64,

    /// Avatar name announced for a participant until it sends its own.
    pub default_avatar: String,

    /// Broadcast `ParticipantLeft` when a session is removed.
    pub announce_departures: bool,

    /// Host loop rate used by the `tether-relay` binary.
    pub tick_rate_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: 10,
            timeout_ms: 10_000,
            default_avatar: DEFAULT_AVATAR.to_string(),
            announce_departures: true,
            tick_rate_hz: 100,
        }
    }
}

impl ServerConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, TetherError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TetherError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the relay cannot run with.
    pub fn validate(&self) -> Result<(), TetherError> {
        if self.max_connections == 0 {
            return Err(TetherError::Config("max_connections must be at least 1".into()));
        }
        if self.max_connections > usize::from(u16::MAX) {
            return Err(TetherError::Config(format!(
                "max_connections must be at most {}",
                u16::MAX
            )));
        }
        if self.timeout_ms == 0 {
            return Err(TetherError::Config("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Address to bind: all interfaces on `port`.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Session timing derived from `timeout_ms`.
    pub fn session_config(&self) -> SessionConfig {
        session_config_for(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration for a client ([`ClientEndpoint`](crate::ClientEndpoint) or
/// [`SyncClient`](crate::SyncClient)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay host name or IP address.
    pub server_addr: String,

    /// Relay port.
    pub port: u16,

    /// Silence (in milliseconds) after which the connection times out.
    pub timeout_ms: u64,

    /// Host loop rate used by the `tether-bot` binary.
    pub tick_rate_hz: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: 10_000,
            tick_rate_hz: 100,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TetherError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TetherError::Config(e.to_string()))?;
        if config.timeout_ms == 0 {
            return Err(TetherError::Config("timeout_ms must be positive".into()));
        }
        Ok(config)
    }

    /// Resolves `server_addr:port`. Host names go through the system
    /// resolver, so this may block briefly.
    pub fn resolve(&self) -> Result<SocketAddr, TetherError> {
        (self.server_addr.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TetherError::Config(format!("cannot resolve {}: {e}", self.server_addr)))?
            .next()
            .ok_or_else(|| TetherError::Config(format!("{} has no address", self.server_addr)))
    }

    pub fn session_config(&self) -> SessionConfig {
        session_config_for(self.timeout_ms)
    }
}

/// Session timing for a given timeout. Heartbeats go out at least four
/// times per timeout window so a healthy idle link never expires.
fn session_config_for(timeout_ms: u64) -> SessionConfig {
    let defaults = SessionConfig::default();
    let timeout = Duration::from_millis(timeout_ms.max(1));
    SessionConfig {
        timeout,
        heartbeat_interval: defaults.heartbeat_interval.min(timeout / 4),
        ..defaults
    }
}
