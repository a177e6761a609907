//! Shared harness: a relay and clients on one in-memory network, driven
//! by a deterministic logical clock.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tether::prelude::*;
use tether::protocol::{MessageReader, ServerToClientId};
use tether::transport::MemoryTransport;
use tether::RelayServerBuilder;

pub const STEP: Duration = Duration::from_millis(10);

/// A raw client endpoint that records every decoded server message.
pub struct Peer {
    pub endpoint: ClientEndpoint<MemoryTransport, Vec<ServerMessage>>,
    pub log: Vec<ServerMessage>,
}

impl Peer {
    pub fn new(net: &MemoryNetwork, config: SessionConfig) -> Self {
        let mut endpoint = ClientEndpoint::new(net.bind(), config);
        for id in ServerToClientId::ALL {
            endpoint.register_handler(
                id,
                move |log: &mut Vec<ServerMessage>, reader: &mut MessageReader| {
                    log.push(ServerMessage::decode(id, reader)?);
                    Ok(())
                },
            );
        }
        Self {
            endpoint,
            log: Vec::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn id(&self) -> SessionId {
        self.endpoint.session_id().expect("peer is not connected")
    }

    pub fn tick(&mut self, dt: Duration) {
        self.endpoint.tick(dt, &mut self.log);
    }

    pub fn send(&mut self, msg: &ClientMessage) {
        self.endpoint.send_message(msg).expect("send failed");
    }

    pub fn connect(&mut self, relay: SocketAddr) {
        self.endpoint
            .connect(relay, &mut self.log)
            .expect("connect failed");
    }

    pub fn disconnect(&mut self) {
        self.endpoint.disconnect(&mut self.log);
    }

    /// Takes everything recorded so far.
    pub fn take_log(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.log)
    }
}

/// A relay plus raw peers.
pub struct RelayWorld {
    pub net: MemoryNetwork,
    pub relay: RelayServer<MemoryTransport>,
    pub peers: Vec<Peer>,
}

impl RelayWorld {
    pub fn new(builder: RelayServerBuilder) -> Self {
        let net = MemoryNetwork::new();
        let relay = builder.build(net.bind()).expect("valid relay config");
        Self {
            net,
            relay,
            peers: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayServerBuilder::new())
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    /// A peer using the relay's own session timing.
    pub fn peer(&self) -> Peer {
        Peer::new(&self.net, self.relay.config().session_config())
    }

    /// Adds a peer and runs the world until its handshake completes.
    pub fn join(&mut self) -> usize {
        let mut peer = self.peer();
        peer.connect(self.relay_addr());
        self.peers.push(peer);
        let index = self.peers.len() - 1;
        self.run_until(|w| w.peers[index].endpoint.is_connected(), 100);
        self.settle();
        index
    }

    /// One step: peers send, relay relays, peers receive.
    pub fn step(&mut self) {
        for peer in &mut self.peers {
            peer.tick(STEP);
        }
        self.relay.tick(STEP);
        for peer in &mut self.peers {
            peer.tick(Duration::ZERO);
        }
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Steps until `done` holds. Panics after `max_steps`.
    pub fn run_until(&mut self, done: impl Fn(&Self) -> bool, max_steps: usize) {
        for _ in 0..max_steps {
            if done(self) {
                return;
            }
            self.step();
        }
        assert!(done(self), "condition not reached in {max_steps} steps");
    }

    /// Lets in-flight reliable traffic and acks drain.
    pub fn settle(&mut self) {
        self.run(5);
    }
}

/// A relay plus registry-backed clients.
pub struct SyncWorld {
    pub net: MemoryNetwork,
    pub relay: RelayServer<MemoryTransport>,
    pub clients: Vec<SyncClient<MemoryTransport>>,
}

impl SyncWorld {
    pub const OBJECTS: usize = 4;

    pub fn new() -> Self {
        Self::with_relay(RelayServerBuilder::new())
    }

    pub fn with_relay(builder: RelayServerBuilder) -> Self {
        let net = MemoryNetwork::new();
        let relay = builder
            .build(net.bind())
            .expect("valid relay config");
        Self {
            net,
            relay,
            clients: Vec::new(),
        }
    }

    /// Adds a client that announces `avatar` and runs until it is
    /// connected and announced.
    pub fn join(&mut self, avatar: Option<&str>) -> usize {
        let mut client = SyncClient::new(
            self.net.bind(),
            self.relay.config().session_config(),
            Self::OBJECTS,
        );
        client.set_avatar(avatar.map(str::to_owned));
        client
            .connect(self.relay.local_addr())
            .expect("connect failed");
        self.clients.push(client);
        let index = self.clients.len() - 1;
        for _ in 0..100 {
            if self.clients[index].is_connected() {
                break;
            }
            self.step();
        }
        assert!(self.clients[index].is_connected(), "client never connected");
        self.run(5);
        index
    }

    pub fn step(&mut self) {
        for client in &mut self.clients {
            client.tick(STEP);
        }
        self.relay.tick(STEP);
        for client in &mut self.clients {
            client.tick(Duration::ZERO);
        }
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn addr(&self, index: usize) -> SocketAddr {
        self.clients[index].endpoint().local_addr()
    }

    pub fn id(&self, index: usize) -> SessionId {
        self.clients[index]
            .session_id()
            .expect("client is not connected")
    }
}

/// Decoded server messages of one kind, for assertions.
pub fn spawns(log: &[ServerMessage]) -> Vec<(SessionId, String)> {
    log.iter()
        .filter_map(|m| match m {
            ServerMessage::SpawnRemoteAvatar {
                sender,
                avatar_name,
            } => Some((*sender, avatar_name.clone())),
            _ => None,
        })
        .collect()
}

pub fn departures(log: &[ServerMessage]) -> Vec<SessionId> {
    log.iter()
        .filter_map(|m| match m {
            ServerMessage::ParticipantLeft { sender } => Some(*sender),
            _ => None,
        })
        .collect()
}

pub fn pose(x: f32, y: f32, z: f32) -> Pose {
    Pose::new(Vec3::new(x, y, z), Quat::IDENTITY)
}
