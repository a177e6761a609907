//! `SyncClient`: a client endpoint wired to an object registry.
//!
//! Inbound server messages update the [`ObjectRegistry`]; the local
//! avatar's pose and bones, and every locally owned rigidbody, are pushed
//! to the relay each tick. Rendering and physics collaborators only talk
//! to this type: they feed local state in and drain [`RegistryEvent`]s
//! out.

use std::net::SocketAddr;
use std::time::Duration;

use tether_protocol::{
    ClientMessage, MessageReader, ObjectId, Pose, ServerMessage, ServerToClientId, SessionId,
};
use tether_registry::{BonePose, ObjectRegistry, RegistryEvent};
use tether_session::SessionConfig;
use tether_tick::Tickable;
use tether_transport::Transport;

use crate::{ClientEndpoint, ClientEvent, TetherError};

pub struct SyncClient<T: Transport> {
    endpoint: ClientEndpoint<T, ObjectRegistry>,
    registry: ObjectRegistry,
    /// Avatar to announce once connected. `None` lets the relay pick.
    avatar: Option<String>,
    announced: bool,
    local_pose: Option<Pose>,
    local_bones: Option<String>,
    client_events: Vec<ClientEvent>,
}

impl<T: Transport> SyncClient<T> {
    /// A client for a world with `object_count` networked rigidbodies
    /// (ids `0..object_count`).
    pub fn new(transport: T, config: SessionConfig, object_count: usize) -> Self {
        let mut endpoint = ClientEndpoint::new(transport, config);
        register_handlers(&mut endpoint);
        endpoint.on_lifecycle(|registry: &mut ObjectRegistry, event: &ClientEvent| match *event {
            ClientEvent::Connected { id } => registry.set_local_id(Some(id)),
            ClientEvent::ConnectionFailed { .. } | ClientEvent::Disconnected { .. } => {
                registry.clear_avatars();
                registry.set_local_id(None);
            }
        });

        Self {
            endpoint,
            registry: ObjectRegistry::with_objects(object_count),
            avatar: None,
            announced: false,
            local_pose: None,
            local_bones: None,
            client_events: Vec::new(),
        }
    }

    /// Connects to the relay at `addr`, leaving any current relay first.
    /// Everything learned from the previous connection is dropped before
    /// the new one starts, so no avatar survives a switch.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), TetherError> {
        self.announced = false;
        let result = self.endpoint.connect(addr, &mut self.registry);
        self.registry.clear_avatars();
        self.registry.set_local_id(None);
        self.collect_client_events();
        result
    }

    pub fn disconnect(&mut self) {
        self.endpoint.disconnect(&mut self.registry);
        self.collect_client_events();
    }

    // -- Local state in ---------------------------------------------------

    /// Sets the avatar to announce. Announced on the next tick if already
    /// connected (again, if it changed), otherwise right after connecting.
    pub fn set_avatar(&mut self, name: Option<String>) {
        self.avatar = name;
        self.announced = false;
    }

    /// The local avatar moved. Pushed every tick from now on.
    pub fn set_local_pose(&mut self, pose: Pose) {
        self.local_pose = Some(pose);
    }

    /// The local rig's bones changed. Pushed every tick from now on.
    pub fn set_local_bones(&mut self, bones: &BonePose) {
        self.local_bones = Some(bones.encode());
    }

    /// Local physics picked an object up.
    pub fn grab(&mut self, object_id: ObjectId) -> Result<(), TetherError> {
        Ok(self.registry.grab(object_id)?)
    }

    /// Local physics moved a held object.
    pub fn set_object_pose(&mut self, object_id: ObjectId, pose: Pose) -> Result<(), TetherError> {
        Ok(self.registry.set_local_pose(object_id, pose)?)
    }

    /// Local physics let an object go. Its resting pose is sent once more.
    pub fn release(&mut self, object_id: ObjectId) -> Result<(), TetherError> {
        let pose = self.registry.release(object_id)?;
        if self.endpoint.is_connected() {
            self.endpoint
                .send_message(&ClientMessage::UpdateRigidbodyTransform { object_id, pose })?;
        }
        Ok(())
    }

    // -- Output -----------------------------------------------------------

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn endpoint(&self) -> &ClientEndpoint<T, ObjectRegistry> {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.endpoint.session_id()
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Registry changes since the last drain, for rendering/physics.
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        self.registry.drain_events()
    }

    /// Connection changes since the last drain.
    pub fn drain_client_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.client_events)
    }

    // -- Tick -------------------------------------------------------------

    pub fn tick(&mut self, dt: Duration) {
        self.endpoint.tick(dt, &mut self.registry);
        self.collect_client_events();
        if self.endpoint.is_connected() {
            self.push_local_state();
            self.endpoint.flush();
        }
    }

    fn collect_client_events(&mut self) {
        for event in self.endpoint.drain_events() {
            if !matches!(event, ClientEvent::Connected { .. }) {
                self.announced = false;
            }
            self.client_events.push(event);
        }
    }

    fn push_local_state(&mut self) {
        let mut outgoing = Vec::new();
        if !self.announced {
            outgoing.push(ClientMessage::AvatarSpawned {
                avatar: self.avatar.clone(),
            });
            self.announced = true;
        }
        if let Some(pose) = self.local_pose {
            outgoing.push(ClientMessage::UpdateAvatarTransform(pose));
        }
        if let Some(bones) = &self.local_bones {
            outgoing.push(ClientMessage::UpdateAvatarBones {
                bones: bones.clone(),
            });
        }
        for (object_id, pose) in self.registry.owned_objects() {
            outgoing.push(ClientMessage::UpdateRigidbodyTransform { object_id, pose });
        }

        for msg in &outgoing {
            if let Err(e) = self.endpoint.send_message(msg) {
                tracing::debug!(id = %msg.id(), error = %e, "local update not sent");
            }
        }
    }
}

impl<T: Transport> Tickable for SyncClient<T> {
    fn tick(&mut self, dt: Duration) {
        SyncClient::tick(self, dt);
    }
}

/// Wires every server→client message into the registry.
fn register_handlers<T: Transport>(endpoint: &mut ClientEndpoint<T, ObjectRegistry>) {
    for id in ServerToClientId::ALL {
        endpoint.register_handler(
            id,
            move |registry: &mut ObjectRegistry, reader: &mut MessageReader| {
                let msg = ServerMessage::decode(id, reader)?;
                apply(registry, msg);
                Ok(())
            },
        );
    }
}

fn apply(registry: &mut ObjectRegistry, msg: ServerMessage) {
    match msg {
        ServerMessage::SpawnRemoteAvatar {
            sender,
            avatar_name,
        } => registry.upsert_avatar(sender, &avatar_name),
        ServerMessage::MoveAvatarTransform { sender, pose } => {
            registry.apply_transform(sender, pose);
        }
        ServerMessage::MoveAvatarBones { sender, bones } => {
            if let Err(e) = registry.apply_bones(sender, &bones) {
                tracing::debug!(session_id = %sender, error = %e, "bone string stored unparsed");
            }
        }
        ServerMessage::MoveRigidbodyTransform { object_id, pose } => {
            if let Err(e) = registry.apply_rigidbody_transform(object_id, pose) {
                tracing::debug!(error = %e, "remote rigidbody update ignored");
            }
        }
        ServerMessage::ParticipantLeft { sender } => {
            registry.remove_avatar(sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::{Quat, Vec3};
    use tether_registry::{Owner, RegistryError};
    use tether_transport::{MemoryNetwork, MemoryTransport};

    fn client(net: &MemoryNetwork) -> SyncClient<MemoryTransport> {
        SyncClient::new(net.bind(), SessionConfig::default(), 2)
    }

    #[test]
    fn test_apply_spawn_then_leave() {
        let mut registry = ObjectRegistry::default();
        apply(
            &mut registry,
            ServerMessage::SpawnRemoteAvatar {
                sender: SessionId(2),
                avatar_name: "Cyborg".into(),
            },
        );
        assert!(registry.avatar(SessionId(2)).is_some());

        apply(&mut registry, ServerMessage::ParticipantLeft { sender: SessionId(2) });
        assert!(registry.avatar(SessionId(2)).is_none());
    }

    #[test]
    fn test_apply_rigidbody_unknown_object_is_ignored() {
        let mut registry = ObjectRegistry::with_objects(1);
        apply(
            &mut registry,
            ServerMessage::MoveRigidbodyTransform {
                object_id: ObjectId(9),
                pose: Pose::default(),
            },
        );
        assert!(registry.drain_events().is_empty());
    }

    #[test]
    fn test_grab_unknown_object_fails() {
        let net = MemoryNetwork::new();
        let mut c = client(&net);
        assert!(matches!(
            c.grab(ObjectId(5)),
            Err(TetherError::Registry(RegistryError::UnknownObject(_)))
        ));
    }

    #[test]
    fn test_grab_marks_object_locally_owned() {
        let net = MemoryNetwork::new();
        let mut c = client(&net);
        c.grab(ObjectId(1)).unwrap();
        let pose = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY);
        c.set_object_pose(ObjectId(1), pose).unwrap();

        let obj = c.registry().rigidbody(ObjectId(1)).unwrap();
        assert_eq!(obj.owner, Owner::Local);
        assert_eq!(obj.pose, pose);
    }
}
