//! The client-side object registry: avatars, rigidbodies, and the event
//! queue rendering and physics collaborators drain each frame.
//!
//! Every operation here is a pure state update. Nothing in this module
//! sends or receives; the sync glue in the `tether` crate feeds decoded
//! messages in and pushes locally owned state out.

use serde::{Deserialize, Serialize};
use tether_protocol::{ObjectId, Pose, SessionId};

use crate::{AvatarState, AvatarTable, BonePose, RegistryError, RigidbodyState, RigidbodyTable};

/// Outward notification for rendering/physics collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegistryEvent {
    AvatarSpawned {
        id: SessionId,
        avatar_name: String,
    },
    AvatarDespawned {
        id: SessionId,
    },
    AvatarPoseUpdated {
        id: SessionId,
        pose: Pose,
    },
    AvatarBonesUpdated {
        id: SessionId,
        bones: String,
    },
    RigidbodyPoseUpdated {
        object_id: ObjectId,
        pose: Pose,
    },
}

/// A serializable copy of the whole registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub local_id: Option<SessionId>,
    pub avatars: Vec<AvatarState>,
    pub rigidbodies: Vec<RigidbodyState>,
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    local_id: Option<SessionId>,
    avatars: AvatarTable,
    rigidbodies: RigidbodyTable,
    events: Vec<RegistryEvent>,
}

impl ObjectRegistry {
    /// A registry for a world with `object_count` networked rigidbodies.
    pub fn with_objects(object_count: usize) -> Self {
        Self {
            rigidbodies: RigidbodyTable::with_objects(object_count),
            ..Self::default()
        }
    }

    /// The local participant's id. Spawn announcements for it are ignored.
    pub fn set_local_id(&mut self, id: Option<SessionId>) {
        self.local_id = id;
    }

    pub fn local_id(&self) -> Option<SessionId> {
        self.local_id
    }

    // =====================================================================
    // Avatars
    // =====================================================================

    /// Spawns a remote avatar, or rebuilds it under a new name if it
    /// already exists. The local participant's own id is ignored.
    pub fn upsert_avatar(&mut self, id: SessionId, avatar_name: &str) {
        if Some(id) == self.local_id {
            tracing::trace!(session_id = %id, "ignoring spawn of local participant");
            return;
        }
        let created = self.avatars.upsert(id, avatar_name);
        if created {
            tracing::debug!(session_id = %id, avatar_name, "remote avatar spawned");
        } else {
            tracing::debug!(session_id = %id, avatar_name, "remote avatar rebuilt");
        }
        self.events.push(RegistryEvent::AvatarSpawned {
            id,
            avatar_name: avatar_name.to_owned(),
        });
    }

    /// Despawns a remote avatar. Returns `false` if it was not present.
    pub fn remove_avatar(&mut self, id: SessionId) -> bool {
        if self.avatars.remove(id).is_none() {
            return false;
        }
        tracing::debug!(session_id = %id, "remote avatar despawned");
        self.events.push(RegistryEvent::AvatarDespawned { id });
        true
    }

    /// Moves a remote avatar. Updates for unknown ids are ignored.
    pub fn apply_transform(&mut self, id: SessionId, pose: Pose) -> bool {
        if !self.avatars.set_pose(id, pose) {
            return false;
        }
        self.events.push(RegistryEvent::AvatarPoseUpdated { id, pose });
        true
    }

    /// Stores a remote avatar's bone string and reports whether it parses.
    ///
    /// The string is stored and announced even when malformed, so a
    /// renderer with its own parser still sees it; the parse result is
    /// returned for callers that want [`BonePose`]s. Unknown ids are
    /// ignored (`Ok(None)`).
    pub fn apply_bones(&mut self, id: SessionId, bones: &str) -> Result<Option<BonePose>, RegistryError> {
        if !self.avatars.set_bones(id, bones) {
            return Ok(None);
        }
        self.events.push(RegistryEvent::AvatarBonesUpdated {
            id,
            bones: bones.to_owned(),
        });
        BonePose::parse(bones).map(Some)
    }

    /// Despawns every remote avatar. Used when the local connection ends.
    pub fn clear_avatars(&mut self) {
        for id in self.avatars.clear() {
            self.events.push(RegistryEvent::AvatarDespawned { id });
        }
    }

    pub fn avatar(&self, id: SessionId) -> Option<&AvatarState> {
        self.avatars.get(id)
    }

    pub fn avatars(&self) -> &AvatarTable {
        &self.avatars
    }

    // =====================================================================
    // Rigidbodies
    // =====================================================================

    /// Applies a networked rigidbody pose. The object becomes remotely
    /// owned.
    pub fn apply_rigidbody_transform(&mut self, object_id: ObjectId, pose: Pose) -> Result<(), RegistryError> {
        self.rigidbodies.apply_remote(object_id, pose)?;
        self.events
            .push(RegistryEvent::RigidbodyPoseUpdated { object_id, pose });
        Ok(())
    }

    /// Local physics picked the object up.
    pub fn grab(&mut self, object_id: ObjectId) -> Result<(), RegistryError> {
        self.rigidbodies.grab(object_id)?;
        tracing::debug!(%object_id, "object grabbed");
        Ok(())
    }

    /// Local physics put the object down. Returns the pose to push once
    /// more so every peer sees where it came to rest.
    pub fn release(&mut self, object_id: ObjectId) -> Result<Pose, RegistryError> {
        let pose = self.rigidbodies.release(object_id)?;
        tracing::debug!(%object_id, "object released");
        Ok(pose)
    }

    /// Local physics moved an object.
    pub fn set_local_pose(&mut self, object_id: ObjectId, pose: Pose) -> Result<(), RegistryError> {
        self.rigidbodies.set_local_pose(object_id, pose)
    }

    /// Locally owned objects and their poses, ascending by id.
    pub fn owned_objects(&self) -> Vec<(ObjectId, Pose)> {
        self.rigidbodies.owned().map(|o| (o.id, o.pose)).collect()
    }

    pub fn rigidbody(&self, object_id: ObjectId) -> Option<&RigidbodyState> {
        self.rigidbodies.get(object_id)
    }

    pub fn rigidbodies(&self) -> &RigidbodyTable {
        &self.rigidbodies
    }

    // =====================================================================
    // Output
    // =====================================================================

    /// Takes every event queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            local_id: self.local_id,
            avatars: self.avatars.iter().cloned().collect(),
            rigidbodies: self.rigidbodies.iter().cloned().collect(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
