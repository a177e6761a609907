//! Remote avatars, keyed by the participant's session id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tether_protocol::{Pose, SessionId};

/// What a client knows about one remote participant's avatar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarState {
    pub id: SessionId,
    pub avatar_name: String,
    pub pose: Pose,
    /// The last bone string received, verbatim.
    pub bones: String,
}

impl AvatarState {
    fn new(id: SessionId, avatar_name: String) -> Self {
        Self {
            id,
            avatar_name,
            pose: Pose::default(),
            bones: String::new(),
        }
    }
}

/// Session id → avatar. Pure state; emits nothing.
#[derive(Debug, Default)]
pub struct AvatarTable {
    avatars: BTreeMap<SessionId, AvatarState>,
}

impl AvatarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an avatar, or renames an existing one (keeping its pose).
    /// Returns `true` when the id was not present before.
    pub fn upsert(&mut self, id: SessionId, avatar_name: &str) -> bool {
        match self.avatars.get_mut(&id) {
            Some(existing) => {
                existing.avatar_name = avatar_name.to_owned();
                false
            }
            None => {
                self.avatars
                    .insert(id, AvatarState::new(id, avatar_name.to_owned()));
                true
            }
        }
    }

    pub fn remove(&mut self, id: SessionId) -> Option<AvatarState> {
        self.avatars.remove(&id)
    }

    /// Sets the pose of a known avatar. Unknown ids are ignored.
    pub fn set_pose(&mut self, id: SessionId, pose: Pose) -> bool {
        match self.avatars.get_mut(&id) {
            Some(avatar) => {
                avatar.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Stores a bone string on a known avatar. Unknown ids are ignored.
    pub fn set_bones(&mut self, id: SessionId, bones: &str) -> bool {
        match self.avatars.get_mut(&id) {
            Some(avatar) => {
                bones.clone_into(&mut avatar.bones);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&AvatarState> {
        self.avatars.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.avatars.contains_key(&id)
    }

    /// Ids ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        self.avatars.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvatarState> {
        self.avatars.values()
    }

    /// Removes every avatar and returns their ids, ascending.
    pub fn clear(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.avatars).into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }
}
