//! Networked rigidbodies, keyed by object id.
//!
//! Object ids are assigned once at world setup, sequentially from 0, and
//! never change. The table is therefore a dense vector indexed by id.

use serde::{Deserialize, Serialize};
use tether_protocol::{ObjectId, Pose};

use crate::RegistryError;

/// Who is currently simulating an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Owner {
    /// Nobody is moving it; it rests where it was last placed.
    #[default]
    Unowned,
    /// This client grabbed it and pushes its pose every tick.
    Local,
    /// Another participant is moving it. Wire updates carry no sender,
    /// so only "someone else" is known.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidbodyState {
    pub id: ObjectId,
    pub owner: Owner,
    pub pose: Pose,
}

#[derive(Debug, Default)]
pub struct RigidbodyTable {
    objects: Vec<RigidbodyState>,
}

impl RigidbodyTable {
    /// A world with `count` objects, ids `0..count`, all unowned at the
    /// origin.
    pub fn with_objects(count: usize) -> Self {
        let objects = (0..count)
            .map(|i| RigidbodyState {
                id: ObjectId(i32::try_from(i).unwrap_or(i32::MAX)),
                owner: Owner::Unowned,
                pose: Pose::default(),
            })
            .collect();
        Self { objects }
    }

    pub fn get(&self, id: ObjectId) -> Option<&RigidbodyState> {
        usize::try_from(id.0).ok().and_then(|i| self.objects.get(i))
    }

    fn entry(&mut self, id: ObjectId) -> Result<&mut RigidbodyState, RegistryError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.objects.get_mut(i))
            .ok_or(RegistryError::UnknownObject(id))
    }

    /// Applies a pose received from the network. The object becomes
    /// remotely owned: whoever sent it is moving it now.
    pub fn apply_remote(&mut self, id: ObjectId, pose: Pose) -> Result<(), RegistryError> {
        let entry = self.entry(id)?;
        entry.owner = Owner::Remote;
        entry.pose = pose;
        Ok(())
    }

    /// Records the locally simulated pose of an object.
    pub fn set_local_pose(&mut self, id: ObjectId, pose: Pose) -> Result<(), RegistryError> {
        self.entry(id)?.pose = pose;
        Ok(())
    }

    /// Takes ownership of an object.
    pub fn grab(&mut self, id: ObjectId) -> Result<(), RegistryError> {
        self.entry(id)?.owner = Owner::Local;
        Ok(())
    }

    /// Gives up ownership and returns the resting pose, which the caller
    /// pushes one final time.
    pub fn release(&mut self, id: ObjectId) -> Result<Pose, RegistryError> {
        let entry = self.entry(id)?;
        entry.owner = Owner::Unowned;
        Ok(entry.pose)
    }

    /// Objects this client owns, with their current pose.
    pub fn owned(&self) -> impl Iterator<Item = &RigidbodyState> {
        self.objects.iter().filter(|o| o.owner == Owner::Local)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RigidbodyState> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::{Quat, Vec3};

    fn pose(x: f32) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn test_with_objects_assigns_ids_from_zero() {
        let t = RigidbodyTable::with_objects(3);
        let ids: Vec<_> = t.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![ObjectId(0), ObjectId(1), ObjectId(2)]);
        assert!(t.iter().all(|o| o.owner == Owner::Unowned));
    }

    #[test]
    fn test_apply_remote_unknown_object_fails_unchanged() {
        let mut t = RigidbodyTable::with_objects(2);
        assert_eq!(
            t.apply_remote(ObjectId(2), pose(1.0)),
            Err(RegistryError::UnknownObject(ObjectId(2)))
        );
        assert_eq!(
            t.apply_remote(ObjectId(-1), pose(1.0)),
            Err(RegistryError::UnknownObject(ObjectId(-1)))
        );
        assert!(t.iter().all(|o| o.pose == Pose::default()));
    }

    #[test]
    fn test_grab_then_release_returns_last_pose() {
        let mut t = RigidbodyTable::with_objects(1);
        t.grab(ObjectId(0)).unwrap();
        t.set_local_pose(ObjectId(0), pose(4.0)).unwrap();
        assert_eq!(t.owned().count(), 1);

        assert_eq!(t.release(ObjectId(0)).unwrap(), pose(4.0));
        assert_eq!(t.get(ObjectId(0)).unwrap().owner, Owner::Unowned);
        assert_eq!(t.owned().count(), 0);
    }

    #[test]
    fn test_apply_remote_takes_ownership_away() {
        let mut t = RigidbodyTable::with_objects(1);
        t.grab(ObjectId(0)).unwrap();
        t.apply_remote(ObjectId(0), pose(9.0)).unwrap();
        let o = t.get(ObjectId(0)).unwrap();
        assert_eq!(o.owner, Owner::Remote);
        assert_eq!(o.pose, pose(9.0));
    }
}
