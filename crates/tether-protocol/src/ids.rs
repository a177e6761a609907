//! Message-type identifier tables.
//!
//! Client→server and server→client ids are independent namespaces: id 2
//! means "update avatar transform" going up and "move avatar transform"
//! coming down. Id 0 is reserved in both so a zeroed header never looks
//! like a real message.
//!
//! The delivery mode is an intrinsic property of each id rather than a
//! per-call-site choice, so every sender of a given message type gets the
//! same guarantee.

use std::fmt;

use crate::{DeliveryMode, ProtocolError};

/// Messages a client sends to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClientToServerId {
    /// "My avatar is ready." Optional selected avatar name. Reliable.
    AvatarSpawned = 1,
    /// Local avatar pose, every tick. Unreliable.
    UpdateAvatarTransform = 2,
    /// Local avatar bone rotations, every tick. Unreliable.
    UpdateAvatarBones = 3,
    /// Pose of a rigidbody this client currently owns. Unreliable.
    UpdateRigidbodyTransform = 4,
}

impl ClientToServerId {
    /// Every client→server id, in wire order.
    pub const ALL: [Self; 4] = [
        Self::AvatarSpawned,
        Self::UpdateAvatarTransform,
        Self::UpdateAvatarBones,
        Self::UpdateRigidbodyTransform,
    ];

    pub const fn mode(self) -> DeliveryMode {
        match self {
            Self::AvatarSpawned => DeliveryMode::Reliable,
            Self::UpdateAvatarTransform
            | Self::UpdateAvatarBones
            | Self::UpdateRigidbodyTransform => DeliveryMode::Unreliable,
        }
    }
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServerToClientId {
    /// Announces a participant's avatar. Reliable.
    SpawnRemoteAvatar = 1,
    /// Relayed avatar pose. Unreliable.
    MoveAvatarTransform = 2,
    /// Relayed avatar bone rotations. Unreliable.
    MoveAvatarBones = 3,
    /// Relayed rigidbody pose. Unreliable.
    MoveRigidbodyTransform = 4,
    /// A participant's session ended (disconnect or timeout). Reliable.
    ParticipantLeft = 5,
}

impl ServerToClientId {
    /// Every server→client id, in wire order.
    pub const ALL: [Self; 5] = [
        Self::SpawnRemoteAvatar,
        Self::MoveAvatarTransform,
        Self::MoveAvatarBones,
        Self::MoveRigidbodyTransform,
        Self::ParticipantLeft,
    ];

    pub const fn mode(self) -> DeliveryMode {
        match self {
            Self::SpawnRemoteAvatar | Self::ParticipantLeft => DeliveryMode::Reliable,
            Self::MoveAvatarTransform
            | Self::MoveAvatarBones
            | Self::MoveRigidbodyTransform => DeliveryMode::Unreliable,
        }
    }
}

// The two enums share every conversion, so generate them once.
macro_rules! impl_message_id {
    ($($name:ident),*) => {
        $(
            impl From<$name> for u16 {
                fn from(id: $name) -> u16 {
                    id as u16
                }
            }

            impl TryFrom<u16> for $name {
                type Error = ProtocolError;

                fn try_from(raw: u16) -> Result<Self, Self::Error> {
                    Self::ALL
                        .into_iter()
                        .find(|id| u16::from(*id) == raw)
                        .ok_or(ProtocolError::UnknownMessageType(raw))
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{:?}({})", self, u16::from(*self))
                }
            }
        )*
    };
}

impl_message_id!(ClientToServerId, ServerToClientId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        assert_eq!(u16::from(ClientToServerId::AvatarSpawned), 1);
        assert_eq!(u16::from(ServerToClientId::SpawnRemoteAvatar), 1);
        assert_eq!(u16::from(ServerToClientId::ParticipantLeft), 5);
    }

    #[test]
    fn test_try_from_zero_is_unknown() {
        assert_eq!(
            ClientToServerId::try_from(0),
            Err(ProtocolError::UnknownMessageType(0))
        );
        assert_eq!(
            ServerToClientId::try_from(0),
            Err(ProtocolError::UnknownMessageType(0))
        );
    }

    #[test]
    fn test_try_from_round_trips_every_id() {
        for id in ClientToServerId::ALL {
            assert_eq!(ClientToServerId::try_from(u16::from(id)), Ok(id));
        }
        for id in ServerToClientId::ALL {
            assert_eq!(ServerToClientId::try_from(u16::from(id)), Ok(id));
        }
    }

    #[test]
    fn test_try_from_out_of_range_is_unknown() {
        assert!(ClientToServerId::try_from(5).is_err());
        assert!(ServerToClientId::try_from(6).is_err());
    }

    #[test]
    fn test_modes_follow_message_semantics() {
        // Discrete events are reliable, per-tick state is unreliable.
        assert_eq!(ClientToServerId::AvatarSpawned.mode(), DeliveryMode::Reliable);
        assert_eq!(
            ClientToServerId::UpdateAvatarTransform.mode(),
            DeliveryMode::Unreliable
        );
        assert_eq!(ServerToClientId::SpawnRemoteAvatar.mode(), DeliveryMode::Reliable);
        assert_eq!(ServerToClientId::ParticipantLeft.mode(), DeliveryMode::Reliable);
        assert_eq!(
            ServerToClientId::MoveRigidbodyTransform.mode(),
            DeliveryMode::Unreliable
        );
    }

    #[test]
    fn test_display_includes_name_and_number() {
        assert_eq!(
            ServerToClientId::MoveAvatarBones.to_string(),
            "MoveAvatarBones(3)"
        );
    }
}
