//! Typed views over every message in the protocol.
//!
//! The raw [`Message`] builder knows nothing about field layouts. These
//! enums pin each id to its field sequence so callers never hand-write
//! `add`/`read` chains. Decoding reads all fields into locals before
//! building a value, so a truncated payload is an error, never a
//! half-filled message.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    ClientToServerId, Message, ObjectId, Pose, ProtocolError, ServerToClientId, SessionId,
    codec::MessageReader,
};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Everything a client can say to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// The local avatar is ready. `avatar` is the selected avatar name;
    /// `None` lets the relay announce its default.
    AvatarSpawned { avatar: Option<String> },
    UpdateAvatarTransform(Pose),
    UpdateAvatarBones { bones: String },
    UpdateRigidbodyTransform { object_id: ObjectId, pose: Pose },
}

impl ClientMessage {
    pub fn id(&self) -> ClientToServerId {
        match self {
            Self::AvatarSpawned { .. } => ClientToServerId::AvatarSpawned,
            Self::UpdateAvatarTransform(_) => ClientToServerId::UpdateAvatarTransform,
            Self::UpdateAvatarBones { .. } => ClientToServerId::UpdateAvatarBones,
            Self::UpdateRigidbodyTransform { .. } => ClientToServerId::UpdateRigidbodyTransform,
        }
    }

    /// Builds the envelope for this message.
    pub fn to_message(&self) -> Message {
        let msg = Message::client(self.id());
        match self {
            Self::AvatarSpawned { avatar: None } => msg,
            Self::AvatarSpawned {
                avatar: Some(name),
            } => msg.add(name),
            Self::UpdateAvatarTransform(pose) => msg.add(pose),
            Self::UpdateAvatarBones { bones } => msg.add(bones),
            Self::UpdateRigidbodyTransform { object_id, pose } => msg.add(object_id).add(pose),
        }
    }

    /// Reads the fields of an envelope whose id has already been parsed.
    pub fn decode(id: ClientToServerId, reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(match id {
            ClientToServerId::AvatarSpawned => {
                // The avatar name is an optional trailing field.
                let avatar = if reader.is_empty() {
                    None
                } else {
                    Some(reader.read::<String>()?)
                };
                Self::AvatarSpawned { avatar }
            }
            ClientToServerId::UpdateAvatarTransform => {
                Self::UpdateAvatarTransform(reader.read::<Pose>()?)
            }
            ClientToServerId::UpdateAvatarBones => Self::UpdateAvatarBones {
                bones: reader.read::<String>()?,
            },
            ClientToServerId::UpdateRigidbodyTransform => {
                let object_id = reader.read::<ObjectId>()?;
                let pose = reader.read::<Pose>()?;
                Self::UpdateRigidbodyTransform { object_id, pose }
            }
        })
    }

    /// Parses a complete client→server envelope.
    pub fn parse(bytes: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let (raw, mut reader) = Message::parse(bytes)?;
        Self::decode(ClientToServerId::try_from(raw)?, &mut reader)
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Everything the relay can say to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    SpawnRemoteAvatar {
        sender: SessionId,
        avatar_name: String,
    },
    MoveAvatarTransform {
        sender: SessionId,
        pose: Pose,
    },
    MoveAvatarBones {
        sender: SessionId,
        bones: String,
    },
    MoveRigidbodyTransform {
        object_id: ObjectId,
        pose: Pose,
    },
    ParticipantLeft {
        sender: SessionId,
    },
}

impl ServerMessage {
    pub fn id(&self) -> ServerToClientId {
        match self {
            Self::SpawnRemoteAvatar { .. } => ServerToClientId::SpawnRemoteAvatar,
            Self::MoveAvatarTransform { .. } => ServerToClientId::MoveAvatarTransform,
            Self::MoveAvatarBones { .. } => ServerToClientId::MoveAvatarBones,
            Self::MoveRigidbodyTransform { .. } => ServerToClientId::MoveRigidbodyTransform,
            Self::ParticipantLeft { .. } => ServerToClientId::ParticipantLeft,
        }
    }

    pub fn to_message(&self) -> Message {
        let msg = Message::server(self.id());
        match self {
            Self::SpawnRemoteAvatar {
                sender,
                avatar_name,
            } => msg.add(sender).add(avatar_name),
            Self::MoveAvatarTransform { sender, pose } => msg.add(sender).add(pose),
            Self::MoveAvatarBones { sender, bones } => msg.add(sender).add(bones),
            Self::MoveRigidbodyTransform { object_id, pose } => msg.add(object_id).add(pose),
            Self::ParticipantLeft { sender } => msg.add(sender),
        }
    }

    pub fn decode(id: ServerToClientId, reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(match id {
            ServerToClientId::SpawnRemoteAvatar => {
                let sender = reader.read::<SessionId>()?;
                let avatar_name = reader.read::<String>()?;
                Self::SpawnRemoteAvatar {
                    sender,
                    avatar_name,
                }
            }
            ServerToClientId::MoveAvatarTransform => {
                let sender = reader.read::<SessionId>()?;
                let pose = reader.read::<Pose>()?;
                Self::MoveAvatarTransform { sender, pose }
            }
            ServerToClientId::MoveAvatarBones => {
                let sender = reader.read::<SessionId>()?;
                let bones = reader.read::<String>()?;
                Self::MoveAvatarBones { sender, bones }
            }
            ServerToClientId::MoveRigidbodyTransform => {
                let object_id = reader.read::<ObjectId>()?;
                let pose = reader.read::<Pose>()?;
                Self::MoveRigidbodyTransform { object_id, pose }
            }
            ServerToClientId::ParticipantLeft => Self::ParticipantLeft {
                sender: reader.read::<SessionId>()?,
            },
        })
    }

    pub fn parse(bytes: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let (raw, mut reader) = Message::parse(bytes)?;
        Self::decode(ServerToClientId::try_from(raw)?, &mut reader)
    }
}
