//! Client -> Server message parsing.

use super::{MAX_NAME_LEN, MAX_ROOM_DURATION_SECS};
use crate::{ProtocolError, RoomId};
use serde::{Deserialize, Serialize};

/// Parsed client message.
///
/// The engine only ever sees values that went through [`ClientMessage::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room (the default room when `room` is absent).
    Join {
        name: String,
        #[serde(default)]
        room: Option<RoomId>,
        #[serde(default)]
        user_id: Option<u64>,
        #[serde(default)]
        guest_id: Option<String>,
    },
    /// Aim point in world coordinates.
    Input { aim_x: f32, aim_y: f32 },
    /// Split every eligible blob toward the aim point.
    Split,
    /// Eject mass from every eligible blob toward the aim point.
    Eject,
    /// Leave the current room.
    Disconnect,
    /// Create a timed room hosted by the sender. The server default applies when
    /// `duration_secs` is absent.
    CreateRoom {
        name: String,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        private: bool,
    },
    /// Start the sender's room (host only).
    StartRoom,
}

impl ClientMessage {
    /// Decode and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Check field ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Join { name, .. } => validate_name(name),
            ClientMessage::Input { aim_x, aim_y } => {
                if aim_x.is_finite() && aim_y.is_finite() {
                    Ok(())
                } else {
                    Err(ProtocolError::NonFiniteAim)
                }
            }
            ClientMessage::CreateRoom { name, duration_secs, .. } => {
                validate_name(name)?;
                match *duration_secs {
                    Some(secs) if secs == 0 || secs > MAX_ROOM_DURATION_SECS => {
                        Err(ProtocolError::InvalidDuration { got: secs, max: MAX_ROOM_DURATION_SECS })
                    }
                    _ => Ok(()),
                }
            }
            ClientMessage::Split
            | ClientMessage::Eject
            | ClientMessage::Disconnect
            | ClientMessage::StartRoom => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(())
}
