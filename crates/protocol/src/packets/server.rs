//! Server -> Client messages.

use crate::{Color, ProtocolError, RoomId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One blob as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlobView {
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub radius: f32,
}

/// A player's visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub blobs: Vec<BlobView>,
    pub name: String,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EjectView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirusView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
}

/// Full room state, sent once per wall-frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub players: BTreeMap<SessionId, PlayerView>,
    pub orbs: Vec<OrbView>,
    pub ejects: Vec<EjectView>,
    pub viruses: Vec<VirusView>,
}

/// Final standing of one player in a finished room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub id: u64,
    pub name: String,
    pub kills: u32,
    pub max_mass: f32,
    pub duration_ms: u64,
}

/// Messages sent from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a join or room creation.
    Joined { session_id: SessionId, room_id: RoomId, host: bool },
    Snapshot(RoomSnapshot),
    /// The receiving player lost all of its blobs.
    Eliminated { kills: u32, max_mass: f32, duration_ms: u64 },
    Leaderboard { room_id: RoomId, entries: Vec<LeaderboardEntry> },
    RoomEnded { room_id: RoomId },
    /// Non-fatal server-side failure; gameplay continues.
    InternalError { message: String },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
