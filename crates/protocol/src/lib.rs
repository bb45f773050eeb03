//! Shared protocol crate for mass-arena.
//!
//! This crate contains:
//! - Typed client -> server messages, validated at the transport boundary
//! - Server -> client messages (snapshots, leaderboard, room events)
//! - Shared types (Color, ids)

mod error;
pub mod packets;

pub use error::ProtocolError;
pub use packets::{
    BlobView, ClientMessage, EjectView, LeaderboardEntry, OrbView, PlayerView, RoomSnapshot,
    ServerMessage, VirusView,
};

/// Identifier of a connected session. Also the id of the player it controls.
pub type SessionId = u32;

/// Identifier of a room.
pub type RoomId = u32;

/// RGB color used for blobs, orbs and ejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}
