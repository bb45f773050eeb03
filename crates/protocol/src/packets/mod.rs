//! Message definitions for the mass-arena protocol.
//!
//! Frames are JSON text objects carrying a `type` tag. This module contains
//! both client->server and server->client message types.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Longest player or room name accepted from a client.
pub const MAX_NAME_LEN: usize = 30;

/// Longest timed room accepted from a client (one hour).
pub const MAX_ROOM_DURATION_SECS: u64 = 3600;
