//! Mass-arena game server library.
//!
//! The simulation core (entities, collisions, per-room `simulate`) is pure
//! computation. The scheduler, persistence worker and transport live under
//! [`server`] and [`persistence`].

pub mod collision;
pub mod config;
pub mod entity;
pub mod lifecycle;
pub mod penalty;
pub mod persistence;
pub mod registry;
pub mod server;
pub mod simulation;
pub mod world;

/// Wall-clock time in milliseconds since the Unix epoch.
pub type Timestamp = u64;

// Re-export commonly used types
pub use config::Config;
pub use registry::RoomRegistry;
pub use server::{run, SnapshotBroadcast, SnapshotFrame, TargetedMessage};
pub use world::World;
