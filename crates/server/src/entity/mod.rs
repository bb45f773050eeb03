//! Game entities.
//!
//! This module defines every entity type living in a room.

mod blob;
mod cell;
mod eject;
mod orb;
mod player;
mod virus;

pub use blob::Blob;
pub use cell::{apply_friction, direction_or, integrate_bouncing, mass_to_radius};
pub use eject::Eject;
pub use orb::Orb;
pub use player::{Consumed, Launch, Player};
pub use virus::Virus;
