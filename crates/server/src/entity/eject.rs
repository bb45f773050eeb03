//! Ejected mass projectile.

use super::cell::integrate_bouncing;
use crate::world::MapBounds;
use glam::Vec2;
use protocol::{Color, SessionId};

/// Mass fired by a player. Consumable by rival blobs or by viruses.
#[derive(Debug, Clone)]
pub struct Eject {
    pub id: u32,
    /// Player that fired it.
    pub owner: SessionId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    /// Seconds since it was fired.
    pub age: f32,
    /// Inherited from the ejecting player.
    pub color: Color,
}

impl Eject {
    pub fn new(id: u32, owner: SessionId, position: Vec2, velocity: Vec2, mass: f32, color: Color) -> Self {
        Self {
            id,
            owner,
            position,
            velocity,
            mass,
            age: 0.0,
            color,
        }
    }

    /// Move, bounce off the map edges and decay velocity.
    pub fn update(&mut self, dt: f32, friction: f32, bounds: &MapBounds) {
        integrate_bouncing(&mut self.position, &mut self.velocity, dt, friction, bounds);
        self.age += dt;
    }

    /// Whether `player` may pick this eject up now.
    #[inline]
    pub fn collectable_by(&self, player: SessionId, owner_immunity_secs: f32) -> bool {
        self.owner != player || self.age >= owner_immunity_secs
    }
}
