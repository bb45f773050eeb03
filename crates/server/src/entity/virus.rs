//! Virus hazard.

use super::cell::{direction_or, integrate_bouncing, mass_to_radius};
use crate::world::MapBounds;
use glam::Vec2;

/// A virus that explodes oversized blobs and clones itself when fed.
#[derive(Debug, Clone)]
pub struct Virus {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    /// Ejects absorbed since the last reset.
    pub fed_count: u32,
    /// Unit vector from this virus toward the most recent feeder.
    pub last_feed_from: Vec2,
}

impl Virus {
    /// Create a resting virus at base mass.
    pub fn new(id: u32, position: Vec2, base_mass: f32) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            mass: base_mass,
            fed_count: 0,
            last_feed_from: Vec2::X,
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        mass_to_radius(self.mass)
    }

    /// Move, bounce off the map edges and decay velocity.
    pub fn update(&mut self, dt: f32, friction: f32, bounds: &MapBounds) {
        integrate_bouncing(&mut self.position, &mut self.velocity, dt, friction, bounds);
    }

    /// Absorb an eject arriving from `eject_position` (moving at
    /// `eject_velocity`). Returns true once the feed threshold is reached.
    pub fn feed(&mut self, mass: f32, eject_position: Vec2, eject_velocity: Vec2, max_feed: u32) -> bool {
        // An eject sitting exactly on the centre still has a travel direction.
        let fallback = -eject_velocity.try_normalize().unwrap_or(Vec2::X);
        self.last_feed_from = direction_or(self.position, eject_position, fallback);
        self.mass += mass;
        self.fed_count += 1;
        self.fed_count >= max_feed
    }

    /// Return to base mass and zero feed count, then produce a clone at the
    /// same position launched away from the last feeder.
    pub fn split_off(&mut self, clone_id: u32, base_mass: f32, shoot_speed: f32) -> Virus {
        self.mass = base_mass;
        self.fed_count = 0;

        let mut clone = Virus::new(clone_id, self.position, base_mass);
        clone.velocity = -self.last_feed_from * shoot_speed;
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_reaches_threshold() {
        let mut virus = Virus::new(1, Vec2::new(100.0, 100.0), 1600.0);
        let from = Vec2::new(90.0, 100.0);
        assert!(!virus.feed(40.0, from, Vec2::X, 3));
        assert!(!virus.feed(40.0, from, Vec2::X, 3));
        assert!(virus.feed(40.0, from, Vec2::X, 3));
        assert_eq!(virus.mass, 1720.0);
        assert_eq!(virus.fed_count, 3);
    }

    #[test]
    fn test_split_off_resets_and_shoots_away_from_feeder() {
        let mut virus = Virus::new(1, Vec2::new(100.0, 100.0), 1600.0);
        virus.feed(40.0, Vec2::new(90.0, 100.0), Vec2::X, 1);
        let clone = virus.split_off(2, 1600.0, 700.0);

        assert_eq!(virus.mass, 1600.0);
        assert_eq!(virus.fed_count, 0);
        assert_eq!(clone.mass, 1600.0);
        assert_eq!(clone.position, virus.position);
        // Feeder was on the left, so the clone flies right.
        assert!(clone.velocity.x > 0.0);
        assert!((clone.velocity.length() - 700.0).abs() < 1e-3);
    }
}
