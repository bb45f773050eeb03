//! Player blob.

use super::cell::mass_to_radius;
use crate::Timestamp;
use glam::Vec2;

/// One circular mass unit owned by a player.
///
/// Mass is kept private so it can only change through methods that keep it
/// strictly positive and under the configured cap.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Centre in world coordinates.
    pub position: Vec2,
    mass: f32,
    /// Launch impulse from a split or explosion. Decays by friction.
    pub velocity: Vec2,
    /// Earliest time this blob may merge with a sibling.
    pub merge_at: Timestamp,
}

impl Blob {
    /// Create a resting blob that can merge immediately.
    pub fn new(position: Vec2, mass: f32) -> Self {
        Self {
            position,
            mass: mass.max(f32::MIN_POSITIVE),
            velocity: Vec2::ZERO,
            merge_at: 0,
        }
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Radius derived from mass: sqrt(mass / PI).
    #[inline]
    pub fn radius(&self) -> f32 {
        mass_to_radius(self.mass)
    }

    /// Set mass, clamped into `(0, cap]`.
    #[inline]
    pub fn set_mass(&mut self, mass: f32, cap: f32) {
        self.mass = mass.clamp(f32::MIN_POSITIVE, cap);
    }

    /// Absorb `gained` mass. Area is conserved, so the new radius satisfies
    /// r^2 = r_old^2 + r_gained^2 until the cap is reached.
    #[inline]
    pub fn grow(&mut self, gained: f32, cap: f32) {
        self.set_mass(self.mass + gained, cap);
    }

    #[inline]
    pub fn can_merge(&self, now: Timestamp) -> bool {
        now >= self.merge_at
    }
}
