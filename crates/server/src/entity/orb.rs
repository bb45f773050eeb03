//! Orb pickup.

use glam::Vec2;
use protocol::Color;

/// A static pickup that grows player mass.
#[derive(Debug, Clone)]
pub struct Orb {
    pub id: u32,
    pub position: Vec2,
    pub mass: f32,
    pub color: Color,
}

impl Orb {
    pub fn new(id: u32, position: Vec2, mass: f32, color: Color) -> Self {
        Self { id, position, mass, color }
    }

    /// Grow by `step` without passing `cap`.
    #[inline]
    pub fn grow(&mut self, step: f32, cap: f32) {
        if self.mass < cap {
            self.mass = (self.mass + step).min(cap);
        }
    }
}
