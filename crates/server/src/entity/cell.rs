//! Shared physics for every round entity.

use crate::world::MapBounds;
use glam::Vec2;
use std::f32::consts::PI;

/// Radius of a circle whose area equals `mass`.
///
/// Hit-testing and physics both go through this; no entity stores a radius.
#[inline]
pub fn mass_to_radius(mass: f32) -> f32 {
    (mass / PI).sqrt()
}

/// Exponential velocity decay: `v * e^(-friction * dt)`.
#[inline]
pub fn apply_friction(velocity: Vec2, friction: f32, dt: f32) -> Vec2 {
    let decayed = velocity * (-friction * dt).exp();
    // Snap tiny residuals so resting entities stop drifting.
    if decayed.length_squared() < 1e-4 {
        Vec2::ZERO
    } else {
        decayed
    }
}

/// Unit vector from `from` to `to`, or `fallback` when the points are within
/// one unit of each other.
#[inline]
pub fn direction_or(from: Vec2, to: Vec2, fallback: Vec2) -> Vec2 {
    let delta = to - from;
    let distance = delta.length();
    if distance < 1.0 {
        fallback
    } else {
        delta / distance
    }
}

/// Integrate `position` by `velocity * dt`, bouncing off the map edges.
///
/// A component that leaves the map is clamped back onto the edge and its
/// velocity inverted. Friction is applied afterwards.
pub fn integrate_bouncing(
    position: &mut Vec2,
    velocity: &mut Vec2,
    dt: f32,
    friction: f32,
    bounds: &MapBounds,
) {
    *position += *velocity * dt;

    if position.x < 0.0 {
        position.x = 0.0;
        velocity.x = -velocity.x;
    } else if position.x > bounds.width {
        position.x = bounds.width;
        velocity.x = -velocity.x;
    }

    if position.y < 0.0 {
        position.y = 0.0;
        velocity.y = -velocity.y;
    } else if position.y > bounds.height {
        position.y = bounds.height;
        velocity.y = -velocity.y;
    }

    *velocity = apply_friction(*velocity, friction, dt);
}
