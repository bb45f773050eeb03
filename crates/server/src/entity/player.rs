//! Player: an ordered group of blobs steered toward one target.

use super::blob::Blob;
use super::cell::{apply_friction, direction_or};
use super::eject::Eject;
use super::orb::Orb;
use crate::collision::{compact, overlap, push_apart};
use crate::config::{Config, PlayerConfig};
use crate::simulation::StepContext;
use crate::world::MapBounds;
use crate::Timestamp;
use fixedbitset::FixedBitSet;
use glam::Vec2;
use protocol::SessionId;
use rand::Rng;
use std::collections::HashSet;
use std::f32::consts::TAU;

/// Pickups collected by one player during one update.
///
/// The engine deletes these ids from the world before the next player moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumed {
    pub orbs: Vec<u32>,
    pub ejects: Vec<u32>,
}

impl Consumed {
    pub fn is_empty(&self) -> bool {
        self.orbs.is_empty() && self.ejects.is_empty()
    }
}

/// Spawn point and initial velocity for a new projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launch {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// A player's blobs plus the decay multiplier driven by the virus penalty.
#[derive(Debug, Clone)]
pub struct Player {
    pub blobs: Vec<Blob>,
    pub decay_multiplier: f32,
}

impl Player {
    /// A fresh player with one blob.
    pub fn spawn(position: Vec2, mass: f32) -> Self {
        Self {
            blobs: vec![Blob::new(position, mass)],
            decay_multiplier: 1.0,
        }
    }

    #[inline]
    pub fn is_eliminated(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn total_mass(&self) -> f32 {
        self.blobs.iter().map(Blob::mass).sum()
    }

    /// Mass-weighted centre of all blobs.
    pub fn center(&self) -> Option<Vec2> {
        let total = self.total_mass();
        if self.blobs.is_empty() || total <= 0.0 {
            return None;
        }
        let weighted = self
            .blobs
            .iter()
            .fold(Vec2::ZERO, |acc, b| acc + b.position * b.mass());
        Some(weighted / total)
    }

    /// Move every blob toward `target`, decay mass, settle sibling overlaps
    /// and collect pickups.
    pub fn update(
        &mut self,
        ctx: &StepContext,
        owner: SessionId,
        target: Vec2,
        orbs: &[Orb],
        ejects: &[Eject],
    ) -> Consumed {
        let cfg = &ctx.config.player;
        let decay = cfg.decay_rate * self.decay_multiplier * ctx.dt;

        for blob in &mut self.blobs {
            let delta = target - blob.position;
            let distance = delta.length();
            if distance >= 1.0 {
                let speed = seek_speed(cfg, distance, blob.radius());
                blob.position += delta / distance * speed * ctx.dt;
            }

            blob.position += blob.velocity * ctx.dt;
            blob.velocity = apply_friction(blob.velocity, cfg.split_friction, ctx.dt);

            if blob.mass() > cfg.min_mass {
                let decayed = (blob.mass() - blob.mass() * decay).max(cfg.min_mass);
                blob.set_mass(decayed, cfg.max_mass);
            }

            blob.position = ctx.bounds.clamp(blob.position);
        }

        self.resolve_own_overlaps(ctx);
        self.consume(ctx, owner, orbs, ejects)
    }

    /// Collect every pickup whose centre lies inside a blob.
    fn consume(&mut self, ctx: &StepContext, owner: SessionId, orbs: &[Orb], ejects: &[Eject]) -> Consumed {
        let cap = ctx.config.player.max_mass;
        let immunity = ctx.config.eject.owner_immunity_secs;
        let mut consumed = Consumed::default();
        let mut taken_orbs = HashSet::new();
        let mut taken_ejects = HashSet::new();

        for blob in &mut self.blobs {
            for orb in orbs {
                if taken_orbs.contains(&orb.id) {
                    continue;
                }
                let radius = blob.radius();
                if blob.position.distance_squared(orb.position) < radius * radius {
                    blob.grow(orb.mass, cap);
                    taken_orbs.insert(orb.id);
                    consumed.orbs.push(orb.id);
                }
            }

            for eject in ejects {
                if taken_ejects.contains(&eject.id) || !eject.collectable_by(owner, immunity) {
                    continue;
                }
                let radius = blob.radius();
                if blob.position.distance_squared(eject.position) < radius * radius {
                    blob.grow(eject.mass, cap);
                    taken_ejects.insert(eject.id);
                    consumed.ejects.push(eject.id);
                }
            }

            blob.position = ctx.bounds.clamp(blob.position);
        }

        consumed
    }

    /// Sibling blobs merge once both are past their cooldown and deeply
    /// overlapping; until then they are pushed apart.
    fn resolve_own_overlaps(&mut self, ctx: &StepContext) {
        let count = self.blobs.len();
        if count < 2 {
            return;
        }

        let cap = ctx.config.player.max_mass;
        let mut merged = FixedBitSet::with_capacity(count);

        for i in 0..count {
            if merged.contains(i) {
                continue;
            }
            for j in (i + 1)..count {
                if merged.contains(j) {
                    continue;
                }
                let (head, tail) = self.blobs.split_at_mut(j);
                let (a, b) = (&mut head[i], &mut tail[0]);

                let Some(hit) = overlap(a.position, a.radius(), b.position, b.radius()) else {
                    continue;
                };

                if a.can_merge(ctx.now) && b.can_merge(ctx.now) {
                    if hit.distance < a.radius().max(b.radius()) {
                        if b.mass() > a.mass() {
                            a.position = b.position;
                        }
                        a.grow(b.mass(), cap);
                        merged.insert(j);
                    }
                } else {
                    push_apart(a, b, &hit, &ctx.bounds);
                }
            }
        }

        compact(&mut self.blobs, &merged);
    }

    /// Split every blob heavy enough into two equal halves, launching the new
    /// half toward `aim`. Stops silently at the blob cap. Returns the number
    /// of splits performed.
    pub fn split(&mut self, aim: Vec2, now: Timestamp, cfg: &PlayerConfig) -> usize {
        let existing = self.blobs.len();
        let mut splits = 0;

        for index in 0..existing {
            if self.blobs.len() >= cfg.max_blobs {
                break;
            }
            let blob = &mut self.blobs[index];
            if blob.mass() < cfg.min_split_mass {
                continue;
            }

            let half = blob.mass() / 2.0;
            let merge_at = now + merge_delay_ms(cfg, half);
            let direction = direction_or(blob.position, aim, Vec2::X);

            blob.set_mass(half, cfg.max_mass);
            blob.merge_at = merge_at;

            let mut child = Blob::new(blob.position, half);
            child.velocity = direction * cfg.split_speed;
            child.merge_at = merge_at;
            self.blobs.push(child);
            splits += 1;
        }

        splits
    }

    /// Fire one eject from every blob at or above the minimum eject mass.
    /// Each source blob pays the fixed mass cost.
    pub fn eject(&mut self, aim: Vec2, cfg: &Config, bounds: &MapBounds) -> Vec<Launch> {
        let mut launches = Vec::new();

        for blob in &mut self.blobs {
            if blob.mass() < cfg.player.min_eject_mass {
                continue;
            }
            let remaining = blob.mass() - cfg.eject.mass_cost;
            if remaining <= 0.0 {
                continue;
            }

            let direction = direction_or(blob.position, aim, Vec2::X);
            blob.set_mass(remaining, cfg.player.max_mass);

            launches.push(Launch {
                position: bounds.clamp(blob.position + direction * blob.radius()),
                velocity: direction * cfg.eject.speed,
            });
        }

        launches
    }

    /// Break the blob at `index` into equal pieces flung radially. The piece
    /// count is bounded by the configured maximum, the spare blob capacity
    /// and the minimum blob mass. Returns the number of blobs added.
    pub fn explode(&mut self, index: usize, ctx: &StepContext) -> usize {
        let player_cfg = &ctx.config.player;
        let spare = player_cfg.max_blobs.saturating_sub(self.blobs.len());
        if spare == 0 || index >= self.blobs.len() {
            return 0;
        }

        let mass = self.blobs[index].mass();
        let mut pieces = ctx.config.virus.explode_pieces.min(spare + 1);
        while pieces > 1 && mass / (pieces as f32) < player_cfg.min_mass {
            pieces -= 1;
        }
        if pieces < 2 {
            return 0;
        }

        let piece_mass = mass / pieces as f32;
        let merge_at = ctx.now + merge_delay_ms(player_cfg, piece_mass);
        let origin = self.blobs[index].position;
        {
            let blob = &mut self.blobs[index];
            blob.set_mass(piece_mass, player_cfg.max_mass);
            blob.merge_at = merge_at;
        }

        let added = pieces - 1;
        let offset = rand::rng().random_range(0.0..TAU);
        for k in 0..added {
            let angle = offset + TAU * k as f32 / added as f32;
            let mut piece = Blob::new(origin, piece_mass);
            piece.velocity = Vec2::from_angle(angle) * player_cfg.split_speed;
            piece.merge_at = merge_at;
            self.blobs.push(piece);
        }

        added
    }
}

/// Distance-scaled seek speed, clamped, then slowed for large blobs.
fn seek_speed(cfg: &PlayerConfig, distance: f32, radius: f32) -> f32 {
    let size_factor = (radius / cfg.base_radius).sqrt().max(1.0);
    (distance * cfg.speed_scale).clamp(cfg.min_speed, cfg.max_speed) / size_factor
}

/// Merge cooldown in milliseconds; heavier blobs wait longer.
fn merge_delay_ms(cfg: &PlayerConfig, mass: f32) -> u64 {
    (cfg.merge_base_secs.max(mass * cfg.merge_secs_per_mass) * 1000.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Color;

    fn ctx(config: &Config) -> StepContext<'_> {
        StepContext {
            dt: 0.02,
            now: 1_000,
            config,
            bounds: MapBounds::new(config.map.width, config.map.height),
        }
    }

    #[test]
    fn test_seek_moves_toward_target() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 400.0);
        player.update(&ctx(&config), 1, Vec2::new(900.0, 500.0), &[], &[]);
        let blob = &player.blobs[0];
        assert!(blob.position.x > 500.0);
        assert_eq!(blob.position.y, 500.0);
    }

    #[test]
    fn test_target_within_one_unit_does_not_move() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 400.0);
        player.update(&ctx(&config), 1, Vec2::new(500.5, 500.0), &[], &[]);
        assert_eq!(player.blobs[0].position, Vec2::new(500.0, 500.0));
    }

    #[test]
    fn test_bigger_blobs_are_slower() {
        let config = Config::default();
        let small = seek_speed(&config.player, 1000.0, 10.0);
        let big = seek_speed(&config.player, 1000.0, 100.0);
        assert_eq!(small, config.player.max_speed);
        assert!(big < small);
        // Near the target the minimum speed applies.
        assert_eq!(seek_speed(&config.player, 2.0, 10.0), config.player.min_speed);
    }

    #[test]
    fn test_positions_stay_in_bounds() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(1.0, 1.0), 400.0);
        for _ in 0..50 {
            player.update(&ctx(&config), 1, Vec2::new(-500.0, -500.0), &[], &[]);
        }
        let p = player.blobs[0].position;
        assert!(p.x >= 0.0 && p.y >= 0.0);
    }

    #[test]
    fn test_collects_orb_inside_radius_once() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 400.0);
        // A second blob on the same spot must not collect the same orb again.
        player.blobs.push(Blob::new(Vec2::new(500.0, 500.0), 400.0));
        player.blobs[1].merge_at = u64::MAX;
        player.blobs[0].merge_at = u64::MAX;

        let orbs = vec![
            Orb::new(10, Vec2::new(502.0, 500.0), 20.0, Color::default()),
            Orb::new(11, Vec2::new(900.0, 900.0), 20.0, Color::default()),
        ];
        let consumed = player.update(&ctx(&config), 1, Vec2::new(500.0, 500.0), &orbs, &[]);
        assert_eq!(consumed.orbs, vec![10]);
    }

    #[test]
    fn test_own_fresh_eject_is_skipped() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 400.0);
        let ejects = vec![
            Eject::new(20, 1, Vec2::new(501.0, 500.0), Vec2::ZERO, 40.0, Color::default()),
            Eject::new(21, 2, Vec2::new(499.0, 500.0), Vec2::ZERO, 40.0, Color::default()),
        ];
        let before = player.total_mass();
        let consumed = player.update(&ctx(&config), 1, Vec2::new(500.0, 500.0), &[], &ejects);
        assert_eq!(consumed.ejects, vec![21]);
        assert!(player.total_mass() > before);
    }

    #[test]
    fn test_split_halves_mass_and_launches_child() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 1000.0);
        let splits = player.split(Vec2::new(900.0, 500.0), 0, &config.player);

        assert_eq!(splits, 1);
        assert_eq!(player.blobs.len(), 2);
        assert_eq!(player.blobs[0].mass(), 500.0);
        assert_eq!(player.blobs[1].mass(), 500.0);
        assert!(player.blobs[1].velocity.x > 0.0);
        assert!((player.blobs[1].velocity.length() - config.player.split_speed).abs() < 1e-3);
        assert!(player.blobs[0].merge_at > 0);
    }

    #[test]
    fn test_split_respects_minimum_and_cap() {
        let mut config = Config::default();
        let mut light = Player::spawn(Vec2::ZERO, config.player.min_split_mass - 1.0);
        assert_eq!(light.split(Vec2::X * 100.0, 0, &config.player), 0);
        assert_eq!(light.blobs.len(), 1);

        config.player.max_blobs = 3;
        let mut player = Player::spawn(Vec2::ZERO, 8000.0);
        player.split(Vec2::X * 100.0, 0, &config.player);
        player.split(Vec2::X * 100.0, 0, &config.player);
        assert_eq!(player.blobs.len(), 3);
        assert_eq!(player.split(Vec2::X * 100.0, 0, &config.player), 0);
        assert_eq!(player.total_mass(), 8000.0);
    }

    #[test]
    fn test_eject_at_minimum_mass() {
        let config = Config::default();
        let bounds = MapBounds::new(config.map.width, config.map.height);
        let min = config.player.min_eject_mass;
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), min);

        let launches = player.eject(Vec2::new(500.0, 900.0), &config, &bounds);

        assert_eq!(launches.len(), 1);
        assert_eq!(player.blobs[0].mass(), min - config.eject.mass_cost);
        assert!((launches[0].velocity.length() - config.eject.speed).abs() < 1e-3);
        assert!(launches[0].velocity.y > 0.0);
    }

    #[test]
    fn test_eject_below_minimum_is_ignored() {
        let config = Config::default();
        let bounds = MapBounds::new(config.map.width, config.map.height);
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), config.player.min_eject_mass - 1.0);
        assert!(player.eject(Vec2::ZERO, &config, &bounds).is_empty());
    }

    #[test]
    fn test_explode_fills_spare_capacity() {
        let mut config = Config::default();
        config.player.max_blobs = 4;
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 4000.0);
        let added = player.explode(0, &ctx(&config));

        assert_eq!(added, 3);
        assert_eq!(player.blobs.len(), 4);
        for blob in &player.blobs {
            assert!((blob.mass() - 1000.0).abs() < 1e-3);
        }
        assert!((player.total_mass() - 4000.0).abs() < 1e-2);
    }

    #[test]
    fn test_explode_without_capacity_is_noop() {
        let mut config = Config::default();
        config.player.max_blobs = 1;
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 4000.0);
        assert_eq!(player.explode(0, &ctx(&config)), 0);
        assert_eq!(player.blobs.len(), 1);
    }

    #[test]
    fn test_siblings_merge_after_cooldown() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 600.0);
        player.blobs.push(Blob::new(Vec2::new(502.0, 500.0), 400.0));

        player.update(&ctx(&config), 1, Vec2::new(500.0, 500.0), &[], &[]);
        assert_eq!(player.blobs.len(), 1);
        assert!(player.total_mass() > 990.0);
    }

    #[test]
    fn test_siblings_pushed_apart_during_cooldown() {
        let config = Config::default();
        let mut player = Player::spawn(Vec2::new(500.0, 500.0), 600.0);
        player.blobs.push(Blob::new(Vec2::new(502.0, 500.0), 400.0));
        player.blobs[0].merge_at = u64::MAX;

        let gap_before = player.blobs[0].position.distance(player.blobs[1].position);
        player.update(&ctx(&config), 1, Vec2::new(501.0, 500.0), &[], &[]);
        assert_eq!(player.blobs.len(), 2);
        let gap_after = player.blobs[0].position.distance(player.blobs[1].position);
        assert!(gap_after > gap_before);
    }

    #[test]
    fn test_decay_multiplier_speeds_decay() {
        let config = Config::default();
        let mut normal = Player::spawn(Vec2::new(500.0, 500.0), 5000.0);
        let mut penalised = normal.clone();
        penalised.decay_multiplier = 6.0;

        let target = Vec2::new(500.0, 500.0);
        normal.update(&ctx(&config), 1, target, &[], &[]);
        penalised.update(&ctx(&config), 1, target, &[], &[]);
        assert!(penalised.total_mass() < normal.total_mass());
        assert!(normal.total_mass() < 5000.0);
    }
}
