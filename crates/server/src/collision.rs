//! Collision detection and resolution.
//!
//! This module handles:
//! - Eating between blobs of different players, with push-apart otherwise
//! - Blobs eating viruses (and exploding)
//! - Viruses absorbing ejected mass and cloning
//!
//! Everything here is brute-force pairwise. Removals are marked in bitsets
//! and compacted once a pass is done, so indices stay stable while iterating.

use crate::config::VirusConfig;
use crate::entity::{Blob, Eject, Virus};
use crate::server::client::PlayerState;
use crate::simulation::StepContext;
use crate::world::{IdAllocator, MapBounds};
use crate::Timestamp;
use fixedbitset::FixedBitSet;
use glam::Vec2;
use protocol::SessionId;
use std::collections::BTreeMap;
use tracing::debug;

/// Attacker with exactly one blob must be this much heavier to eat.
pub const EAT_FACTOR_SINGLE: f32 = 1.25;
/// Attacker with several blobs must be this much heavier to eat.
pub const EAT_FACTOR_SPLIT: f32 = 1.33;

/// Geometry of two overlapping circles.
#[derive(Debug, Clone, Copy)]
pub struct Overlap {
    /// Vector from the first centre to the second.
    pub delta: Vec2,
    /// Centre distance.
    pub distance: f32,
    /// Sum of radii minus distance (always > 0).
    pub depth: f32,
}

/// Returns the overlap of two circles, or `None` if they are at least
/// touching distance apart.
#[inline]
pub fn overlap(a_pos: Vec2, a_radius: f32, b_pos: Vec2, b_radius: f32) -> Option<Overlap> {
    let delta = b_pos - a_pos;
    let distance = delta.length();
    let reach = a_radius + b_radius;
    if distance >= reach {
        return None;
    }
    Some(Overlap {
        delta,
        distance,
        depth: reach - distance,
    })
}

/// Required mass ratio for an attacker owning `attacker_blobs` blobs.
#[inline]
pub fn eat_factor(attacker_blobs: usize) -> f32 {
    if attacker_blobs == 1 {
        EAT_FACTOR_SINGLE
    } else {
        EAT_FACTOR_SPLIT
    }
}

/// Positional correction: separate two overlapping blobs along the centre
/// line. Each moves in proportion to the other's mass, so the heavier blob
/// moves less.
pub fn push_apart(a: &mut Blob, b: &mut Blob, hit: &Overlap, bounds: &MapBounds) {
    let normal = if hit.distance > f32::EPSILON {
        hit.delta / hit.distance
    } else {
        Vec2::X
    };
    let total = a.mass() + b.mass();
    a.position -= normal * hit.depth * (b.mass() / total);
    b.position += normal * hit.depth * (a.mass() / total);
    a.position = bounds.clamp(a.position);
    b.position = bounds.clamp(b.position);
}

/// Drop every element whose index is marked.
pub fn compact<T>(items: &mut Vec<T>, marks: &FixedBitSet) {
    if marks.count_ones(..) == 0 {
        return;
    }
    let mut index = 0;
    items.retain(|_| {
        let keep = !marks.contains(index);
        index += 1;
        keep
    });
}

/// One blob eaten by a rival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EatEvent {
    pub eater: SessionId,
    pub victim: SessionId,
    pub mass: f32,
}

/// Resolve every unordered player pair. Pairs are visited in join order
/// (ascending session id), and within a pair the earlier joiner is checked
/// as attacker first, which decides mutual-eat ties.
pub fn resolve_player_pairs(
    players: &mut BTreeMap<SessionId, PlayerState>,
    cap: f32,
    bounds: &MapBounds,
    now: Timestamp,
) -> Vec<EatEvent> {
    let mut events = Vec::new();
    let mut states: Vec<&mut PlayerState> = players.values_mut().collect();

    for i in 0..states.len() {
        for j in (i + 1)..states.len() {
            let (head, tail) = states.split_at_mut(j);
            let (a, b) = (&mut *head[i], &mut *tail[0]);
            if a.player.is_eliminated() || b.player.is_eliminated() {
                continue;
            }
            resolve_pair(a, b, cap, bounds, now, &mut events);
        }
    }

    events
}

fn resolve_pair(
    a: &mut PlayerState,
    b: &mut PlayerState,
    cap: f32,
    bounds: &MapBounds,
    now: Timestamp,
    events: &mut Vec<EatEvent>,
) {
    let mut a_gone = FixedBitSet::with_capacity(a.player.blobs.len());
    let mut b_gone = FixedBitSet::with_capacity(b.player.blobs.len());
    let mut a_live = a.player.blobs.len();
    let mut b_live = b.player.blobs.len();

    'pair: for ai in 0..a.player.blobs.len() {
        for bi in 0..b.player.blobs.len() {
            if b_gone.contains(bi) {
                continue;
            }
            let ab = &mut a.player.blobs[ai];
            let bb = &mut b.player.blobs[bi];
            let Some(hit) = overlap(ab.position, ab.radius(), bb.position, bb.radius()) else {
                continue;
            };

            if ab.mass() >= bb.mass() * eat_factor(a_live) {
                let mass = bb.mass();
                ab.grow(mass, cap);
                b_gone.insert(bi);
                b_live -= 1;
                a.kills += 1;
                events.push(EatEvent { eater: a.id, victim: b.id, mass });
                if b_live == 0 {
                    b.ended_at = Some(now);
                    break 'pair;
                }
            } else if bb.mass() >= ab.mass() * eat_factor(b_live) {
                let mass = ab.mass();
                bb.grow(mass, cap);
                a_gone.insert(ai);
                a_live -= 1;
                b.kills += 1;
                events.push(EatEvent { eater: b.id, victim: a.id, mass });
                if a_live == 0 {
                    a.ended_at = Some(now);
                    break 'pair;
                }
                // This attacker blob is gone; move on to the next one.
                break;
            } else {
                push_apart(ab, bb, &hit, bounds);
            }
        }
    }

    compact(&mut a.player.blobs, &a_gone);
    compact(&mut b.player.blobs, &b_gone);
}

/// Blobs at or above the eat threshold consume a virus whose centre they
/// cover. Only the first hit per player per tick is processed. Returns the
/// number of viruses eaten.
pub fn resolve_blob_viruses(
    players: &mut BTreeMap<SessionId, PlayerState>,
    viruses: &mut Vec<Virus>,
    ctx: &StepContext,
) -> usize {
    let min_mass = ctx.config.virus.eat_min_mass;
    let cap = ctx.config.player.max_mass;
    let mut eaten = 0;

    for state in players.values_mut() {
        if viruses.is_empty() {
            break;
        }

        let hit = state
            .player
            .blobs
            .iter()
            .enumerate()
            .filter(|(_, blob)| blob.mass() >= min_mass)
            .find_map(|(blob_index, blob)| {
                let radius = blob.radius();
                viruses
                    .iter()
                    .position(|v| blob.position.distance_squared(v.position) < radius * radius)
                    .map(|virus_index| (blob_index, virus_index))
            });
        let Some((blob_index, virus_index)) = hit else {
            continue;
        };

        let virus = viruses.remove(virus_index);
        state.player.blobs[blob_index].grow(virus.mass, cap);
        state.penalty.record(ctx.now);
        state.player.decay_multiplier = state.penalty.multiplier(ctx.now, &ctx.config.penalty);

        let pieces = if state.player.blobs.len() < ctx.config.player.max_blobs {
            state.player.explode(blob_index, ctx)
        } else {
            0
        };
        eaten += 1;

        debug!(
            "Player {} ate virus {} (+{} blobs, decay x{:.1})",
            state.id, virus.id, pieces, state.player.decay_multiplier
        );
    }

    eaten
}

/// Result of one feeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    pub absorbed: usize,
    pub spawned: usize,
}

/// Viruses absorb ejects whose centre lies inside them. Each eject feeds at
/// most one virus (the first match). A virus that reaches the feed threshold
/// resets and, while under the virus cap, spawns a clone.
pub fn feed_viruses(
    viruses: &mut Vec<Virus>,
    ejects: &mut Vec<Eject>,
    ids: &mut IdAllocator,
    cfg: &VirusConfig,
) -> FeedOutcome {
    let existing = viruses.len();
    let mut absorbed = FixedBitSet::with_capacity(ejects.len());
    let mut clones = Vec::new();

    for (eject_index, eject) in ejects.iter().enumerate() {
        for virus in viruses.iter_mut() {
            let radius = virus.radius();
            if virus.position.distance_squared(eject.position) >= radius * radius {
                continue;
            }

            absorbed.insert(eject_index);
            if virus.feed(eject.mass, eject.position, eject.velocity, cfg.max_feed) {
                let has_room = existing + clones.len() < cfg.max_count;
                let clone = virus.split_off(ids.next(), cfg.base_mass, cfg.shoot_speed);
                if has_room {
                    clones.push(clone);
                }
            }
            break;
        }
    }

    compact(ejects, &absorbed);
    let outcome = FeedOutcome {
        absorbed: absorbed.count_ones(..),
        spawned: clones.len(),
    };
    viruses.extend(clones);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::Player;
    use crate::server::client::Identity;
    use protocol::Color;

    fn bounds() -> MapBounds {
        MapBounds::new(3000.0, 3000.0)
    }

    fn state(id: SessionId, blobs: Vec<Blob>) -> PlayerState {
        let mut player = Player::spawn(Vec2::ZERO, 1.0);
        player.blobs = blobs;
        PlayerState::new(id, format!("p{id}"), Identity::default(), Color::default(), player, 0)
    }

    fn players(states: Vec<PlayerState>) -> BTreeMap<SessionId, PlayerState> {
        states.into_iter().map(|s| (s.id, s)).collect()
    }

    #[test]
    fn test_overlap_detection() {
        assert!(overlap(Vec2::ZERO, 50.0, Vec2::new(30.0, 0.0), 20.0).is_some());
        assert!(overlap(Vec2::ZERO, 10.0, Vec2::new(100.0, 0.0), 10.0).is_none());
        // Exactly touching does not count.
        assert!(overlap(Vec2::ZERO, 10.0, Vec2::new(20.0, 0.0), 10.0).is_none());
    }

    #[test]
    fn test_single_blob_eats_at_125_percent() {
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 1000.0)]),
            state(2, vec![Blob::new(center, 700.0)]),
        ]);

        let events = resolve_player_pairs(&mut map, 50_000.0, &bounds(), 42);

        assert_eq!(events, vec![EatEvent { eater: 1, victim: 2, mass: 700.0 }]);
        assert_eq!(map[&1].player.blobs[0].mass(), 1700.0);
        assert_eq!(map[&1].kills, 1);
        assert!(map[&2].player.is_eliminated());
        assert_eq!(map[&2].ended_at, Some(42));
    }

    #[test]
    fn test_eat_mass_is_capped() {
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 1000.0)]),
            state(2, vec![Blob::new(center, 700.0)]),
        ]);
        resolve_player_pairs(&mut map, 1200.0, &bounds(), 0);
        assert_eq!(map[&1].player.blobs[0].mass(), 1200.0);
    }

    #[test]
    fn test_near_equal_blobs_push_apart_weighted() {
        let a_pos = Vec2::new(500.0, 500.0);
        let b_pos = Vec2::new(520.0, 500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(a_pos, 1000.0)]),
            state(2, vec![Blob::new(b_pos, 900.0)]),
        ]);
        let hit = overlap(
            a_pos,
            map[&1].player.blobs[0].radius(),
            b_pos,
            map[&2].player.blobs[0].radius(),
        )
        .unwrap();

        let events = resolve_player_pairs(&mut map, 50_000.0, &bounds(), 0);
        assert!(events.is_empty());

        let a_moved = a_pos.x - map[&1].player.blobs[0].position.x;
        let b_moved = map[&2].player.blobs[0].position.x - b_pos.x;
        assert!((a_moved - hit.depth * 900.0 / 1900.0).abs() < 1e-3);
        assert!((b_moved - hit.depth * 1000.0 / 1900.0).abs() < 1e-3);
        assert_eq!(map[&1].player.blobs[0].mass(), 1000.0);
        assert_eq!(map[&2].player.blobs[0].mass(), 900.0);
    }

    #[test]
    fn test_split_attacker_needs_133_percent() {
        let center = Vec2::new(500.0, 500.0);
        let far = Vec2::new(2000.0, 2000.0);
        // 1300 >= 1000 * 1.25 but < 1000 * 1.33.
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 1300.0), Blob::new(far, 200.0)]),
            state(2, vec![Blob::new(center, 1000.0)]),
        ]);
        let events = resolve_player_pairs(&mut map, 50_000.0, &bounds(), 0);
        assert!(events.is_empty());
        assert_eq!(map[&2].player.blobs.len(), 1);
    }

    #[test]
    fn test_later_joiner_can_eat_earlier() {
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 700.0)]),
            state(2, vec![Blob::new(center, 1000.0)]),
        ]);
        let events = resolve_player_pairs(&mut map, 50_000.0, &bounds(), 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].eater, 2);
        assert_eq!(map[&2].kills, 1);
        assert!(map[&1].player.is_eliminated());
    }

    #[test]
    fn test_victim_blob_credited_once() {
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 2000.0)]),
            state(2, vec![Blob::new(center, 2000.0)]),
            state(3, vec![Blob::new(center, 500.0)]),
        ]);

        let events = resolve_player_pairs(&mut map, 50_000.0, &bounds(), 0);

        let victim_events: Vec<_> = events.iter().filter(|e| e.victim == 3).collect();
        assert_eq!(victim_events.len(), 1);
        let total: f32 = map.values().map(|s| s.player.total_mass()).sum();
        assert!((total - 4500.0).abs() < 1e-2);
    }

    #[test]
    fn test_multi_blob_victim_loses_only_overlapping_blobs() {
        let center = Vec2::new(500.0, 500.0);
        let far = Vec2::new(1500.0, 1500.0);
        let mut map = players(vec![
            state(1, vec![Blob::new(center, 3000.0)]),
            state(2, vec![Blob::new(center, 300.0), Blob::new(far, 300.0)]),
        ]);
        resolve_player_pairs(&mut map, 50_000.0, &bounds(), 0);
        assert_eq!(map[&2].player.blobs.len(), 1);
        assert_eq!(map[&2].player.blobs[0].position, far);
        assert!(!map[&2].player.is_eliminated());
        assert_eq!(map[&2].ended_at, None);
    }

    fn ctx(config: &Config) -> StepContext<'_> {
        StepContext {
            dt: 0.02,
            now: 5_000,
            config,
            bounds: bounds(),
        }
    }

    #[test]
    fn test_big_blob_eats_virus_and_explodes() {
        let config = Config::default();
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![state(1, vec![Blob::new(center, 4000.0)])]);
        let mut viruses = vec![
            Virus::new(9, center, config.virus.base_mass),
            Virus::new(10, center, config.virus.base_mass),
        ];

        let eaten = resolve_blob_viruses(&mut map, &mut viruses, &ctx(&config));

        assert_eq!(eaten, 1);
        // Only the first virus is processed this tick.
        assert_eq!(viruses.len(), 1);
        assert_eq!(viruses[0].id, 10);
        let player = &map[&1].player;
        assert!(player.blobs.len() > 1);
        assert!((player.total_mass() - (4000.0 + config.virus.base_mass)).abs() < 0.5);
    }

    #[test]
    fn test_small_blob_ignores_virus() {
        let config = Config::default();
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![state(1, vec![Blob::new(center, config.virus.eat_min_mass - 1.0)])]);
        let mut viruses = vec![Virus::new(9, center, config.virus.base_mass)];
        assert_eq!(resolve_blob_viruses(&mut map, &mut viruses, &ctx(&config)), 0);
        assert_eq!(viruses.len(), 1);
    }

    #[test]
    fn test_repeated_virus_eats_raise_decay() {
        let mut config = Config::default();
        // No room to explode, so the blob stays big enough to keep eating.
        config.player.max_blobs = 1;
        let center = Vec2::new(500.0, 500.0);
        let mut map = players(vec![state(1, vec![Blob::new(center, 4000.0)])]);

        for _ in 0..config.penalty.threshold {
            let mut viruses = vec![Virus::new(9, map[&1].player.blobs[0].position, config.virus.base_mass)];
            resolve_blob_viruses(&mut map, &mut viruses, &ctx(&config));
        }
        assert_eq!(map[&1].player.blobs.len(), 1);
        assert_eq!(map[&1].player.decay_multiplier, 1.0 + config.penalty.step);
    }

    #[test]
    fn test_feeding_to_threshold_clones_once() {
        let cfg = VirusConfig::default();
        let origin = Vec2::new(1000.0, 1000.0);
        let mut viruses = vec![Virus::new(1, origin, cfg.base_mass)];
        let mut ids = IdAllocator::starting_at(100);

        let mut spawned = 0;
        for n in 0..cfg.max_feed {
            let mut ejects = vec![Eject::new(
                50 + n,
                7,
                origin - Vec2::new(5.0, 0.0),
                Vec2::new(300.0, 0.0),
                40.0,
                Color::default(),
            )];
            let outcome = feed_viruses(&mut viruses, &mut ejects, &mut ids, &cfg);
            assert_eq!(outcome.absorbed, 1);
            assert!(ejects.is_empty());
            spawned += outcome.spawned;
        }

        assert_eq!(spawned, 1);
        assert_eq!(viruses.len(), 2);
        assert_eq!(viruses[0].fed_count, 0);
        assert_eq!(viruses[0].mass, cfg.base_mass);
        assert_eq!(viruses[1].mass, cfg.base_mass);
        assert!(viruses[1].position.distance(origin) < 1.0);
        // Fed from the left, so the clone leaves to the right.
        assert!(viruses[1].velocity.x > 0.0);
    }

    #[test]
    fn test_eject_feeds_only_first_virus() {
        let cfg = VirusConfig::default();
        let origin = Vec2::new(1000.0, 1000.0);
        let mut viruses = vec![Virus::new(1, origin, cfg.base_mass), Virus::new(2, origin, cfg.base_mass)];
        let mut ejects = vec![Eject::new(5, 7, origin, Vec2::X, 40.0, Color::default())];
        let mut ids = IdAllocator::starting_at(100);

        feed_viruses(&mut viruses, &mut ejects, &mut ids, &cfg);

        assert_eq!(viruses[0].fed_count, 1);
        assert_eq!(viruses[1].fed_count, 0);
    }

    #[test]
    fn test_virus_cap_blocks_clone() {
        let mut cfg = VirusConfig::default();
        cfg.max_count = 1;
        cfg.max_feed = 1;
        let origin = Vec2::new(1000.0, 1000.0);
        let mut viruses = vec![Virus::new(1, origin, cfg.base_mass)];
        let mut ejects = vec![Eject::new(5, 7, origin, Vec2::X, 40.0, Color::default())];
        let mut ids = IdAllocator::starting_at(100);

        let outcome = feed_viruses(&mut viruses, &mut ejects, &mut ids, &cfg);

        assert_eq!(outcome.spawned, 0);
        assert_eq!(viruses.len(), 1);
        assert_eq!(viruses[0].fed_count, 0);
    }

    #[test]
    fn test_compact_removes_marked() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        let mut marks = FixedBitSet::with_capacity(4);
        marks.insert(1);
        marks.insert(3);
        compact(&mut items, &marks);
        assert_eq!(items, vec!['a', 'c']);
    }
}
