//! One fixed simulation step for a room.
//!
//! Order within a step:
//! 1. Latched input and blob movement, player by player in join order
//! 2. Eject and virus motion, then virus feeding
//! 3. Blob vs virus
//! 4. Blob vs blob
//! 5. Elimination sweep

use crate::collision::{feed_viruses, resolve_blob_viruses, resolve_player_pairs};
use crate::config::Config;
use crate::entity::Eject;
use crate::persistence::PlayerHistory;
use crate::world::{MapBounds, World};
use crate::Timestamp;
use protocol::SessionId;
use tracing::debug;

/// Everything a step needs besides the world itself.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Step length in seconds.
    pub dt: f32,
    pub now: Timestamp,
    pub config: &'a Config,
    pub bounds: MapBounds,
}

/// A player that lost its last blob during a step.
#[derive(Debug, Clone)]
pub struct Elimination {
    pub session: SessionId,
    pub kills: u32,
    pub max_mass: f32,
    pub duration_ms: u64,
    pub history: PlayerHistory,
}

/// Advance `world` by `dt` seconds. Returns the players eliminated during
/// the step; they are already removed from the world.
pub fn simulate(dt: f32, world: &mut World, now: Timestamp, config: &Config) -> Vec<Elimination> {
    let ctx = StepContext {
        dt,
        now,
        config,
        bounds: world.bounds,
    };

    update_players(world, &ctx);
    update_projectiles(world, &ctx);

    let viruses_eaten = resolve_blob_viruses(&mut world.players, &mut world.viruses, &ctx);
    let eats = resolve_player_pairs(&mut world.players, config.player.max_mass, &ctx.bounds, now);
    if viruses_eaten > 0 || !eats.is_empty() {
        debug!(
            "Room {}: {} blob eats, {} viruses eaten",
            world.id(),
            eats.len(),
            viruses_eaten
        );
    }

    sweep(world, now)
}

/// Apply latched split/eject requests, then move each player and collect
/// pickups. Collected pickups are removed before the next player moves.
fn update_players(world: &mut World, ctx: &StepContext) {
    let config = ctx.config;
    let World {
        players,
        orbs,
        ejects,
        ids,
        ..
    } = world;

    for state in players.values_mut() {
        if state.split_requested {
            state.player.split(state.aim, ctx.now, &config.player);
        }
        if state.eject_requested {
            for launch in state.player.eject(state.aim, config, &ctx.bounds) {
                ejects.push(Eject::new(
                    ids.next(),
                    state.id,
                    launch.position,
                    launch.velocity,
                    config.eject.mass,
                    state.color,
                ));
            }
        }
        state.split_requested = false;
        state.eject_requested = false;

        state.player.decay_multiplier = state.penalty.multiplier(ctx.now, &config.penalty);
        let consumed = state.player.update(ctx, state.id, state.aim, orbs, ejects);
        if !consumed.is_empty() {
            orbs.retain(|o| !consumed.orbs.contains(&o.id));
            ejects.retain(|e| !consumed.ejects.contains(&e.id));
        }
    }
}

fn update_projectiles(world: &mut World, ctx: &StepContext) {
    let config = ctx.config;
    for eject in &mut world.ejects {
        eject.update(ctx.dt, config.eject.friction, &ctx.bounds);
    }
    for virus in &mut world.viruses {
        virus.update(ctx.dt, config.virus.friction, &ctx.bounds);
    }

    let outcome = feed_viruses(&mut world.viruses, &mut world.ejects, &mut world.ids, &config.virus);
    if outcome.spawned > 0 {
        debug!("Room {}: {} virus clones spawned", world.id(), outcome.spawned);
    }
}

/// Update max mass, then remove every player with no blobs left.
fn sweep(world: &mut World, now: Timestamp) -> Vec<Elimination> {
    for state in world.players.values_mut() {
        state.track_max_mass();
    }

    let dead: Vec<SessionId> = world
        .players
        .values()
        .filter(|s| s.player.is_eliminated())
        .map(|s| s.id)
        .collect();

    let room_id = world.id();
    let mut eliminations = Vec::with_capacity(dead.len());
    for session in dead {
        let Some(mut state) = world.players.remove(&session) else {
            continue;
        };
        state.ended_at.get_or_insert(now);
        world.hand_off_host(session);

        let history = state.history(room_id, now);
        eliminations.push(Elimination {
            session,
            kills: state.kills,
            max_mass: state.max_mass,
            duration_ms: history.duration_ms,
            history,
        });
    }
    eliminations
}
