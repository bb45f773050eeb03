//! Room world state.
//!
//! One [`World`] per room: players in join order, pickups, hazards and the
//! room's lifecycle metadata.

use crate::config::{Config, OrbConfig, VirusConfig};
use crate::entity::{Eject, Orb, Player, Virus};
use crate::server::client::{Identity, PlayerState};
use crate::Timestamp;
use glam::Vec2;
use protocol::{BlobView, Color, EjectView, OrbView, PlayerView, RoomId, RoomSnapshot, SessionId, VirusView};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Map bounds. Coordinates run from the origin to `width`/`height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    pub width: f32,
    pub height: f32,
}

impl MapBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamp a point onto the map.
    #[inline]
    pub fn clamp(&self, position: Vec2) -> Vec2 {
        Vec2::new(position.x.clamp(0.0, self.width), position.y.clamp(0.0, self.height))
    }

    #[inline]
    pub fn contains(&self, position: Vec2) -> bool {
        (0.0..=self.width).contains(&position.x) && (0.0..=self.height).contains(&position.y)
    }

    /// Get a random position on the map.
    #[inline]
    pub fn random_position(&self) -> Vec2 {
        let mut rng = rand::rng();
        Vec2::new(rng.random_range(0.0..self.width), rng.random_range(0.0..self.height))
    }
}

/// Per-room entity id source.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator {
    pub fn starting_at(first: u32) -> Self {
        Self { next: first.max(1) }
    }

    /// Get the next entity id.
    pub fn next(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1; // Skip 0
        }
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Created,
    Started,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Room identity, state and timing.
#[derive(Debug, Clone)]
pub struct RoomMeta {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    /// The always-available lobby: untimed, no orb growth.
    pub is_default: bool,
    pub visibility: Visibility,
    pub host: Option<SessionId>,
    /// Play time once started. `None` means untimed.
    pub duration_ms: Option<u64>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub end_at: Option<Timestamp>,
}

impl RoomMeta {
    /// The public lobby, started immediately and never expiring.
    pub fn lobby(id: RoomId, name: String, now: Timestamp) -> Self {
        Self {
            id,
            name,
            status: RoomStatus::Started,
            is_default: true,
            visibility: Visibility::Public,
            host: None,
            duration_ms: None,
            created_at: now,
            started_at: Some(now),
            end_at: None,
        }
    }

    /// A hosted, timed room waiting to be started.
    pub fn hosted(
        id: RoomId,
        name: String,
        host: SessionId,
        duration_ms: u64,
        visibility: Visibility,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            status: RoomStatus::Created,
            is_default: false,
            visibility,
            host: Some(host),
            duration_ms: Some(duration_ms),
            created_at: now,
            started_at: None,
            end_at: None,
        }
    }
}

/// The simulated contents of one room.
#[derive(Debug)]
pub struct World {
    pub meta: RoomMeta,
    pub bounds: MapBounds,
    /// Live players keyed by session id. Session ids are handed out in
    /// increasing order, so iteration order is join order.
    pub players: BTreeMap<SessionId, PlayerState>,
    /// Connected sessions, alive or not.
    pub members: BTreeSet<SessionId>,
    pub orbs: Vec<Orb>,
    pub viruses: Vec<Virus>,
    pub ejects: Vec<Eject>,
    pub ids: IdAllocator,
    last_orb_growth: Timestamp,
}

impl World {
    pub fn new(meta: RoomMeta, config: &Config) -> Self {
        let last_orb_growth = meta.created_at;
        Self {
            meta,
            bounds: MapBounds::new(config.map.width, config.map.height),
            players: BTreeMap::new(),
            members: BTreeSet::new(),
            orbs: Vec::with_capacity(config.orb.max_count),
            viruses: Vec::with_capacity(config.virus.max_count),
            ejects: Vec::new(),
            ids: IdAllocator::default(),
            last_orb_growth,
        }
    }

    #[inline]
    pub fn id(&self) -> RoomId {
        self.meta.id
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.meta.status == RoomStatus::Started
    }

    /// Whether a timed room has run out of time.
    #[inline]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.meta.end_at.is_some_and(|end_at| now >= end_at)
    }

    /// Top orbs up to the cap. Returns how many were spawned.
    pub fn ensure_orbs(&mut self, cfg: &OrbConfig) -> usize {
        let missing = cfg.max_count.saturating_sub(self.orbs.len());
        for _ in 0..missing {
            let id = self.ids.next();
            let position = self.bounds.random_position();
            self.orbs.push(Orb::new(id, position, cfg.mass, Self::random_color()));
        }
        missing
    }

    /// Top viruses up to the cap. Returns how many were spawned.
    pub fn ensure_viruses(&mut self, cfg: &VirusConfig) -> usize {
        let missing = cfg.max_count.saturating_sub(self.viruses.len());
        for _ in 0..missing {
            let id = self.ids.next();
            let position = self.bounds.random_position();
            self.viruses.push(Virus::new(id, position, cfg.base_mass));
        }
        missing
    }

    /// Run the orb growth timer. Orbs in hosted rooms gain mass once per
    /// interval, up to the orb cap. Returns true when a growth pass ran.
    pub fn grow_orbs(&mut self, config: &Config, now: Timestamp) -> bool {
        if self.meta.is_default {
            return false;
        }
        let interval = config.room.orb_growth_interval_ms;
        if now.saturating_sub(self.last_orb_growth) < interval {
            return false;
        }
        self.last_orb_growth = now;
        for orb in &mut self.orbs {
            orb.grow(config.orb.growth_step, config.orb.max_mass);
        }
        true
    }

    /// Spawn a fresh player for `session` at a random position.
    pub fn spawn_player(
        &mut self,
        session: SessionId,
        name: String,
        identity: Identity,
        config: &Config,
        now: Timestamp,
    ) -> &PlayerState {
        let player = Player::spawn(self.bounds.random_position(), config.player.start_mass);
        let state = PlayerState::new(session, name, identity, Self::random_color(), player, now);
        self.members.insert(session);
        self.players.insert(session, state);
        &self.players[&session]
    }

    /// Drop a session from the room entirely. Returns its player if it was
    /// still alive.
    pub fn remove_member(&mut self, session: SessionId) -> Option<PlayerState> {
        self.members.remove(&session);
        self.hand_off_host(session);
        self.players.remove(&session)
    }

    /// If `from` hosts the room, pass the host role to the lowest-id other
    /// member, or to nobody.
    pub fn hand_off_host(&mut self, from: SessionId) {
        if self.meta.host == Some(from) {
            self.meta.host = self.members.iter().copied().find(|&id| id != from);
        }
    }

    /// Build the per-frame snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        let players = self
            .players
            .iter()
            .map(|(&id, state)| {
                let blobs = state
                    .player
                    .blobs
                    .iter()
                    .map(|b| BlobView {
                        x: b.position.x,
                        y: b.position.y,
                        mass: b.mass(),
                        radius: b.radius(),
                    })
                    .collect();
                let view = PlayerView {
                    blobs,
                    name: state.name.clone(),
                    color: state.color,
                };
                (id, view)
            })
            .collect();

        RoomSnapshot {
            players,
            orbs: self
                .orbs
                .iter()
                .map(|o| OrbView {
                    id: o.id,
                    x: o.position.x,
                    y: o.position.y,
                    mass: o.mass,
                    color: o.color,
                })
                .collect(),
            ejects: self
                .ejects
                .iter()
                .map(|e| EjectView {
                    id: e.id,
                    x: e.position.x,
                    y: e.position.y,
                    mass: e.mass,
                    color: e.color,
                })
                .collect(),
            viruses: self
                .viruses
                .iter()
                .map(|v| VirusView {
                    id: v.id,
                    x: v.position.x,
                    y: v.position.y,
                    mass: v.mass,
                })
                .collect(),
        }
    }

    /// Generate a random color.
    #[inline]
    pub fn random_color() -> Color {
        let mut rng = rand::rng();
        Color::new(
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted_world(config: &Config) -> World {
        World::new(
            RoomMeta::hosted(2, "arena".into(), 1, 60_000, Visibility::Public, 0),
            config,
        )
    }

    #[test]
    fn test_ensure_orbs_is_idempotent() {
        let config = Config::default();
        let mut world = hosted_world(&config);

        assert_eq!(world.ensure_orbs(&config.orb), config.orb.max_count);
        assert_eq!(world.ensure_orbs(&config.orb), 0);
        assert_eq!(world.orbs.len(), config.orb.max_count);
    }

    #[test]
    fn test_ensure_orbs_tops_up_partial_room() {
        let config = Config::default();
        let mut world = hosted_world(&config);
        world.ensure_orbs(&config.orb);
        world.orbs.truncate(10);

        assert_eq!(world.ensure_orbs(&config.orb), config.orb.max_count - 10);
        assert_eq!(world.orbs.len(), config.orb.max_count);
        for orb in &world.orbs {
            assert!(world.bounds.contains(orb.position));
        }
    }

    #[test]
    fn test_ensure_viruses_respects_cap() {
        let config = Config::default();
        let mut world = hosted_world(&config);
        world.ensure_viruses(&config.virus);
        world.viruses.pop();
        assert_eq!(world.ensure_viruses(&config.virus), 1);
        assert_eq!(world.viruses.len(), config.virus.max_count);
    }

    #[test]
    fn test_orb_growth_only_in_hosted_rooms() {
        let config = Config::default();
        let interval = config.room.orb_growth_interval_ms;

        let mut lobby = World::new(RoomMeta::lobby(1, "Lobby".into(), 0), &config);
        lobby.ensure_orbs(&config.orb);
        assert!(!lobby.grow_orbs(&config, interval));
        assert_eq!(lobby.orbs[0].mass, config.orb.mass);

        let mut world = hosted_world(&config);
        world.ensure_orbs(&config.orb);
        assert!(!world.grow_orbs(&config, interval - 1));
        assert!(world.grow_orbs(&config, interval));
        assert_eq!(world.orbs[0].mass, config.orb.mass + config.orb.growth_step);
        // Timer restarted.
        assert!(!world.grow_orbs(&config, interval + 1));
    }

    #[test]
    fn test_orb_growth_stops_at_cap() {
        let config = Config::default();
        let mut world = hosted_world(&config);
        world.ensure_orbs(&config.orb);
        let interval = config.room.orb_growth_interval_ms;
        for n in 1..=100 {
            world.grow_orbs(&config, n * interval);
        }
        assert!(world.orbs.iter().all(|o| o.mass == config.orb.max_mass));
    }

    #[test]
    fn test_host_passes_to_lowest_remaining_member() {
        let config = Config::default();
        let mut world = hosted_world(&config);
        for id in [1, 5, 3] {
            world.spawn_player(id, format!("p{id}"), Identity::default(), &config, 0);
        }

        world.remove_member(1);
        assert_eq!(world.meta.host, Some(3));

        world.remove_member(5);
        assert_eq!(world.meta.host, Some(3));

        world.remove_member(3);
        assert_eq!(world.meta.host, None);
        assert!(world.members.is_empty());
    }

    #[test]
    fn test_snapshot_lists_players_in_join_order() {
        let config = Config::default();
        let mut world = hosted_world(&config);
        world.spawn_player(4, "late".into(), Identity::default(), &config, 0);
        world.spawn_player(2, "early".into(), Identity::default(), &config, 0);
        world.ensure_viruses(&config.virus);

        let snapshot = world.snapshot();
        let ids: Vec<_> = snapshot.players.keys().copied().collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(snapshot.players[&2].blobs.len(), 1);
        assert_eq!(snapshot.players[&2].blobs[0].mass, config.player.start_mass);
        assert_eq!(snapshot.viruses.len(), config.virus.max_count);
    }

    #[test]
    fn test_expiry() {
        let mut meta = RoomMeta::hosted(2, "a".into(), 1, 1000, Visibility::Private, 0);
        assert!(!World::new(meta.clone(), &Config::default()).is_expired(u64::MAX));
        meta.end_at = Some(500);
        let world = World::new(meta, &Config::default());
        assert!(!world.is_expired(499));
        assert!(world.is_expired(500));
    }

    #[test]
    fn test_ids_skip_zero() {
        let mut ids = IdAllocator::starting_at(u32::MAX);
        assert_eq!(ids.next(), u32::MAX);
        assert_eq!(ids.next(), 1);
    }
}
