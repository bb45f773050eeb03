//! Per-session player state.

use crate::entity::Player;
use crate::penalty::PenaltyTracker;
use crate::persistence::PlayerHistory;
use crate::Timestamp;
use glam::Vec2;
use protocol::{Color, RoomId, SessionId};

/// Who owns a player: a registered user, a guest, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<u64>,
    pub guest_id: Option<String>,
}

/// A session's player inside a room.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Session id, also the join-order key.
    pub id: SessionId,
    pub name: String,
    pub identity: Identity,
    pub color: Color,
    pub player: Player,

    /// Latest aim point in world coordinates.
    pub aim: Vec2,
    /// One-shot: split on the next step.
    pub split_requested: bool,
    /// One-shot: eject on the next step.
    pub eject_requested: bool,

    pub kills: u32,
    /// Highest total mass seen at the end of any step.
    pub max_mass: f32,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub penalty: PenaltyTracker,
}

impl PlayerState {
    pub fn new(id: SessionId, name: String, identity: Identity, color: Color, player: Player, now: Timestamp) -> Self {
        let aim = player.center().unwrap_or(Vec2::ZERO);
        let max_mass = player.total_mass();
        Self {
            id,
            name,
            identity,
            color,
            player,
            aim,
            split_requested: false,
            eject_requested: false,
            kills: 0,
            max_mass,
            started_at: now,
            ended_at: None,
            penalty: PenaltyTracker::new(),
        }
    }

    /// Raise `max_mass` to the current total if it is higher.
    pub fn track_max_mass(&mut self) {
        self.max_mass = self.max_mass.max(self.player.total_mass());
    }

    /// Time alive, up to elimination or `now`.
    pub fn duration_ms(&self, now: Timestamp) -> u64 {
        self.ended_at.unwrap_or(now).saturating_sub(self.started_at)
    }

    /// Persistable summary of this player's run.
    pub fn history(&self, room_id: RoomId, now: Timestamp) -> PlayerHistory {
        PlayerHistory {
            room_id,
            duration_ms: self.duration_ms(now),
            max_mass: self.max_mass,
            kills: self.kills,
            name: self.name.clone(),
            user_id: self.identity.user_id,
            guest_id: self.identity.guest_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_uses_end_time() {
        let player = Player::spawn(Vec2::new(10.0, 10.0), 400.0);
        let identity = Identity {
            user_id: None,
            guest_id: Some("guest-1".into()),
        };
        let mut state = PlayerState::new(3, "blob".into(), identity, Color::default(), player, 1_000);
        state.kills = 2;
        state.player.blobs[0].grow(600.0, 50_000.0);
        state.track_max_mass();

        let alive = state.history(9, 4_000);
        assert_eq!(alive.duration_ms, 3_000);
        assert_eq!(alive.max_mass, 1000.0);

        state.ended_at = Some(2_500);
        let dead = state.history(9, 4_000);
        assert_eq!(dead.room_id, 9);
        assert_eq!(dead.duration_ms, 1_500);
        assert_eq!(dead.kills, 2);
        assert_eq!(dead.guest_id.as_deref(), Some("guest-1"));
    }

    #[test]
    fn test_new_aims_at_own_center() {
        let player = Player::spawn(Vec2::new(42.0, 7.0), 400.0);
        let state = PlayerState::new(1, "a".into(), Identity::default(), Color::default(), player, 0);
        assert_eq!(state.aim, Vec2::new(42.0, 7.0));
        assert_eq!(state.max_mass, 400.0);
    }
}
