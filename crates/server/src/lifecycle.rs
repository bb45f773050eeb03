//! Room lifecycle: Created → Started → Ended → removed.

use crate::persistence::FinalizeRoom;
use crate::registry::RoomRegistry;
use crate::world::{RoomStatus, World};
use crate::Timestamp;
use protocol::RoomId;
use tracing::info;

/// A started room ends when its time is up or nobody is left alive in it.
pub fn should_end(world: &World, now: Timestamp) -> bool {
    world.is_started() && (world.is_expired(now) || world.players.is_empty())
}

/// Remove a room from the registry and build its finalization job from the
/// players still alive.
pub fn end_room(registry: &mut RoomRegistry, id: RoomId, now: Timestamp) -> Option<FinalizeRoom> {
    let mut world = registry.remove_room(id)?;
    world.meta.status = RoomStatus::Ended;

    let histories = world
        .players
        .values_mut()
        .map(|state| {
            state.ended_at.get_or_insert(now);
            (state.id, state.history(id, now))
        })
        .collect::<Vec<_>>();
    let members = world.members.iter().copied().collect();

    info!(
        "Room {} ({}) ended with {} survivors",
        id,
        world.meta.name,
        histories.len()
    );

    Some(FinalizeRoom {
        room_id: id,
        histories,
        members,
    })
}

/// End every room that is due. Returns their finalization jobs.
pub fn end_due_rooms(registry: &mut RoomRegistry, now: Timestamp) -> Vec<FinalizeRoom> {
    let due: Vec<RoomId> = registry
        .room_ids()
        .into_iter()
        .filter(|&id| registry.room(id).is_some_and(|w| should_end(w, now)))
        .collect();

    due.into_iter()
        .filter_map(|id| end_room(registry, id, now))
        .collect()
}
