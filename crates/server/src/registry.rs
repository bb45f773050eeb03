//! Room registry.
//!
//! Owns every live room plus the session → room membership map. The
//! transport applies validated client messages here between ticks; the game
//! loop drives the rooms.

use crate::config::Config;
use crate::server::client::{Identity, PlayerState};
use crate::world::{RoomMeta, RoomStatus, Visibility, World};
use crate::Timestamp;
use glam::Vec2;
use protocol::{ClientMessage, RoomId, ServerMessage, SessionId};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),
    #[error("session {0} is not in a room")]
    NotInRoom(SessionId),
    #[error("session {session} does not host room {room}")]
    NotHost { session: SessionId, room: RoomId },
    #[error("room {0} was already started")]
    AlreadyStarted(RoomId),
    #[error("room {0} has ended")]
    RoomEnded(RoomId),
    #[error("session {session} is already playing in room {room}")]
    AlreadyPlaying { session: SessionId, room: RoomId },
}

/// Name and identity a session last joined with.
#[derive(Debug, Clone)]
struct Profile {
    name: String,
    identity: Identity,
}

#[derive(Debug)]
pub struct RoomRegistry {
    config: Config,
    rooms: BTreeMap<RoomId, World>,
    sessions: HashMap<SessionId, RoomId>,
    profiles: HashMap<SessionId, Profile>,
    next_session: SessionId,
    next_room: RoomId,
    default_room: Option<RoomId>,
}

impl RoomRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rooms: BTreeMap::new(),
            sessions: HashMap::new(),
            profiles: HashMap::new(),
            next_session: 1,
            next_room: 1,
            default_room: None,
        }
    }

    /// Register a new connection. Session ids only ever increase, which is
    /// what makes player maps iterate in join order.
    pub fn open_session(&mut self) -> SessionId {
        let id = self.next_session;
        self.next_session += 1;
        id
    }

    /// Forget a connection, leaving its room if any.
    pub fn close_session(&mut self, session: SessionId) {
        self.leave(session);
        self.profiles.remove(&session);
    }

    #[inline]
    pub fn room_of(&self, session: SessionId) -> Option<RoomId> {
        self.sessions.get(&session).copied()
    }

    #[inline]
    pub fn room(&self, id: RoomId) -> Option<&World> {
        self.rooms.get(&id)
    }

    #[inline]
    pub fn room_mut(&mut self, id: RoomId) -> Option<&mut World> {
        self.rooms.get_mut(&id)
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    pub fn rooms_mut(&mut self) -> impl Iterator<Item = &mut World> {
        self.rooms.values_mut()
    }

    #[inline]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Apply one client message. Returns a reply for the sender, if any.
    pub fn apply(
        &mut self,
        session: SessionId,
        message: ClientMessage,
        now: Timestamp,
    ) -> Result<Option<ServerMessage>, RegistryError> {
        match message {
            ClientMessage::Join {
                name,
                room,
                user_id,
                guest_id,
            } => {
                let identity = Identity { user_id, guest_id };
                self.join(session, name, identity, room, now).map(Some)
            }
            ClientMessage::Input { aim_x, aim_y } => {
                self.with_player(session, |state| state.aim = Vec2::new(aim_x, aim_y))?;
                Ok(None)
            }
            ClientMessage::Split => {
                self.with_player(session, |state| state.split_requested = true)?;
                Ok(None)
            }
            ClientMessage::Eject => {
                self.with_player(session, |state| state.eject_requested = true)?;
                Ok(None)
            }
            ClientMessage::Disconnect => {
                self.leave(session);
                Ok(None)
            }
            ClientMessage::CreateRoom {
                name,
                duration_secs,
                private,
            } => {
                let visibility = if private { Visibility::Private } else { Visibility::Public };
                self.create_room(session, name, duration_secs, visibility, now).map(Some)
            }
            ClientMessage::StartRoom => {
                self.start_room(session, now)?;
                Ok(None)
            }
        }
    }

    /// Latch input into the session's live player. Input from a dead player
    /// is dropped.
    fn with_player(
        &mut self,
        session: SessionId,
        f: impl FnOnce(&mut PlayerState),
    ) -> Result<(), RegistryError> {
        let room_id = self.room_of(session).ok_or(RegistryError::NotInRoom(session))?;
        let world = self.rooms.get_mut(&room_id).ok_or(RegistryError::UnknownRoom(room_id))?;
        if let Some(state) = world.players.get_mut(&session) {
            f(state);
        }
        Ok(())
    }

    /// Spawn `session` into a room: the named one, or the default room
    /// (created on demand). Joining again respawns an eliminated player.
    pub fn join(
        &mut self,
        session: SessionId,
        name: String,
        identity: Identity,
        room: Option<RoomId>,
        now: Timestamp,
    ) -> Result<ServerMessage, RegistryError> {
        if session == 0 || session >= self.next_session {
            return Err(RegistryError::UnknownSession(session));
        }

        let target = match room {
            Some(id) => {
                let world = self.rooms.get(&id).ok_or(RegistryError::UnknownRoom(id))?;
                if world.meta.status == RoomStatus::Ended {
                    return Err(RegistryError::RoomEnded(id));
                }
                id
            }
            None => self.ensure_default_room(now),
        };

        match self.room_of(session) {
            Some(current) if current != target => self.leave(session),
            Some(current) if self.rooms.get(&current).is_some_and(|w| w.players.contains_key(&session)) => {
                return Err(RegistryError::AlreadyPlaying { session, room: current });
            }
            _ => {}
        }

        self.profiles.insert(
            session,
            Profile {
                name: name.clone(),
                identity: identity.clone(),
            },
        );
        self.sessions.insert(session, target);

        let config = &self.config;
        let world = self.rooms.get_mut(&target).ok_or(RegistryError::UnknownRoom(target))?;
        world.spawn_player(session, name, identity, config, now);
        info!("Session {} joined room {} ({} players)", session, target, world.players.len());

        Ok(ServerMessage::Joined {
            session_id: session,
            room_id: target,
            host: world.meta.host == Some(session),
        })
    }

    /// The lobby id, creating the lobby if it does not exist.
    pub fn ensure_default_room(&mut self, now: Timestamp) -> RoomId {
        if let Some(id) = self.default_room.filter(|id| self.rooms.contains_key(id)) {
            return id;
        }
        let id = self.allocate_room_id();
        let meta = RoomMeta::lobby(id, self.config.room.default_room_name.clone(), now);
        self.rooms.insert(id, World::new(meta, &self.config));
        self.default_room = Some(id);
        info!("Created default room {}", id);
        id
    }

    /// Create a hosted room. The creator becomes its host and first player.
    pub fn create_room(
        &mut self,
        session: SessionId,
        name: String,
        duration_secs: Option<u64>,
        visibility: Visibility,
        now: Timestamp,
    ) -> Result<ServerMessage, RegistryError> {
        if session == 0 || session >= self.next_session {
            return Err(RegistryError::UnknownSession(session));
        }

        let id = self.allocate_room_id();
        let duration_ms = duration_secs.unwrap_or(self.config.room.default_duration_secs) * 1000;
        let meta = RoomMeta::hosted(id, name, session, duration_ms, visibility, now);
        self.rooms.insert(id, World::new(meta, &self.config));
        info!("Session {} created room {} ({} ms)", session, id, duration_ms);

        let profile = self.profiles.get(&session).cloned().unwrap_or_else(|| Profile {
            name: format!("Host {session}"),
            identity: Identity::default(),
        });
        self.join(session, profile.name, profile.identity, Some(id), now)
    }

    /// Start the session's room. Host only, and only once.
    pub fn start_room(&mut self, session: SessionId, now: Timestamp) -> Result<(), RegistryError> {
        let room_id = self.room_of(session).ok_or(RegistryError::NotInRoom(session))?;
        let world = self.rooms.get_mut(&room_id).ok_or(RegistryError::UnknownRoom(room_id))?;

        if world.meta.host != Some(session) {
            return Err(RegistryError::NotHost { session, room: room_id });
        }
        match world.meta.status {
            RoomStatus::Created => {}
            RoomStatus::Started => return Err(RegistryError::AlreadyStarted(room_id)),
            RoomStatus::Ended => return Err(RegistryError::RoomEnded(room_id)),
        }

        world.meta.status = RoomStatus::Started;
        world.meta.started_at = Some(now);
        world.meta.end_at = world.meta.duration_ms.map(|d| now + d);
        for state in world.players.values_mut() {
            state.started_at = now;
        }
        info!("Room {} started with {} players", room_id, world.players.len());
        Ok(())
    }

    /// Remove `session` from its room. An emptied room is deleted.
    pub fn leave(&mut self, session: SessionId) {
        let Some(room_id) = self.sessions.remove(&session) else {
            return;
        };
        let Some(world) = self.rooms.get_mut(&room_id) else {
            return;
        };
        world.remove_member(session);
        debug!("Session {} left room {}", session, room_id);

        if world.members.is_empty() {
            self.rooms.remove(&room_id);
            info!("Room {} is empty, deleted", room_id);
        }
    }

    /// Take a room out of the registry and detach its members.
    pub fn remove_room(&mut self, id: RoomId) -> Option<World> {
        let world = self.rooms.remove(&id)?;
        for session in &world.members {
            if self.sessions.get(session) == Some(&id) {
                self.sessions.remove(session);
            }
        }
        Some(world)
    }

    fn allocate_room_id(&mut self) -> RoomId {
        let id = self.next_room;
        self.next_room += 1;
        id
    }
}
