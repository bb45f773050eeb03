//! Player history persistence.
//!
//! The simulation never waits on storage. It hands jobs to a
//! [`PersistenceHandle`]; [`run_persistence_worker`] drains them on its own
//! task, saving deaths as they happen and finalizing rooms once every pending
//! save for that room has landed.

use crate::server::TargetedMessage;
use futures_util::future::join_all;
use protocol::{LeaderboardEntry, RoomId, ServerMessage, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Summary of one player's run in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHistory {
    pub room_id: RoomId,
    pub duration_ms: u64,
    pub max_mass: f32,
    pub kills: u32,
    pub name: String,
    pub user_id: Option<u64>,
    pub guest_id: Option<String>,
}

/// A stored history row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: u64,
    pub history: PlayerHistory,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room {0} is already finalized")]
    AlreadyFinalized(RoomId),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Backing store for histories and leaderboards.
pub trait HistoryStore: Send + Sync + 'static {
    fn create_player_history(
        &self,
        history: PlayerHistory,
    ) -> impl Future<Output = Result<HistoryRecord, StoreError>> + Send;

    /// Freeze a room's results. Later saves for the room are rejected.
    fn finalize_room_results(&self, room_id: RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_room_leaderboard(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, StoreError>> + Send;
}

/// In-process store. Ranks by kills, then max mass, then survival time.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    records: Vec<HistoryRecord>,
    finalized: HashSet<RoomId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryStore {
    async fn create_player_history(&self, history: PlayerHistory) -> Result<HistoryRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.finalized.contains(&history.room_id) {
            return Err(StoreError::AlreadyFinalized(history.room_id));
        }
        inner.next_id += 1;
        let record = HistoryRecord {
            id: inner.next_id,
            history,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn finalize_room_results(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.finalized.insert(room_id) {
            return Err(StoreError::AlreadyFinalized(room_id));
        }
        Ok(())
    }

    async fn get_room_leaderboard(&self, room_id: RoomId) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&HistoryRecord> = inner
            .records
            .iter()
            .filter(|r| r.history.room_id == room_id)
            .collect();
        rows.sort_by(|a, b| {
            b.history
                .kills
                .cmp(&a.history.kills)
                .then(b.history.max_mass.total_cmp(&a.history.max_mass))
                .then(b.history.duration_ms.cmp(&a.history.duration_ms))
        });

        Ok(rows
            .into_iter()
            .zip(1..)
            .map(|(r, rank)| LeaderboardEntry {
                rank,
                id: r.id,
                name: r.history.name.clone(),
                kills: r.history.kills,
                max_mass: r.history.max_mass,
                duration_ms: r.history.duration_ms,
            })
            .collect())
    }
}

/// Everything needed to close out a room.
#[derive(Debug, Clone)]
pub struct FinalizeRoom {
    pub room_id: RoomId,
    /// Players still alive when the room ended.
    pub histories: Vec<(SessionId, PlayerHistory)>,
    /// Sessions to notify.
    pub members: Vec<SessionId>,
}

#[derive(Debug, Clone)]
pub enum PersistenceJob {
    /// A player died; save its run now.
    SaveHistory { session: SessionId, history: PlayerHistory },
    FinalizeRoom(FinalizeRoom),
}

/// Sending half of the job queue.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistenceJob>,
}

impl PersistenceHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PersistenceJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn save_history(&self, session: SessionId, history: PlayerHistory) {
        if self.tx.send(PersistenceJob::SaveHistory { session, history }).is_err() {
            debug!("Persistence worker gone, dropping history for session {}", session);
        }
    }

    pub fn finalize_room(&self, job: FinalizeRoom) {
        let room_id = job.room_id;
        if self.tx.send(PersistenceJob::FinalizeRoom(job)).is_err() {
            debug!("Persistence worker gone, dropping finalization of room {}", room_id);
        }
    }
}

/// Death saves still in flight, grouped by room.
#[derive(Debug, Default)]
struct PendingSaves {
    rooms: HashMap<RoomId, Vec<JoinHandle<()>>>,
}

impl PendingSaves {
    fn push(&mut self, room_id: RoomId, save: JoinHandle<()>) {
        self.rooms.entry(room_id).or_default().push(save);
    }

    fn take(&mut self, room_id: RoomId) -> Vec<JoinHandle<()>> {
        self.rooms.remove(&room_id).unwrap_or_default()
    }

    /// Forget finished saves. Rooms deleted without finalization drop out
    /// here once their last save lands.
    fn prune(&mut self) {
        self.rooms.retain(|_, saves| {
            saves.retain(|h| !h.is_finished());
            !saves.is_empty()
        });
    }

    fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Drain persistence jobs until every handle is dropped.
pub async fn run_persistence_worker<S: HistoryStore>(
    store: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<PersistenceJob>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
) {
    let mut pending = PendingSaves::default();

    while let Some(job) = rx.recv().await {
        pending.prune();
        match job {
            PersistenceJob::SaveHistory { session, history } => {
                let room_id = history.room_id;
                let save = tokio::spawn(save_history(store.clone(), session, history, targeted_tx.clone()));
                pending.push(room_id, save);
            }
            PersistenceJob::FinalizeRoom(job) => {
                let saves = pending.take(job.room_id);
                tokio::spawn(finalize_room(store.clone(), job, saves, targeted_tx.clone()));
            }
        }
        debug!("{} rooms with death saves in flight", pending.room_count());
    }

    info!("Persistence worker stopped");
}

async fn save_history<S: HistoryStore>(
    store: Arc<S>,
    session: SessionId,
    history: PlayerHistory,
    targeted_tx: broadcast::Sender<TargetedMessage>,
) {
    let room_id = history.room_id;
    match store.create_player_history(history).await {
        Ok(record) => debug!("Saved history {} for session {} in room {}", record.id, session, room_id),
        Err(e) => {
            error!("Failed to save history for session {} in room {}: {}", session, room_id, e);
            let _ = targeted_tx.send(TargetedMessage {
                session_id: session,
                message: ServerMessage::InternalError {
                    message: "failed to save player history".to_string(),
                },
            });
        }
    }
}

async fn finalize_room<S: HistoryStore>(
    store: Arc<S>,
    job: FinalizeRoom,
    pending_saves: Vec<JoinHandle<()>>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
) {
    let room_id = job.room_id;

    for result in join_all(pending_saves).await {
        if let Err(e) = result {
            error!("Death save task for room {} failed: {}", room_id, e);
        }
    }

    join_all(
        job.histories
            .into_iter()
            .map(|(session, history)| save_history(store.clone(), session, history, targeted_tx.clone())),
    )
    .await;

    if let Err(e) = store.finalize_room_results(room_id).await {
        error!("Failed to finalize room {}: {}", room_id, e);
    }

    match store.get_room_leaderboard(room_id).await {
        Ok(entries) => {
            info!("Room {} finalized with {} leaderboard entries", room_id, entries.len());
            for &session_id in &job.members {
                let _ = targeted_tx.send(TargetedMessage {
                    session_id,
                    message: ServerMessage::Leaderboard {
                        room_id,
                        entries: entries.clone(),
                    },
                });
            }
        }
        Err(e) => {
            error!("Failed to load leaderboard for room {}: {}", room_id, e);
            for &session_id in &job.members {
                let _ = targeted_tx.send(TargetedMessage {
                    session_id,
                    message: ServerMessage::InternalError {
                        message: "failed to load leaderboard".to_string(),
                    },
                });
            }
        }
    }

    for &session_id in &job.members {
        let _ = targeted_tx.send(TargetedMessage {
            session_id,
            message: ServerMessage::RoomEnded { room_id },
        });
    }
}
