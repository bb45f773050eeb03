//! Game state and main loop.

use crate::config::Config;
use crate::lifecycle::end_due_rooms;
use crate::persistence::PersistenceHandle;
use crate::registry::RoomRegistry;
use crate::simulation::simulate;
use crate::Timestamp;
use protocol::{ClientMessage, ServerMessage, SessionId};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{SnapshotBroadcast, SnapshotFrame, TargetedMessage};

/// Logical step length.
pub const STEP: Duration = Duration::from_millis(20);
/// Logical step length in seconds.
pub const DT: f32 = 1.0 / 50.0;
/// Wall-clock time credited per frame at most.
pub const MAX_FRAME: Duration = Duration::from_millis(100);
pub const MAX_STEPS_PER_FRAME: u32 = 5;

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// How many fixed steps a frame runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub steps: u32,
    /// Elapsed time was over [`MAX_FRAME`]; the excess was dropped.
    pub dropped: bool,
}

/// Fixed-timestep accumulator. Slow frames run slow-motion instead of
/// spiralling into longer and longer catch-up.
#[derive(Debug, Default)]
pub struct FixedStep {
    pending: Duration,
}

impl FixedStep {
    pub fn advance(&mut self, elapsed: Duration) -> StepPlan {
        let dropped = elapsed > MAX_FRAME;
        self.pending += elapsed.min(MAX_FRAME);

        let mut steps = 0;
        while self.pending >= STEP && steps < MAX_STEPS_PER_FRAME {
            self.pending -= STEP;
            steps += 1;
        }
        StepPlan { steps, dropped }
    }
}

/// Pending broadcasts to send after releasing the game state lock.
#[derive(Debug, Default)]
pub struct PendingBroadcasts {
    pub snapshots: Vec<SnapshotBroadcast>,
    pub targeted: Vec<TargetedMessage>,
    pub plan: Option<StepPlan>,
}

/// Main game state.
pub struct GameState {
    pub config: Config,
    pub registry: RoomRegistry,
    pub frame_count: u64,
    pub step_count: u64,
    clock: FixedStep,
    persistence: PersistenceHandle,
}

impl GameState {
    pub fn new(config: &Config, persistence: PersistenceHandle) -> Self {
        Self {
            config: config.clone(),
            registry: RoomRegistry::new(config.clone()),
            frame_count: 0,
            step_count: 0,
            clock: FixedStep::default(),
            persistence,
        }
    }

    /// Apply a validated client message. Rejected messages are logged and
    /// dropped.
    pub fn handle_message(
        &mut self,
        session: SessionId,
        message: ClientMessage,
        now: Timestamp,
    ) -> Option<ServerMessage> {
        match self.registry.apply(session, message, now) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Rejected message from session {}: {}", session, e);
                None
            }
        }
    }

    /// Run one wall-clock frame: as many fixed steps as the accumulator
    /// allows, then one snapshot per room.
    pub fn frame(&mut self, elapsed: Duration, now: Timestamp) -> PendingBroadcasts {
        let plan = self.clock.advance(elapsed);
        let mut pending = PendingBroadcasts {
            plan: Some(plan),
            ..Default::default()
        };

        let step_ms = STEP.as_millis() as Timestamp;
        for i in 0..plan.steps {
            let behind = (plan.steps - 1 - i) as Timestamp * step_ms;
            self.step(now.saturating_sub(behind), &mut pending.targeted);
        }

        pending.snapshots = self
            .registry
            .rooms_mut()
            .map(|world| SnapshotBroadcast {
                room_id: world.id(),
                snapshot: world.snapshot(),
            })
            .collect();

        self.frame_count += 1;
        if self.frame_count % 500 == 0 {
            debug!(
                "Frame #{}: {} steps total, {} rooms",
                self.frame_count,
                self.step_count,
                self.registry.room_count()
            );
        }
        pending
    }

    /// One fixed step across every room.
    pub fn step(&mut self, now: Timestamp, targeted: &mut Vec<TargetedMessage>) {
        self.step_count += 1;

        // Due rooms are finalized before anything else moves.
        for job in end_due_rooms(&mut self.registry, now) {
            self.persistence.finalize_room(job);
        }

        let config = &self.config;
        for world in self.registry.rooms_mut() {
            if !world.is_started() {
                continue;
            }

            for dead in simulate(DT, world, now, config) {
                info!(
                    "Session {} eliminated in room {} ({} kills, max mass {:.0})",
                    dead.session,
                    world.id(),
                    dead.kills,
                    dead.max_mass
                );
                targeted.push(TargetedMessage {
                    session_id: dead.session,
                    message: ServerMessage::Eliminated {
                        kills: dead.kills,
                        max_mass: dead.max_mass,
                        duration_ms: dead.duration_ms,
                    },
                });
                self.persistence.save_history(dead.session, dead.history);
            }

            world.ensure_orbs(&config.orb);
            world.ensure_viruses(&config.virus);
            world.grow_orbs(config, now);
        }
    }
}

/// Main game loop.
pub async fn run_game_loop(
    state: Arc<RwLock<GameState>>,
    snapshot_tx: broadcast::Sender<SnapshotFrame>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
    frame_interval_ms: u64,
) {
    let period = Duration::from_millis(frame_interval_ms.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    info!("Game loop running every {:?}", period);

    loop {
        ticker.tick().await;
        let frame_start = Instant::now();
        let elapsed = frame_start.saturating_duration_since(last);
        last = frame_start;

        // Run frame and extract pending broadcasts
        let broadcasts = {
            let mut game = state.write().await;
            let broadcasts = game.frame(elapsed, unix_millis());
            if broadcasts.plan.is_some_and(|p| p.dropped) {
                warn!(
                    "Frame #{} fell behind by {:?}; dropping backlog",
                    game.frame_count,
                    elapsed.saturating_sub(MAX_FRAME)
                );
            }
            broadcasts
        }; // Write lock released here

        publish(broadcasts, &snapshot_tx, &targeted_tx);
    }
}

/// Send one frame's broadcasts. All room snapshots go out as one item.
pub fn publish(
    broadcasts: PendingBroadcasts,
    snapshot_tx: &broadcast::Sender<SnapshotFrame>,
    targeted_tx: &broadcast::Sender<TargetedMessage>,
) {
    if !broadcasts.snapshots.is_empty() {
        let _ = snapshot_tx.send(Arc::new(broadcasts.snapshots));
    }
    for message in broadcasts.targeted {
        let _ = targeted_tx.send(message);
    }
}
