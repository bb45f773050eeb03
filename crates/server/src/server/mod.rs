//! Game server implementation.

use crate::config::Config;
use crate::persistence::{run_persistence_worker, MemoryStore, PersistenceHandle};
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, RoomId, RoomSnapshot, ServerMessage, SessionId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub mod client;
pub mod game;

pub use game::{publish, run_game_loop, GameState};

/// Snapshot of one room, sent once per frame.
#[derive(Debug, Clone)]
pub struct SnapshotBroadcast {
    pub room_id: RoomId,
    pub snapshot: RoomSnapshot,
}

/// Every room's snapshot for one frame, sent as a single broadcast item so
/// a burst of rooms never overruns the channel.
pub type SnapshotFrame = Arc<Vec<SnapshotBroadcast>>;

/// A message targeted at a specific session.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    /// Target session ID.
    pub session_id: SessionId,
    pub message: ServerMessage,
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    // Snapshots are superseded every frame, so a short buffer is enough.
    let (snapshot_tx, _snapshot_rx) = broadcast::channel::<SnapshotFrame>(8);
    let (targeted_tx, _targeted_rx) = broadcast::channel::<TargetedMessage>(256);

    let (persistence, jobs) = PersistenceHandle::channel();
    tokio::spawn(run_persistence_worker(
        Arc::new(MemoryStore::new()),
        jobs,
        targeted_tx.clone(),
    ));

    // Shared game state
    let game_state = Arc::new(RwLock::new(GameState::new(&config, persistence)));

    // Start the game loop
    let game_loop_state = Arc::clone(&game_state);
    let frame_interval = config.server.frame_interval_ms;
    let loop_snapshot_tx = snapshot_tx.clone();
    let loop_targeted_tx = targeted_tx.clone();
    tokio::spawn(async move {
        game::run_game_loop(game_loop_state, loop_snapshot_tx, loop_targeted_tx, frame_interval).await;
    });

    let max_connections = config.server.max_connections;
    let connections = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, addr) = listener.accept().await?;

        if connections.load(Ordering::Relaxed) >= max_connections {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }
        connections.fetch_add(1, Ordering::Relaxed);

        let game_state = Arc::clone(&game_state);
        let connections = Arc::clone(&connections);
        let snapshot_rx = snapshot_tx.subscribe();
        let targeted_rx = targeted_tx.subscribe();

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, game_state, snapshot_rx, targeted_rx).await;

            // Always release the slot when done
            connections.fetch_sub(1, Ordering::Relaxed);

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game_state: Arc<RwLock<GameState>>,
    mut snapshot_rx: broadcast::Receiver<SnapshotFrame>,
    mut targeted_rx: broadcast::Receiver<TargetedMessage>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();

    let session_id = {
        let mut state = game_state.write().await;
        state.registry.open_session()
    };

    let result = async {
        loop {
            tokio::select! {
                // Handle incoming WebSocket messages
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let message = match ClientMessage::parse(text.as_str()) {
                                Ok(message) => message,
                                Err(e) => {
                                    warn!("Bad frame from {}: {}", addr, e);
                                    continue;
                                }
                            };
                            let reply = {
                                let mut state = game_state.write().await;
                                state.handle_message(session_id, message, game::unix_millis())
                            };
                            if let Some(reply) = reply {
                                write.send(Message::Text(reply.encode()?.into())).await?;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Session {} ({}) disconnected", session_id, addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error from {}: {}", addr, e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                // Handle room snapshots
                snapshot = snapshot_rx.recv() => {
                    match snapshot {
                        Ok(frame) => {
                            let Some(room_id) = game_state.read().await.registry.room_of(session_id) else {
                                continue;
                            };
                            let Some(room) = frame.iter().find(|s| s.room_id == room_id) else {
                                continue;
                            };
                            let text = ServerMessage::Snapshot(room.snapshot.clone()).encode()?;
                            write.send(Message::Text(text.into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("Session {} skipped {} snapshots", session_id, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                // Handle targeted messages
                targeted = targeted_rx.recv() => {
                    match targeted {
                        Ok(targeted) if targeted.session_id == session_id => {
                            write.send(Message::Text(targeted.message.encode()?.into())).await?;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Session {} lost {} targeted messages", session_id, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        anyhow::Ok(())
    }
    .await;

    // Disconnect removes the player immediately
    {
        let mut state = game_state.write().await;
        state.registry.close_session(session_id);
    }

    result
}
