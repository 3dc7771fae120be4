//! WebSocket upgrade handler and per-connection session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::room::RoomCommand;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Token validation is out of scope; every
/// connection gets a fresh server-assigned id.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // All outbound traffic for this connection funnels through one direct
    // channel; room broadcasts are forwarded into it with drop-on-full.
    let (direct_tx, direct_rx) = mpsc::channel::<ServerMsg>(64);

    let writer = tokio::spawn(write_loop(conn_id, ws_sink, direct_rx));

    read_loop(conn_id, ws_stream, direct_tx, &state).await;

    // Disconnect is routed to the owning room and applied at its next safe
    // command point, never mid-tick.
    state.rooms.disconnect(conn_id).await;
    writer.abort();

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Writer task: direct channel -> WebSocket
async fn write_loop(
    conn_id: Uuid,
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = send_msg(&mut sink, &msg).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Reader loop: WebSocket -> room commands
async fn read_loop(
    conn_id: Uuid,
    mut stream: futures::stream::SplitStream<WebSocket>,
    direct_tx: mpsc::Sender<ServerMsg>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let mut joined = false;

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "Rate limited inbound message");
                    continue;
                }

                // Malformed messages are dropped; the connection stays open
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                match msg {
                    ClientMsg::Join { name, token: _ } => {
                        if joined {
                            debug!(conn_id = %conn_id, "Duplicate join ignored");
                            continue;
                        }
                        let display_name = name
                            .unwrap_or_else(|| format!("Player_{}", &conn_id.to_string()[..8]));

                        match state
                            .rooms
                            .join_room(
                                conn_id,
                                display_name,
                                &state.config.default_room,
                                direct_tx.clone(),
                            )
                            .await
                        {
                            Some(broadcast_rx) => {
                                joined = true;
                                tokio::spawn(forward_broadcasts(
                                    conn_id,
                                    broadcast_rx,
                                    direct_tx.clone(),
                                ));
                            }
                            None => {
                                let _ = direct_tx.try_send(ServerMsg::Error {
                                    code: "room_not_found".to_string(),
                                    message: "No room available to join".to_string(),
                                });
                            }
                        }
                    }
                    ClientMsg::Input(frame) => {
                        state
                            .rooms
                            .route(conn_id, RoomCommand::Input { conn_id, frame })
                            .await;
                    }
                    ClientMsg::Position { pos, yaw } => {
                        state
                            .rooms
                            .route(conn_id, RoomCommand::Position { conn_id, pos, yaw })
                            .await;
                    }
                    ClientMsg::Shoot { target_id, damage } => {
                        state
                            .rooms
                            .route(
                                conn_id,
                                RoomCommand::Shoot {
                                    conn_id,
                                    target_id,
                                    damage,
                                },
                            )
                            .await;
                    }
                    ClientMsg::Respawn => {
                        state
                            .rooms
                            .route(conn_id, RoomCommand::Respawn { conn_id })
                            .await;
                    }
                    ClientMsg::Ping { t } => {
                        let _ = direct_tx.try_send(ServerMsg::Pong { t });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Forward room broadcasts into the connection's direct channel.
/// Only `tick` snapshots are droppable: a full queue skips them because the
/// next snapshot supersedes them. Lifecycle events (joins, leaves, respawns)
/// are not replayed anywhere, so they wait for queue space instead.
async fn forward_broadcasts(
    conn_id: Uuid,
    mut rx: broadcast::Receiver<ServerMsg>,
    direct_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(msg @ ServerMsg::Tick(_)) => match direct_tx.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(conn_id = %conn_id, "Slow client, dropping snapshot");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Ok(msg) => {
                if direct_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(conn_id = %conn_id, "Room broadcast channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::WorldSnapshot;
    use std::collections::HashMap;

    fn snapshot_msg(tick: u64) -> ServerMsg {
        ServerMsg::Tick(WorldSnapshot {
            tick,
            players: HashMap::new(),
            events: Vec::new(),
        })
    }

    #[tokio::test]
    async fn snapshots_forward_in_order() {
        let (broadcast_tx, broadcast_rx) = broadcast::channel(16);
        let (direct_tx, mut direct_rx) = mpsc::channel(16);
        tokio::spawn(forward_broadcasts(Uuid::new_v4(), broadcast_rx, direct_tx));

        broadcast_tx.send(snapshot_msg(1)).unwrap();
        broadcast_tx.send(snapshot_msg(2)).unwrap();

        for expected in [1, 2] {
            match direct_rx.recv().await {
                Some(ServerMsg::Tick(snap)) => assert_eq!(snap.tick, expected),
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn full_queue_drops_snapshots_but_keeps_lifecycle_events() {
        let conn_id = Uuid::new_v4();
        let (broadcast_tx, broadcast_rx) = broadcast::channel(16);
        let (direct_tx, mut direct_rx) = mpsc::channel(1);

        // Occupy the only queue slot so the forwarder hits a full channel
        direct_tx.try_send(ServerMsg::Pong { t: 0 }).unwrap();
        tokio::spawn(forward_broadcasts(conn_id, broadcast_rx, direct_tx));

        broadcast_tx.send(snapshot_msg(1)).unwrap();
        broadcast_tx
            .send(ServerMsg::PlayerLeft { id: conn_id })
            .unwrap();

        // Let the forwarder drop the snapshot and park on the leave event
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(direct_rx.recv().await, Some(ServerMsg::Pong { .. })));
        // The snapshot was skipped while the queue was full; the leave event
        // arrives as soon as space frees up.
        match direct_rx.recv().await {
            Some(ServerMsg::PlayerLeft { id }) => assert_eq!(id, conn_id),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
