//! Room registry and connection-to-room routing

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::room::{GameRoom, RoomCommand, RoomHandle};
use crate::game::MovementMode;
use crate::ws::protocol::ServerMsg;

/// Registry of rooms plus explicit connection membership, so disconnects
/// and inbound messages can be routed to the correct room.
pub struct RoomManager {
    rooms: DashMap<String, RoomHandle>,
    /// Each connection maps to exactly one room at a time
    memberships: DashMap<Uuid, String>,
    movement_mode: MovementMode,
    snapshot_every: u32,
}

impl RoomManager {
    pub fn new(movement_mode: MovementMode, snapshot_every: u32) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            movement_mode,
            snapshot_every,
        }
    }

    /// Create a room and start its loop. No-op if the room already exists.
    pub async fn create_room(&self, room_id: &str) {
        if self.rooms.contains_key(room_id) {
            return;
        }

        info!(room_id = %room_id, "Creating room");
        let handle = GameRoom::spawn(room_id.to_string(), self.movement_mode, self.snapshot_every);
        handle.start().await;
        self.rooms.insert(room_id.to_string(), handle);
    }

    /// Attach a connection to a room. Silently a no-op when the room does
    /// not exist. Joining while in another room moves the membership.
    /// Returns the room's broadcast receiver.
    pub async fn join_room(
        &self,
        conn_id: Uuid,
        name: String,
        room_id: &str,
        reply: mpsc::Sender<ServerMsg>,
    ) -> Option<broadcast::Receiver<ServerMsg>> {
        let Some(handle) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            warn!(conn_id = %conn_id, room_id = %room_id, "Join for nonexistent room ignored");
            return None;
        };

        // One room per connection: leave the previous room first
        if let Some((_, previous)) = self.memberships.remove(&conn_id) {
            if previous != room_id {
                self.forward(&previous, RoomCommand::Leave { conn_id }).await;
            }
        }
        self.memberships.insert(conn_id, room_id.to_string());

        let rx = handle.subscribe();
        handle
            .send(RoomCommand::Join {
                conn_id,
                name,
                reply,
            })
            .await;
        Some(rx)
    }

    /// Route a command to the room the connection belongs to.
    /// Unrouted commands are dropped.
    pub async fn route(&self, conn_id: Uuid, cmd: RoomCommand) {
        let Some(room_id) = self.memberships.get(&conn_id).map(|r| r.value().clone()) else {
            debug!(conn_id = %conn_id, "Message from connection outside any room dropped");
            return;
        };
        self.forward(&room_id, cmd).await;
    }

    /// Detach a connection and notify its room. Safe to call for unknown
    /// connections and at any point relative to the room's tick.
    pub async fn disconnect(&self, conn_id: Uuid) {
        if let Some((_, room_id)) = self.memberships.remove(&conn_id) {
            self.forward(&room_id, RoomCommand::Leave { conn_id }).await;
        }
    }

    async fn forward(&self, room_id: &str, cmd: RoomCommand) {
        match self.rooms.get(room_id).map(|r| r.value().clone()) {
            Some(handle) => handle.send(cmd).await,
            None => debug!(room_id = %room_id, "Command for nonexistent room dropped"),
        }
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RoomManager {
        RoomManager::new(MovementMode::InputDriven, 1)
    }

    #[tokio::test]
    async fn create_room_is_idempotent() {
        let mgr = manager();
        mgr.create_room("arena").await;
        mgr.create_room("arena").await;
        assert_eq!(mgr.active_rooms(), 1);
    }

    #[tokio::test]
    async fn join_nonexistent_room_is_a_no_op() {
        let mgr = manager();
        let (tx, _rx) = mpsc::channel(4);
        let sub = mgr
            .join_room(Uuid::new_v4(), "a".into(), "missing", tx)
            .await;
        assert!(sub.is_none());
        assert_eq!(mgr.total_players(), 0);
    }

    #[tokio::test]
    async fn join_delivers_init_and_tracks_membership() {
        let mgr = manager();
        mgr.create_room("arena").await;

        let conn_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        let sub = mgr.join_room(conn_id, "a".into(), "arena", tx).await;
        assert!(sub.is_some());

        let init = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("init within a second")
            .expect("direct channel open");
        match init {
            ServerMsg::Init { id, snapshot } => {
                assert_eq!(id, conn_id);
                assert!(snapshot.players.contains_key(&conn_id));
            }
            other => panic!("expected init, got {:?}", other),
        }

        mgr.disconnect(conn_id).await;
        // Disconnecting twice must be harmless
        mgr.disconnect(conn_id).await;
    }
}
