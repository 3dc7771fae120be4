//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Movement state of a player, carried on the wire as an uppercase tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementState {
    /// Standing still
    Idle,
    /// Moving horizontally
    Run,
    /// Airborne after a jump impulse
    Jump,
    /// Killed; ignores movement input until respawn
    Dead,
}

impl Default for MovementState {
    fn default() -> Self {
        Self::Idle
    }
}

/// One frame of client input
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    /// Sequence number for client-side prediction reconciliation
    pub seq: u32,
    /// Strafe axis (-1, 0, 1)
    pub x: f32,
    /// Forward axis (-1, 0, 1)
    pub y: f32,
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub shoot: bool,
    /// Camera yaw in radians
    pub yaw: f32,
    /// Camera pitch in radians
    pub pitch: f32,
    /// Client frame delta in seconds
    pub dt: f32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request to join the game (lands in the default room)
    Join {
        /// Auth token - validation is out of scope, accepted opaquely
        token: Option<String>,
        /// Display name
        name: Option<String>,
    },

    /// Player input for the current frame
    Input(InputFrame),

    /// Raw position report - only honored in position-echo movement mode
    #[serde(rename_all = "camelCase")]
    Position { pos: [f32; 3], yaw: f32 },

    /// Hit-scan shot against a target, resolved immediately on receipt
    #[serde(rename_all = "camelCase")]
    Shoot { target_id: Uuid, damage: f32 },

    /// Request respawn after death
    Respawn,

    /// Ping for latency measurement
    Ping { t: u64 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Sent once to a newly joined player: own id plus the full room state
    Init { id: Uuid, snapshot: WorldSnapshot },

    /// Authoritative state snapshot, droppable delivery
    Tick(WorldSnapshot),

    /// A player joined the room
    PlayerJoined { player: PlayerSnapshot },

    /// A player left the room
    PlayerLeft { id: Uuid },

    /// Hit registered against a player
    PlayerHit { id: Uuid, health: f32 },

    /// A player was killed; carries the full updated player table
    #[serde(rename_all = "camelCase")]
    PlayerDied {
        victim_id: Uuid,
        killer_id: Uuid,
        players: HashMap<Uuid, PlayerSnapshot>,
    },

    /// A dead player respawned
    PlayerRespawned { player: PlayerSnapshot },

    /// Pong response, echoes the client timestamp
    Pong { t: u64 },

    /// Error message
    Error { code: String, message: String },
}

/// Serialized player state inside a snapshot.
/// Arrays instead of {x,y,z} objects keep the JSON small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    /// Position [x, y, z]
    pub pos: [f32; 3],
    /// Orientation quaternion [x, y, z, w]
    pub rot: [f32; 4],
    /// Velocity [x, y, z]
    pub vel: [f32; 3],
    /// Health (0..=100)
    pub hp: f32,
    pub state: MovementState,
    pub weapon_idx: usize,
}

/// Full room state at a given tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub players: HashMap<Uuid, PlayerSnapshot>,
    /// Instantaneous events since the previous snapshot
    pub events: Vec<GameEvent>,
}

/// Instantaneous game events carried inside snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameEvent {
    /// Hit registered
    #[serde(rename_all = "camelCase")]
    Hit {
        shooter_id: Uuid,
        target_id: Uuid,
        damage: f32,
    },

    /// Player killed
    #[serde(rename_all = "camelCase")]
    Death { victim_id: Uuid, killer_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_msg_parses_documented_shape() {
        let raw = r#"{"type":"input","seq":7,"x":1.0,"y":0.0,"jump":false,"crouch":false,"sprint":true,"shoot":false,"yaw":1.57,"pitch":0.0,"dt":0.016}"#;
        let msg: ClientMsg = serde_json::from_str(raw).expect("valid input message");
        match msg {
            ClientMsg::Input(frame) => {
                assert_eq!(frame.seq, 7);
                assert!(frame.sprint);
                assert_eq!(frame.x, 1.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn shoot_msg_uses_camel_case_fields() {
        let target = Uuid::new_v4();
        let raw = format!(r#"{{"type":"shoot","targetId":"{}","damage":40.0}}"#, target);
        let msg: ClientMsg = serde_json::from_str(&raw).expect("valid shoot message");
        match msg {
            ClientMsg::Shoot { target_id, damage } => {
                assert_eq!(target_id, target);
                assert_eq!(damage, 40.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn movement_state_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&MovementState::Dead).unwrap(),
            "\"DEAD\""
        );
        assert_eq!(
            serde_json::to_string(&MovementState::Idle).unwrap(),
            "\"IDLE\""
        );
    }

    #[test]
    fn tick_msg_is_tagged_snapshot() {
        let snap = WorldSnapshot {
            tick: 42,
            players: HashMap::new(),
            events: vec![],
        };
        let json = serde_json::to_string(&ServerMsg::Tick(snap)).unwrap();
        assert!(json.contains("\"type\":\"tick\""));
        assert!(json.contains("\"tick\":42"));
    }

    #[test]
    fn malformed_message_is_an_error() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"input","seq":"oops"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"no_type":true}"#).is_err());
    }
}
