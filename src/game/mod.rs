//! Game simulation modules

pub mod combat;
pub mod manager;
pub mod physics;
pub mod player;
pub mod room;
pub mod snapshot;

pub use manager::RoomManager;

use std::str::FromStr;

/// Which authoritative-movement protocol is active.
/// Historically both existed; a deployment runs exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementMode {
    /// Clients send inputs; the server integrates movement (default)
    InputDriven,
    /// Clients report positions; the server echoes them back
    PositionEcho,
}

impl FromStr for MovementMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" | "input_driven" => Ok(Self::InputDriven),
            "position" | "position_echo" => Ok(Self::PositionEcho),
            _ => Err(()),
        }
    }
}

/// Errors raised while processing room operations. All of these are
/// drop-and-log: none close a connection or abort a tick.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    /// Shoot event referencing a nonexistent or already-removed entity
    #[error("unknown target entity")]
    UnknownTarget,

    /// Operation invalid for the entity's current state, e.g. movement
    /// input for a dead player or respawn of a live one
    #[error("operation conflicts with entity state")]
    StateConflict,

    /// Operation against a nonexistent room
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Message not valid under the active movement mode or malformed
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Shot failed server-side validation
    #[error("shot rejected: {0}")]
    ShotRejected(&'static str),
}
