//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::game::MovementMode;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origins for CORS (comma-separated, "*" = permissive)
    pub client_origin: String,

    /// Which authoritative-movement protocol is active. Exactly one of the
    /// two protocols runs per deployment; messages for the other are dropped.
    pub movement_mode: MovementMode,

    /// Room that plain `join` messages land in
    pub default_room: String,

    /// Broadcast a snapshot every N simulation ticks (1 = every tick)
    pub snapshot_every: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let movement_mode = match env::var("MOVEMENT_MODE") {
            Ok(val) => val
                .parse::<MovementMode>()
                .map_err(|_| ConfigError::InvalidMovementMode(val))?,
            Err(_) => MovementMode::InputDriven,
        };

        let snapshot_every = match env::var("SNAPSHOT_EVERY") {
            Ok(val) => val
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidSnapshotInterval)?,
            Err(_) => 1,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            movement_mode,

            default_room: env::var("DEFAULT_ROOM").unwrap_or_else(|_| "arena".to_string()),

            snapshot_every,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid MOVEMENT_MODE: {0} (expected 'input' or 'position')")]
    InvalidMovementMode(String),

    #[error("SNAPSHOT_EVERY must be a positive integer")]
    InvalidSnapshotInterval,
}
