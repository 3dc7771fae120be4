//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomManager>,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let rooms = Arc::new(RoomManager::new(
            config.movement_mode,
            config.snapshot_every,
        ));

        // Plain joins land in the default room; it exists from startup
        rooms.create_room(&config.default_room).await;

        Self { config, rooms }
    }
}
