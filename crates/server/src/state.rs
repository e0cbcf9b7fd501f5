// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use iot_panel_db::Database;
use iot_panel_relay::{CommandDispatcher, ConnectionRegistry};

use crate::auth::TokenKeys;
use crate::config::Config;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub db: Database,
    /// Live device sockets. The only instance in the process.
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: CommandDispatcher,
    pub keys: TokenKeys,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(db: Database, config: &Config) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = CommandDispatcher::new(registry.clone(), config.control_device);
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            registry,
            dispatcher,
            keys: TokenKeys::new(&config.secret_key, config.token_expire_minutes),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
