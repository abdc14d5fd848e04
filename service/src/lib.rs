use config::Config;
use hub::BroadcastHub;
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub config: Config,
}

impl AppState {
    /// Builds the one process-wide hub from the configured greeting.
    pub fn new(app_config: Config) -> Self {
        info!(
            "Relay hub socket path: {}, greeting: \"{}\"",
            app_config.socket_path(),
            app_config.connected_message()
        );
        Self {
            hub: Arc::new(BroadcastHub::new(app_config.connected_message())),
            config: app_config,
        }
    }
}
