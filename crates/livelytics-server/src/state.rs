use std::sync::Arc;

use livelytics_aggregator::{Aggregator, Broadcaster};
use livelytics_core::config::Config;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`]. All fields are cheap to clone.
pub struct AppState {
    /// Handle to the aggregator actor owning all live analytics state.
    pub aggregator: Aggregator,

    /// Fan-out channel the aggregator publishes dashboard updates on;
    /// the WebSocket route subscribes each connected client.
    pub broadcaster: Broadcaster,

    /// Parsed configuration, loaded once at startup from environment
    /// variables.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(aggregator: Aggregator, broadcaster: Broadcaster, config: Config) -> Self {
        Self {
            aggregator,
            broadcaster,
            config: Arc::new(config),
        }
    }
}
