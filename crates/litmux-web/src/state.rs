//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Instant;

use litmux_common::LitmuxConfig;
use litmux_ingestion::Aggregator;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub config: LitmuxConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(aggregator: Aggregator, config: LitmuxConfig) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            config,
            started_at: Instant::now(),
        }
    }

    pub async fn from_config(config: LitmuxConfig) -> anyhow::Result<Self> {
        let aggregator = Aggregator::from_config(&config).await?;
        Ok(Self::new(aggregator, config))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
