#[macro_use]
extern crate serde;

mod api;
mod config;
mod live;

use blindpoll::{MemStore, PollStore};
use config::Config;
use live::LiveUpdateBus;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub bus: LiveUpdateBus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let store: Arc<dyn PollStore> = Arc::new(MemStore::default());
    let bus = LiveUpdateBus::new(config.close_grace);

    // Re-open live channels for every poll still running (recovery after a
    // restart; a no-op for the in-memory store).
    for poll in store.open_polls() {
        bus.open(&poll.channel_id);
    }

    let state = AppState { store, bus };
    let app = api::app(&config, state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        "blindpoll server listening on {} (api: {}, ws: {})",
        config.bind,
        config.api_route,
        config.ws_route
    );
    axum::serve(listener, app).await?;

    Ok(())
}
