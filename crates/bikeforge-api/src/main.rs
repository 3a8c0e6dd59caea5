use anyhow::Context;
use bikeforge_api::{init_tracing, AppState, Server};
use bikeforge_core::config_manager::ConfigManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    init_tracing(&config.logging, "tower_http=debug");

    let state = AppState::from_config(config)?;
    let server = Server::new(&config.server, state);
    server.run().await
}
