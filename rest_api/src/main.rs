// rest_api/src/main.rs

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use rest_api::{load_server_config, start_server, AppState};
use security::RolesConfig;
use storage_api::InMemoryBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_server_config(config_path)?;

    let roles = RolesConfig::from_yaml_file(&config.roles_file)
        .with_context(|| format!("failed to load role policy from {}", config.roles_file))?;

    let backend = Arc::new(InMemoryBackend::new());
    let state = AppState::new(backend.clone(), backend, Arc::new(roles));
    state.stats.spawn_invalidation();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            return;
        }
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(());
    });

    start_server(&config, state, shutdown_rx).await
}
