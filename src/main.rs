//! Conquest Turn Server
//!
//! Serves the turn engine over HTTP. Configuration comes from the
//! environment; see [`ServerConfig::from_env`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conquest::{
    network::{GameServer, ServerConfig},
    Engine, JsonFileStore, LocalClock, MemoryStore, PlayerStore, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("conquest=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!("Conquest Server v{}", VERSION);

    let store: Arc<dyn PlayerStore> = match &config.state_path {
        Some(path) => {
            info!(path = %path.display(), "using JSON file store");
            Arc::new(
                JsonFileStore::open(path.clone())
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        }
        None => {
            warn!("GAME_STATE_PATH not set, state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let engine = Arc::new(Engine::new(store, Arc::new(LocalClock)));
    let server = Arc::new(GameServer::new(config, engine));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
