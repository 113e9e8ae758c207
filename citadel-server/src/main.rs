//! Citadel Game Server
//!
//! Binds the WebSocket endpoint and serves until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use citadel::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    info!("Citadel Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!(
        "Grace period: {}s, default max players: {}, require all ready: {}",
        config.grace_period.as_secs(),
        config.lobby.default_max_players,
        config.lobby.require_all_ready
    );

    let server = Arc::new(GameServer::new(config));
    let mut runner = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });

    tokio::select! {
        result = &mut runner => {
            result.context("server task panicked")??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    runner.await.context("server task panicked")??;
    Ok(())
}
