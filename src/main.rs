//! Quiz Blitz Server
//!
//! Reads configuration from the environment and serves until Ctrl-C.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quiz_blitz::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("Quiz Blitz Server v{}", VERSION);
    info!(
        "Rounds per game: {}, round delay: {:?}, answers revealed: {}",
        config.room.total_rounds, config.room.round_delay, config.room.reveal_answers
    );
    if let Some(seed) = config.seed {
        info!("Fixed problem seed: {}", seed);
    }

    let server = GameServer::new(config);

    let run = server.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            return result.context("server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    // Let rooms say goodbye before exiting
    run.await.context("server stopped")?;

    Ok(())
}
