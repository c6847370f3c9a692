//! Analysis Server
//!
//! Serves cached Stockfish evaluations over HTTP and live multi-line
//! analysis over WebSocket.

use analysis_server::config::{Args, Config};
use analysis_server::{db, router, AppState};
use anyhow::Context;
use chess_analysis::EngineProcess;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_args(&args)?;

    // Create data directory if needed
    if let Some(dir) = config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    }

    let db = db::init_db(&config.database_path).context("Failed to initialize database")?;

    let live_engine = EngineProcess::start(&config.stockfish_path)
        .await
        .with_context(|| format!("Failed to start engine {}", config.stockfish_path.display()))?;

    let bind = config.bind.clone();
    let state = AppState::new(db, config, Some(live_engine)).context("Failed to prepare cache")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    tracing::info!("Server running on http://{}", bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
