//! Analysis Server Library
//!
//! HTTP and WebSocket front end for cached engine analysis:
//! - REST endpoints for single positions, variations and uploaded games
//! - WebSocket streaming of live multi-line analysis

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pgn;
pub mod repo;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use chess_analysis::{
    AnalysisCoordinator, CacheError, EngineProcess, EngineSession, LiveAnalysis,
    SqliteEvaluationCache,
};
use config::Config;
use db::DbPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Cache-then-compute service used by the HTTP endpoints.
pub type Coordinator = AnalysisCoordinator<EngineSession, SqliteEvaluationCache>;

/// Shared-engine streaming used by the WebSocket endpoint.
pub type Live = LiveAnalysis<SqliteEvaluationCache>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    pub coordinator: Arc<Coordinator>,
    /// Shared engine for live analysis; `None` serves HTTP only.
    pub live: Option<Arc<Live>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the cache, the single-shot analyser and the optional shared
    /// engine onto one database.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache tables cannot be created.
    pub fn new(
        db: DbPool,
        config: Config,
        live_engine: Option<EngineProcess>,
    ) -> Result<Self, CacheError> {
        let cache = SqliteEvaluationCache::from_pool(db.clone())?;
        let session = EngineSession::new(&config.stockfish_path);
        let live = live_engine.map(|process| Arc::new(LiveAnalysis::new(process, cache.clone())));

        Ok(Self {
            db,
            coordinator: Arc::new(AnalysisCoordinator::new(session, cache)),
            live,
            config: Arc::new(config),
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // CORS layer for cross-origin requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health::health))
        .route("/health/db", get(api::health::health_db))
        .route("/analyze", post(api::analysis::analyze))
        .route("/variations", post(api::analysis::variations))
        .route("/evals", get(api::analysis::get_eval))
        .route(
            "/games",
            get(api::games::list_games).post(api::games::upload_game),
        )
        .route("/games/:id/moves", get(api::games::get_game_moves))
        .route("/games/:id/analyze", post(api::games::analyze_game))
        .route("/ws/analyze", get(ws::ws_analyze))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(axum::middleware::from_fn(middleware::timing_layer)),
        )
}
