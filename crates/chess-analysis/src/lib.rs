//! Chess position evaluation backed by a UCI engine.
//!
//! This crate drives Stockfish (or any UCI engine) over stdin/stdout and
//! keeps its results in a depth-monotonic SQLite cache.
//!
//! # Overview
//!
//! - [`Position`] - Validated FEN with side to move
//! - [`EngineProcess`] - One long-lived engine process and its line-oriented I/O
//! - [`EngineSession`] - Single-shot bounded analysis ([`Analyser`])
//! - [`SqliteEvaluationCache`] - Evaluation store that never trades depth for recency
//! - [`AnalysisCoordinator`] - Cache-then-compute for one position or a batch
//! - [`LiveAnalysis`] - Infinite multi-line search on a shared engine, one subscriber at a time
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{AnalysisCoordinator, EngineSession, SqliteEvaluationCache};
//! use std::time::Duration;
//!
//! let cache = SqliteEvaluationCache::open("data/analysis.db")?;
//! let coordinator = AnalysisCoordinator::new(EngineSession::new("stockfish"), cache);
//! let outcome = coordinator
//!     .analyze_one(fen, 20, Duration::from_millis(500), false)
//!     .await?;
//! println!("{:?} at depth {}", outcome.evaluation.best_move, outcome.evaluation.depth);
//! ```

pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod evaluation;
pub mod live;
pub mod position;
pub mod session;

pub use cache::{
    CacheError, DbPool, EvaluationStore, LinesOutcome, SqliteEvaluationCache, UpsertOutcome,
};
pub use coordinator::{AnalysisCoordinator, AnalysisError, AnalysisOutcome, BatchSummary};
pub use engine::{EngineError, EngineIo, EngineProcess};
pub use evaluation::{
    AnalysisLine, EngineLine, Evaluation, LIVE_MULTIPV, MIN_PERSIST_DEPTH, PV_MAX_PLIES,
};
pub use live::{LiveAnalysis, LiveUpdate, StreamEnd, Subscription};
pub use position::{Position, PositionError};
pub use session::{Analyser, EngineSession};
