//! Cache-then-compute analysis of single positions and whole games.

use crate::cache::EvaluationStore;
use crate::engine::EngineError;
use crate::evaluation::Evaluation;
use crate::position::{Position, PositionError};
use crate::session::Analyser;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by [`AnalysisCoordinator::analyze_one`].
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The submitted position is not a legal board state.
    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] PositionError),
    /// The engine finished without reporting any line. Not cached; retrying
    /// with a larger time limit may succeed.
    #[error("Engine produced no result for {fen}")]
    NoResult { fen: String },
    /// The engine could not be run or crashed.
    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),
}

/// An evaluation together with where it came from.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub evaluation: Evaluation,
    /// True if served from the cache without running the engine.
    pub cached: bool,
    /// Set when the evaluation was computed but could not be stored.
    pub warning: Option<String>,
}

/// Totals for a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total_positions: usize,
    /// Positions that needed the engine.
    pub analyzed: usize,
    /// Positions answered from the cache.
    pub cached: usize,
    pub errors: usize,
    pub elapsed_seconds: f64,
}

/// Answers evaluation requests from the store when it is deep enough and
/// from the analyser otherwise.
pub struct AnalysisCoordinator<A, S> {
    analyser: A,
    store: S,
}

impl<A: Analyser, S: EvaluationStore> AnalysisCoordinator<A, S> {
    pub fn new(analyser: A, store: S) -> Self {
        Self { analyser, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn analyser(&self) -> &A {
        &self.analyser
    }

    /// Evaluate one position.
    ///
    /// A stored evaluation at least `depth` deep is returned as-is unless
    /// `force_recompute` is set. Otherwise the engine runs with both the depth
    /// and the time limit, and the result is stored on a best-effort basis:
    /// a storage failure is logged and reported in
    /// [`AnalysisOutcome::warning`], never as an error.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::InvalidPosition`] if `fen` is not a legal position
    /// - [`AnalysisError::NoResult`] if the engine reported no line
    /// - [`AnalysisError::Engine`] if the engine could not be run
    pub async fn analyze_one(
        &self,
        fen: &str,
        depth: u32,
        time_limit: Duration,
        force_recompute: bool,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let position = Position::parse(fen)?;

        if !force_recompute {
            match self.store.get(&position) {
                Ok(Some(stored)) if stored.depth >= depth => {
                    tracing::debug!(fen = %position, depth = stored.depth, "Cache hit");
                    return Ok(AnalysisOutcome {
                        evaluation: stored,
                        cached: true,
                        warning: None,
                    });
                }
                Ok(Some(stored)) => {
                    tracing::debug!(
                        fen = %position,
                        stored = stored.depth,
                        requested = depth,
                        "Cached evaluation too shallow"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(fen = %position, error = %e, "Cache lookup failed");
                }
            }
        }

        let lines = self
            .analyser
            .evaluate(&position, depth, time_limit, 1)
            .await?;
        let Some(best) = lines.first() else {
            return Err(AnalysisError::NoResult {
                fen: position.to_string(),
            });
        };

        let evaluation = Evaluation::from_line(position, best);

        let warning = match self.store.upsert(&evaluation) {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    fen = %evaluation.position,
                    error = %e,
                    "Failed to store evaluation"
                );
                Some(format!("Evaluation not cached: {}", e))
            }
        };

        Ok(AnalysisOutcome {
            evaluation,
            cached: false,
            warning,
        })
    }

    /// Evaluate positions one after another, in the order given.
    ///
    /// Failures are counted and do not stop the batch.
    pub async fn analyze_batch<P: AsRef<str>>(
        &self,
        positions: &[P],
        depth: u32,
        time_limit: Duration,
    ) -> BatchSummary {
        let start = Instant::now();
        let mut summary = BatchSummary {
            total_positions: positions.len(),
            analyzed: 0,
            cached: 0,
            errors: 0,
            elapsed_seconds: 0.0,
        };

        for fen in positions {
            match self.analyze_one(fen.as_ref(), depth, time_limit, false).await {
                Ok(outcome) if outcome.cached => summary.cached += 1,
                Ok(_) => summary.analyzed += 1,
                Err(e) => {
                    tracing::warn!(fen = fen.as_ref(), error = %e, "Batch position failed");
                    summary.errors += 1;
                }
            }
        }

        summary.elapsed_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            total = summary.total_positions,
            analyzed = summary.analyzed,
            cached = summary.cached,
            errors = summary.errors,
            elapsed = summary.elapsed_seconds,
            "Batch analysis finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, LinesOutcome, SqliteEvaluationCache, UpsertOutcome};
    use crate::evaluation::{AnalysisLine, EngineLine};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uci::Score;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    const MATED: &str = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";

    /// Reaches the requested depth, except for positions it has nothing to say about.
    #[derive(Default)]
    struct FakeAnalyser {
        calls: AtomicUsize,
        silent: HashSet<String>,
    }

    impl FakeAnalyser {
        fn silent_on(fen: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                silent: [fen.to_string()].into_iter().collect(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Analyser for FakeAnalyser {
        async fn evaluate(
            &self,
            position: &Position,
            depth: u32,
            _time_limit: Duration,
            _multipv: u32,
        ) -> Result<Vec<EngineLine>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.silent.contains(position.as_str()) {
                return Ok(Vec::new());
            }
            Ok(vec![EngineLine {
                rank: 1,
                depth,
                seldepth: None,
                score: Some(Score::Cp(depth as i32)),
                nodes: Some(1000),
                pv: vec!["e2e4".to_string(), "e7e5".to_string()],
            }])
        }
    }

    struct BrokenStore;

    impl EvaluationStore for BrokenStore {
        fn get(&self, _position: &Position) -> Result<Option<Evaluation>, CacheError> {
            Ok(None)
        }

        fn upsert(&self, _candidate: &Evaluation) -> Result<UpsertOutcome, CacheError> {
            Err(CacheError::Database(rusqlite::Error::InvalidQuery))
        }

        fn upsert_lines(
            &self,
            _position: &Position,
            _depth: u32,
            _lines: &[AnalysisLine],
        ) -> Result<LinesOutcome, CacheError> {
            Err(CacheError::Database(rusqlite::Error::InvalidQuery))
        }
    }

    fn coordinator(analyser: FakeAnalyser) -> AnalysisCoordinator<FakeAnalyser, SqliteEvaluationCache> {
        AnalysisCoordinator::new(analyser, SqliteEvaluationCache::open(":memory:").unwrap())
    }

    const LIMIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn miss_computes_then_hit_is_cached() {
        let coord = coordinator(FakeAnalyser::default());

        let first = coord.analyze_one(START, 10, LIMIT, false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.evaluation.best_move.as_deref(), Some("e2e4"));
        assert_eq!(first.evaluation.score_cp(), Some(10));

        let second = coord.analyze_one(START, 10, LIMIT, false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.evaluation.best_move, first.evaluation.best_move);
        assert_eq!(second.evaluation.score_cp(), first.evaluation.score_cp());
        assert_eq!(coord.analyser().calls(), 1);
    }

    #[tokio::test]
    async fn shallower_request_is_served_from_deeper_cache() {
        let coord = coordinator(FakeAnalyser::default());
        coord.analyze_one(START, 20, LIMIT, false).await.unwrap();

        let outcome = coord.analyze_one(START, 12, LIMIT, false).await.unwrap();
        assert!(outcome.cached);
        assert_eq!(outcome.evaluation.depth, 20);
    }

    #[tokio::test]
    async fn deeper_request_recomputes() {
        let coord = coordinator(FakeAnalyser::default());
        coord.analyze_one(START, 10, LIMIT, false).await.unwrap();

        let outcome = coord.analyze_one(START, 18, LIMIT, false).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.evaluation.depth, 18);
        assert_eq!(coord.analyser().calls(), 2);
    }

    #[tokio::test]
    async fn force_recompute_bypasses_cache() {
        let coord = coordinator(FakeAnalyser::default());
        coord.analyze_one(START, 20, LIMIT, false).await.unwrap();

        let outcome = coord.analyze_one(START, 10, LIMIT, true).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(coord.analyser().calls(), 2);

        // The forced shallower result does not replace the deeper one.
        let stored = coord.store().get(&Position::start()).unwrap().unwrap();
        assert_eq!(stored.depth, 20);
    }

    #[tokio::test]
    async fn invalid_position_is_rejected_before_engine() {
        let coord = coordinator(FakeAnalyser::default());
        let err = coord.analyze_one("garbage", 10, LIMIT, false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPosition(_)));
        assert_eq!(coord.analyser().calls(), 0);
    }

    #[tokio::test]
    async fn empty_engine_result_is_an_error_and_not_cached() {
        let coord = coordinator(FakeAnalyser::silent_on(MATED));
        let err = coord.analyze_one(MATED, 10, LIMIT, false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoResult { .. }));

        let position = Position::parse(MATED).unwrap();
        assert!(coord.store().get(&position).unwrap().is_none());
    }

    #[tokio::test]
    async fn storage_failure_still_returns_evaluation() {
        let coord = AnalysisCoordinator::new(FakeAnalyser::default(), BrokenStore);
        let outcome = coord.analyze_one(START, 10, LIMIT, false).await.unwrap();
        assert!(!outcome.cached);
        assert!(outcome.warning.is_some());
        assert_eq!(outcome.evaluation.best_move.as_deref(), Some("e2e4"));
    }

    #[tokio::test]
    async fn batch_counts_errors_and_continues() {
        let coord = coordinator(FakeAnalyser::silent_on(MATED));
        let positions = [START, AFTER_E4, MATED, START];

        let summary = coord.analyze_batch(&positions, 15, LIMIT).await;
        assert_eq!(summary.total_positions, 4);
        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.errors, 1);

        let stored = coord
            .store()
            .get(&Position::parse(AFTER_E4).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.depth, 15);
    }
}
