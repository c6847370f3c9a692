//! Depth-aware evaluation cache.
//!
//! Stored evaluations only ever get deeper: a write for a position whose
//! stored depth is greater than the candidate's is rejected. The check and the
//! write happen in one SQL statement, so concurrent writers (even on separate
//! connections to the same file) cannot interleave a shallower result over a
//! deeper one.

use crate::evaluation::{AnalysisLine, Evaluation, MIN_PERSIST_DEPTH};
use crate::Position;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use uci::Score;

/// Thread-safe database connection pool.
pub type DbPool = Arc<Mutex<Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the cache's storage layer.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Corrupt cache row for {fen}: {reason}")]
    Corrupt { fen: String, reason: String },
}

/// What an [`EvaluationStore::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No evaluation existed for the position.
    Inserted,
    /// The candidate was at least as deep and replaced the stored one.
    Updated,
    /// The stored evaluation is deeper; nothing changed.
    Rejected,
}

/// What an [`EvaluationStore::upsert_lines`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinesOutcome {
    /// Replaced the ranked lines for the depth with this many rows.
    Stored(usize),
    /// Depth is under [`MIN_PERSIST_DEPTH`].
    BelowThreshold,
    /// The position's authoritative evaluation is deeper.
    Shallower,
}

/// Storage contract for evaluations.
pub trait EvaluationStore: Send + Sync {
    /// The authoritative evaluation for `position`, if any.
    fn get(&self, position: &Position) -> Result<Option<Evaluation>, CacheError>;

    /// Store `candidate` unless a deeper evaluation is already stored.
    fn upsert(&self, candidate: &Evaluation) -> Result<UpsertOutcome, CacheError>;

    /// Replace the ranked lines stored for `(position, depth)`.
    fn upsert_lines(
        &self,
        position: &Position,
        depth: u32,
        lines: &[AnalysisLine],
    ) -> Result<LinesOutcome, CacheError>;
}

/// Create the cache tables if they don't exist.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS evals (
            fen TEXT PRIMARY KEY,
            best_move TEXT,
            score_cp INTEGER,
            score_mate INTEGER,
            depth INTEGER NOT NULL,
            pv TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analysis_lines (
            fen TEXT NOT NULL,
            depth INTEGER NOT NULL,
            line_number INTEGER NOT NULL CHECK (line_number BETWEEN 1 AND 3),
            best_move TEXT,
            score_cp INTEGER,
            score_mate INTEGER,
            pv TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL,
            PRIMARY KEY (fen, depth, line_number)
        );
        ",
    )
}

/// SQLite-backed [`EvaluationStore`].
#[derive(Clone)]
pub struct SqliteEvaluationCache {
    db: DbPool,
}

impl SqliteEvaluationCache {
    /// Open (or create) a cache database at `path`. Use `:memory:` for tests.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Use an existing connection pool, creating the cache tables if needed.
    pub fn from_pool(db: DbPool) -> Result<Self, CacheError> {
        init_schema(&lock(&db))?;
        Ok(Self { db })
    }

    /// Ranked lines stored for `(position, depth)`, best first.
    pub fn lines(&self, position: &Position, depth: u32) -> Result<Vec<AnalysisLine>, CacheError> {
        let conn = lock(&self.db);
        let mut stmt = conn.prepare(
            "SELECT line_number, best_move, score_cp, score_mate, pv
             FROM analysis_lines WHERE fen = ?1 AND depth = ?2
             ORDER BY line_number",
        )?;

        let rows = stmt.query_map(params![position.as_str(), depth], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i32>>(2)?,
                row.get::<_, Option<i32>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let (rank, best_move, cp, mate, pv) = row?;
            lines.push(AnalysisLine {
                rank,
                depth,
                best_move,
                score: decode_score(position, cp, mate)?,
                principal_variation: split_pv(&pv),
            });
        }
        Ok(lines)
    }
}

impl EvaluationStore for SqliteEvaluationCache {
    fn get(&self, position: &Position) -> Result<Option<Evaluation>, CacheError> {
        let conn = lock(&self.db);
        let row = conn
            .query_row(
                "SELECT best_move, score_cp, score_mate, depth, pv, updated_at
                 FROM evals WHERE fen = ?1",
                [position.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<i32>>(1)?,
                        row.get::<_, Option<i32>>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((best_move, cp, mate, depth, pv, updated_at)) = row else {
            return Ok(None);
        };

        let computed_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| CacheError::Corrupt {
                fen: position.to_string(),
                reason: format!("bad timestamp '{}': {}", updated_at, e),
            })?
            .with_timezone(&Utc);

        Ok(Some(Evaluation {
            position: position.clone(),
            best_move,
            score: decode_score(position, cp, mate)?,
            depth,
            principal_variation: split_pv(&pv),
            computed_at,
        }))
    }

    fn upsert(&self, candidate: &Evaluation) -> Result<UpsertOutcome, CacheError> {
        let mut conn = lock(&self.db);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existed = tx
            .query_row(
                "SELECT 1 FROM evals WHERE fen = ?1",
                [candidate.position.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let changed = tx.execute(
            "INSERT INTO evals (fen, best_move, score_cp, score_mate, depth, pv, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(fen) DO UPDATE SET
                best_move = excluded.best_move,
                score_cp = excluded.score_cp,
                score_mate = excluded.score_mate,
                depth = excluded.depth,
                pv = excluded.pv,
                updated_at = excluded.updated_at
             WHERE excluded.depth >= evals.depth",
            params![
                candidate.position.as_str(),
                candidate.best_move,
                candidate.score_cp(),
                candidate.score_mate(),
                candidate.depth,
                candidate.principal_variation.join(" "),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        let outcome = match (existed, changed) {
            (_, 0) => UpsertOutcome::Rejected,
            (false, _) => UpsertOutcome::Inserted,
            (true, _) => UpsertOutcome::Updated,
        };
        tracing::debug!(
            fen = %candidate.position,
            depth = candidate.depth,
            ?outcome,
            "Evaluation upsert"
        );
        Ok(outcome)
    }

    fn upsert_lines(
        &self,
        position: &Position,
        depth: u32,
        lines: &[AnalysisLine],
    ) -> Result<LinesOutcome, CacheError> {
        if depth < MIN_PERSIST_DEPTH {
            return Ok(LinesOutcome::BelowThreshold);
        }

        let mut conn = lock(&self.db);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_depth: Option<u32> = tx
            .query_row(
                "SELECT depth FROM evals WHERE fen = ?1",
                [position.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if stored_depth.is_some_and(|stored| depth < stored) {
            return Ok(LinesOutcome::Shallower);
        }

        tx.execute(
            "DELETE FROM analysis_lines WHERE fen = ?1 AND depth = ?2",
            params![position.as_str(), depth],
        )?;

        let now = Utc::now().to_rfc3339();
        let mut stored = 0;
        for line in lines.iter().filter(|l| (1..=3).contains(&l.rank)) {
            tx.execute(
                "INSERT OR REPLACE INTO analysis_lines
                    (fen, depth, line_number, best_move, score_cp, score_mate, pv, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    position.as_str(),
                    depth,
                    line.rank,
                    line.best_move,
                    line.score_cp(),
                    line.score_mate(),
                    line.principal_variation.join(" "),
                    now,
                ],
            )?;
            stored += 1;
        }
        tx.commit()?;

        tracing::debug!(fen = %position, depth, stored, "Analysis lines stored");
        Ok(LinesOutcome::Stored(stored))
    }
}

fn lock(db: &DbPool) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode_score(
    position: &Position,
    cp: Option<i32>,
    mate: Option<i32>,
) -> Result<Option<Score>, CacheError> {
    match (cp, mate) {
        (Some(cp), None) => Ok(Some(Score::Cp(cp))),
        (None, Some(mate)) => Ok(Some(Score::Mate(mate))),
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(CacheError::Corrupt {
            fen: position.to_string(),
            reason: "both centipawn and mate scores set".to_string(),
        }),
    }
}

fn split_pv(pv: &str) -> Vec<String> {
    pv.split_whitespace().map(str::to_string).collect()
}
