//! Database module for the analysis server.

use chess_analysis::cache;
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub use chess_analysis::DbPool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize database with schema.
///
/// Creates all necessary tables:
/// - `games`: Uploaded PGN games and their headers
/// - `moves`: One row per ply with the position after it
/// - `evals` / `analysis_lines`: The evaluation cache
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file (use `:memory:` for in-memory)
///
/// # Errors
///
/// Returns an error if the database cannot be opened or schema creation fails.
pub fn init_db<P: AsRef<Path>>(path: P) -> SqliteResult<DbPool> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event TEXT NOT NULL,
            site TEXT NOT NULL,
            white TEXT NOT NULL,
            black TEXT NOT NULL,
            date TEXT NOT NULL,
            result TEXT NOT NULL,
            raw_pgn TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS moves (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
            ply INTEGER NOT NULL,
            san TEXT NOT NULL,
            fen TEXT NOT NULL,
            comment TEXT,
            UNIQUE(game_id, ply)
        );

        CREATE INDEX IF NOT EXISTS idx_moves_game ON moves(game_id);
        CREATE INDEX IF NOT EXISTS idx_moves_fen ON moves(fen);
        ",
    )?;
    cache::init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Round-trip a trivial query to prove the database answers.
pub fn ping(db: &DbPool) -> SqliteResult<()> {
    let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
    conn.query_row("SELECT 1", [], |_| Ok(()))
}
