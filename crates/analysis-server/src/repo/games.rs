//! Game repository for database operations.

use crate::db::DbPool;
use crate::models::{GamePosition, GameSummary};
use crate::pgn::{GameHeaders, ParsedGame};
use rusqlite::{params, Result as SqliteResult};
use std::sync::{MutexGuard, PoisonError};

/// Repository for uploaded games and their positions.
pub struct GameRepo {
    db: DbPool,
}

impl GameRepo {
    /// Create a new game repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a parsed game and all of its positions in one transaction.
    ///
    /// Returns the new game's ID.
    pub fn insert(&self, game: &ParsedGame, raw_pgn: &str) -> SqliteResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        let h = &game.headers;

        tx.execute(
            "INSERT INTO games (event, site, white, black, date, result, raw_pgn, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![h.event, h.site, h.white, h.black, h.date, h.result, raw_pgn, now],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO moves (game_id, ply, san, fen, comment) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in &game.positions {
                stmt.execute(params![id, record.ply, record.san, record.fen, record.comment])?;
            }
        }
        tx.commit()?;

        tracing::info!(game_id = id, plies = game.positions.len(), "Stored game");
        Ok(id)
    }

    /// List all games, newest first.
    pub fn list(&self) -> SqliteResult<Vec<GameSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.event, g.site, g.white, g.black, g.date, g.result, g.created_at,
                    (SELECT COUNT(*) FROM moves m WHERE m.game_id = g.id AND m.ply > 0)
             FROM games g
             ORDER BY g.id DESC",
        )?;

        let games = stmt
            .query_map([], |row| {
                Ok(GameSummary {
                    id: row.get(0)?,
                    headers: GameHeaders {
                        event: row.get(1)?,
                        site: row.get(2)?,
                        white: row.get(3)?,
                        black: row.get(4)?,
                        date: row.get(5)?,
                        result: row.get(6)?,
                    },
                    created_at: row.get(7)?,
                    total_moves: row.get::<_, i64>(8)?.try_into().unwrap_or_default(),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(games)
    }

    /// All stored positions of a game, ordered by ply.
    ///
    /// Empty if the game does not exist.
    pub fn positions(&self, game_id: i64) -> SqliteResult<Vec<GamePosition>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT ply, fen, san, comment FROM moves WHERE game_id = ?1 ORDER BY ply")?;

        let positions = stmt
            .query_map([game_id], |row| {
                Ok(GamePosition {
                    ply: row.get(0)?,
                    fen: row.get(1)?,
                    san: row.get(2)?,
                    comment: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(positions)
    }
}
