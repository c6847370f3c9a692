//! Chess position evaluation types.

use crate::Position;
use chrono::{DateTime, Utc};
use shakmaty::Color;
use uci::{EngineInfo, Score};

/// Longest principal variation kept in a stored evaluation.
pub const PV_MAX_PLIES: usize = 10;

/// Shallowest depth at which live analysis is persisted.
pub const MIN_PERSIST_DEPTH: u32 = 15;

/// Number of ranked variations searched during live analysis.
pub const LIVE_MULTIPV: u32 = 3;

/// One variation reported by the engine, with the score from White's side.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineLine {
    /// Variation rank, 1 = best.
    pub rank: u32,
    pub depth: u32,
    pub seldepth: Option<u32>,
    /// Score from White's perspective. `None` if the engine sent no score.
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    /// Moves in UCI notation, uncapped.
    pub pv: Vec<String>,
}

impl EngineLine {
    /// Build from an info line searched with `side_to_move` to play.
    ///
    /// Returns `None` for lines without a depth, and for lines carrying
    /// neither a principal variation nor a score, such as `currmove` progress
    /// lines. A finished game is reported as a scored line with no moves
    /// (`info depth 0 score mate 0`).
    pub fn from_info(info: &EngineInfo, side_to_move: Color) -> Option<Self> {
        if !info.has_pv() && info.score.is_none() {
            return None;
        }
        let score = info.score.map(|s| match side_to_move {
            Color::White => s,
            Color::Black => s.negate(),
        });
        Some(Self {
            rank: info.rank(),
            depth: info.depth?,
            seldepth: info.seldepth,
            score,
            nodes: info.nodes,
            pv: info.pv.clone(),
        })
    }

    pub fn best_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }

    fn capped_pv(&self) -> Vec<String> {
        self.pv.iter().take(PV_MAX_PLIES).cloned().collect()
    }
}

/// The authoritative evaluation of a position.
///
/// Exactly one of `score_cp()` and `score_mate()` is set, unless the engine
/// gave no score at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub position: Position,
    pub best_move: Option<String>,
    /// Score from White's perspective.
    pub score: Option<Score>,
    pub depth: u32,
    /// Principal variation in UCI notation, at most [`PV_MAX_PLIES`] moves.
    pub principal_variation: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl Evaluation {
    /// Take the best move, score, depth and PV from an engine line.
    pub fn from_line(position: Position, line: &EngineLine) -> Self {
        Self {
            position,
            best_move: line.best_move().map(str::to_string),
            score: line.score,
            depth: line.depth,
            principal_variation: line.capped_pv(),
            computed_at: Utc::now(),
        }
    }

    pub fn score_cp(&self) -> Option<i32> {
        self.score.and_then(Score::centipawns)
    }

    pub fn score_mate(&self) -> Option<i32> {
        self.score.and_then(Score::mate)
    }
}

/// One of the top ranked variations for a position at a given depth.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisLine {
    /// 1..=3
    pub rank: u32,
    pub depth: u32,
    pub best_move: Option<String>,
    pub score: Option<Score>,
    pub principal_variation: Vec<String>,
}

impl AnalysisLine {
    pub fn from_line(line: &EngineLine) -> Self {
        Self {
            rank: line.rank,
            depth: line.depth,
            best_move: line.best_move().map(str::to_string),
            score: line.score,
            principal_variation: line.capped_pv(),
        }
    }

    pub fn score_cp(&self) -> Option<i32> {
        self.score.and_then(Score::centipawns)
    }

    pub fn score_mate(&self) -> Option<i32> {
        self.score.and_then(Score::mate)
    }
}
