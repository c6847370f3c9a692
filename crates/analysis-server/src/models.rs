//! API models for serialization.

use chess_analysis::{AnalysisOutcome, BatchSummary, Evaluation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pgn::GameHeaders;

/// Body of `POST /analyze`. Missing limits fall back to the server config.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub fen: String,
    pub depth: Option<u32>,
    /// Seconds.
    pub time_limit: Option<f64>,
    #[serde(default)]
    pub force_recompute: bool,
}

/// A stored or freshly computed evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub fen: String,
    pub best_move: Option<String>,
    /// Centipawns, positive = White is better.
    pub score_cp: Option<i32>,
    /// Mate distance, positive = White mates.
    pub score_mate: Option<i32>,
    pub depth: u32,
    pub pv: Vec<String>,
    pub cached: bool,
    pub computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl EvaluationResponse {
    pub fn stored(evaluation: Evaluation) -> Self {
        Self {
            fen: evaluation.position.to_string(),
            best_move: evaluation.best_move.clone(),
            score_cp: evaluation.score_cp(),
            score_mate: evaluation.score_mate(),
            depth: evaluation.depth,
            pv: evaluation.principal_variation,
            cached: true,
            computed_at: evaluation.computed_at,
            warning: None,
        }
    }
}

impl From<AnalysisOutcome> for EvaluationResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            cached: outcome.cached,
            warning: outcome.warning,
            ..Self::stored(outcome.evaluation)
        }
    }
}

/// Body of `POST /variations`.
#[derive(Debug, Clone, Deserialize)]
pub struct VariationsRequest {
    pub fen: String,
    #[serde(default = "default_lines")]
    pub lines: u32,
    /// Seconds.
    pub time_limit: Option<f64>,
}

fn default_lines() -> u32 {
    3
}

/// One ranked line in numbered SAN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    pub rank: u32,
    pub line: String,
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationsResponse {
    pub variations: Vec<Variation>,
}

/// Query of `GET /evals`.
#[derive(Debug, Deserialize)]
pub struct EvalQuery {
    pub fen: String,
}

/// Body of `POST /games`.
#[derive(Debug, Deserialize)]
pub struct UploadGameRequest {
    pub pgn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadGameResponse {
    pub id: i64,
    pub headers: GameHeaders,
    pub total_moves: usize,
}

/// A stored game without its moves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSummary {
    pub id: i64,
    #[serde(flatten)]
    pub headers: GameHeaders,
    pub total_moves: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameList {
    pub total_games: usize,
    pub games: Vec<GameSummary>,
}

/// One stored position of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GamePosition {
    pub ply: u32,
    pub fen: String,
    pub san: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMoves {
    pub game_id: i64,
    /// Half-moves, not counting the starting position.
    pub total_moves: usize,
    pub positions: Vec<GamePosition>,
}

/// Body of `POST /games/:id/analyze`. Missing limits fall back to the
/// server config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeGameRequest {
    pub depth: Option<u32>,
    /// Seconds.
    pub time_limit: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameAnalysisSummary {
    pub game_id: i64,
    pub total_positions: usize,
    pub analyzed: usize,
    pub cached: usize,
    pub errors: usize,
    pub elapsed_seconds: f64,
}

impl GameAnalysisSummary {
    pub fn new(game_id: i64, summary: BatchSummary) -> Self {
        Self {
            game_id,
            total_positions: summary.total_positions,
            analyzed: summary.analyzed,
            cached: summary.cached,
            errors: summary.errors,
            elapsed_seconds: summary.elapsed_seconds,
        }
    }
}
