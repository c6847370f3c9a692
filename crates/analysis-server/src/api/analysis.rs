//! Position analysis endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use chess_analysis::{Analyser, AnalysisError, EvaluationStore, Position};

use super::time_limit;
use crate::error::ApiError;
use crate::models::{
    AnalyzeRequest, EvalQuery, EvaluationResponse, Variation, VariationsRequest,
    VariationsResponse,
};
use crate::pgn::numbered_san;
use crate::AppState;

/// Most variations a single request may ask for.
pub const MAX_VARIATIONS: u32 = 5;

/// Depth passed to the engine for time-bound variation searches.
const VARIATION_DEPTH: u32 = 99;

/// Evaluate one position, from the cache when it is deep enough.
///
/// # Endpoint
///
/// `POST /analyze`
///
/// # Request Body
///
/// - `fen`: Position to evaluate (required)
/// - `depth`: Minimum depth (default: config `default_depth`)
/// - `time_limit`: Engine seconds (default: config `default_time_limit`)
/// - `force_recompute`: Skip the cache lookup (default: false)
///
/// # Response
///
/// - `200 OK`: Evaluation with `cached` and an optional storage `warning`
/// - `400 Bad Request`: Invalid FEN, out-of-range `time_limit`, no engine
///   result, or engine failure
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let defaults = &state.config.analysis;
    let depth = request.depth.unwrap_or(defaults.default_depth);
    let time_limit = time_limit(request.time_limit.unwrap_or(defaults.default_time_limit))?;

    let outcome = state
        .coordinator
        .analyze_one(&request.fen, depth, time_limit, request.force_recompute)
        .await?;

    Ok(Json(outcome.into()))
}

/// Top-N lines for a position in numbered SAN. Never cached.
///
/// # Endpoint
///
/// `POST /variations`
///
/// # Response
///
/// - `200 OK`: `{"variations": [...]}`, best first; empty for a finished game
/// - `400 Bad Request`: Invalid FEN, out-of-range `time_limit` or engine failure
pub async fn variations(
    State(state): State<AppState>,
    Json(request): Json<VariationsRequest>,
) -> Result<Json<VariationsResponse>, ApiError> {
    let position = Position::parse(&request.fen)?;
    let lines = request.lines.clamp(1, MAX_VARIATIONS);
    let time_limit = time_limit(
        request
            .time_limit
            .unwrap_or(state.config.analysis.variation_time_limit),
    )?;

    let found = state
        .coordinator
        .analyser()
        .evaluate(&position, VARIATION_DEPTH, time_limit, lines)
        .await
        .map_err(AnalysisError::from)?;

    let variations = found
        .iter()
        .map(|line| Variation {
            rank: line.rank,
            line: numbered_san(&position, &line.pv),
            score_cp: line.score.and_then(|s| s.centipawns()),
            score_mate: line.score.and_then(|s| s.mate()),
            depth: line.depth,
        })
        .collect();

    Ok(Json(VariationsResponse { variations }))
}

/// Stored evaluation for a position.
///
/// # Endpoint
///
/// `GET /evals?fen=...`
///
/// # Response
///
/// - `200 OK`: The cached evaluation
/// - `400 Bad Request`: Invalid FEN
/// - `404 Not Found`: Nothing stored for this position
pub async fn get_eval(
    State(state): State<AppState>,
    Query(query): Query<EvalQuery>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let position = Position::parse(&query.fen)?;
    let evaluation = state
        .coordinator
        .store()
        .get(&position)?
        .ok_or_else(|| ApiError::NotFound(format!("No evaluation stored for {}", position)))?;

    Ok(Json(EvaluationResponse::stored(evaluation)))
}
