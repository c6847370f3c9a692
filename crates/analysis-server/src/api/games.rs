//! Game upload and game analysis endpoints.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header,
    Json,
};

use super::time_limit;
use crate::error::ApiError;
use crate::models::{
    AnalyzeGameRequest, GameAnalysisSummary, GameList, GameMoves, UploadGameRequest,
    UploadGameResponse,
};
use crate::pgn::{decode_pgn, parse_pgn};
use crate::repo::GameRepo;
use crate::AppState;

/// PGN text from either a JSON body `{"pgn": ...}` or a multipart form with
/// a `file` upload or a `pgn` text field.
pub struct PgnUpload(pub String);

#[async_trait]
impl<S> FromRequest<S> for PgnUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(body) = Json::<UploadGameRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return Ok(PgnUpload(body.pgn));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let unreadable = |e: axum::extract::multipart::MultipartError| {
            ApiError::BadRequest(format!("Failed to read PGN: {}", e))
        };

        let mut form_pgn = None;
        while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let bytes = field.bytes().await.map_err(unreadable)?;
                    if bytes.is_empty() {
                        return Err(ApiError::BadRequest(
                            "Uploaded PGN file is empty".to_string(),
                        ));
                    }
                    return Ok(PgnUpload(decode_pgn(&bytes)));
                }
                Some("pgn") => {
                    let bytes = field.bytes().await.map_err(unreadable)?;
                    form_pgn = Some(decode_pgn(&bytes));
                }
                _ => {}
            }
        }
        Ok(PgnUpload(form_pgn.unwrap_or_default()))
    }
}

/// Store a PGN game and every position of its main line.
///
/// # Endpoint
///
/// `POST /games`
///
/// # Request Body
///
/// JSON `{"pgn": "..."}`, or `multipart/form-data` with a `file` upload
/// (UTF-8 or Latin-1) or a `pgn` field.
///
/// # Response
///
/// - `200 OK`: New game ID, headers and number of half-moves
/// - `400 Bad Request`: Empty PGN, illegal move or bad `FEN` tag
pub async fn upload_game(
    State(state): State<AppState>,
    PgnUpload(pgn): PgnUpload,
) -> Result<Json<UploadGameResponse>, ApiError> {
    let pgn = pgn.trim();
    let game = parse_pgn(pgn)?;
    let id = GameRepo::new(state.db.clone()).insert(&game, pgn)?;

    Ok(Json(UploadGameResponse {
        id,
        total_moves: game.total_moves(),
        headers: game.headers,
    }))
}

/// List stored games, newest first.
///
/// # Endpoint
///
/// `GET /games`
pub async fn list_games(State(state): State<AppState>) -> Result<Json<GameList>, ApiError> {
    let games = GameRepo::new(state.db.clone()).list()?;
    Ok(Json(GameList {
        total_games: games.len(),
        games,
    }))
}

/// All positions of a game in ply order, starting with ply 0.
///
/// # Endpoint
///
/// `GET /games/:id/moves`
///
/// # Response
///
/// - `200 OK`: Positions with FEN and SAN
/// - `404 Not Found`: No moves stored for this game
pub async fn get_game_moves(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameMoves>, ApiError> {
    let positions = GameRepo::new(state.db.clone()).positions(game_id)?;
    if positions.is_empty() {
        return Err(ApiError::NotFound(format!("No moves for game {}", game_id)));
    }

    Ok(Json(GameMoves {
        game_id,
        total_moves: positions.len() - 1,
        positions,
    }))
}

/// Evaluate every position of a stored game, reusing cached evaluations.
///
/// # Endpoint
///
/// `POST /games/:id/analyze`
///
/// # Request Body
///
/// - `depth`: Per-position depth (default: config `batch_depth`)
/// - `time_limit`: Per-position engine seconds (default: config `batch_time_limit`)
///
/// # Response
///
/// - `200 OK`: Counts of analyzed, cached and failed positions
/// - `400 Bad Request`: Out-of-range `time_limit`
/// - `404 Not Found`: No moves stored for this game
pub async fn analyze_game(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    body: Option<Json<AnalyzeGameRequest>>,
) -> Result<Json<GameAnalysisSummary>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = &state.config.analysis;
    let depth = request.depth.unwrap_or(defaults.batch_depth);
    let time_limit = time_limit(request.time_limit.unwrap_or(defaults.batch_time_limit))?;

    let positions = GameRepo::new(state.db.clone()).positions(game_id)?;
    if positions.is_empty() {
        return Err(ApiError::NotFound(format!("No moves for game {}", game_id)));
    }

    let fens: Vec<&str> = positions.iter().map(|p| p.fen.as_str()).collect();
    tracing::info!(game_id, positions = fens.len(), depth, "Analyzing game");
    let summary = state
        .coordinator
        .analyze_batch(&fens, depth, time_limit)
        .await;

    Ok(Json(GameAnalysisSummary::new(game_id, summary)))
}
