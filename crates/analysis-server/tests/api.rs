//! HTTP endpoint tests against a scripted UCI engine.

#![cfg(unix)]

mod common;

use analysis_server::config::Config;
use analysis_server::{db, router, AppState};
use axum::http::StatusCode;
use common::{app, get, post, post_multipart, AFTER_E4, SCHOLARS_MATE, START};
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints() {
    let app = app();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, body) = get(&app, "/health/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_analyze_then_cached() {
    let app = app();
    let request = json!({ "fen": START, "depth": 10, "time_limit": 1.0 });

    let (status, first) = post(&app, "/analyze", request.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["cached"], false);
    assert_eq!(first["best_move"], "e2e4");
    assert_eq!(first["score_cp"], 31);
    assert_eq!(first["depth"], 12);
    assert_eq!(first["pv"], json!(["e2e4", "e7e5", "g1f3"]));
    assert!(first.get("warning").is_none());

    let (status, second) = post(&app, "/analyze", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["score_cp"], 31);
    assert_eq!(second["depth"], 12);
}

#[tokio::test]
async fn test_analyze_deeper_request_recomputes() {
    let app = app();

    let (_, first) = post(&app, "/analyze", json!({ "fen": START, "depth": 10 })).await;
    assert_eq!(first["cached"], false);

    // Stored depth 12 does not satisfy a depth 20 request.
    let (status, second) = post(&app, "/analyze", json!({ "fen": START, "depth": 20 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], false);
}

#[tokio::test]
async fn test_analyze_force_recompute_skips_cache() {
    let app = app();
    let request = json!({ "fen": START, "depth": 10 });

    post(&app, "/analyze", request.clone()).await;
    let (status, forced) = post(
        &app,
        "/analyze",
        json!({ "fen": START, "depth": 10, "force_recompute": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forced["cached"], false);
}

#[tokio::test]
async fn test_analyze_black_to_move_reports_white_perspective() {
    let app = app();

    let (status, body) = post(&app, "/analyze", json!({ "fen": AFTER_E4, "depth": 10 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score_cp"], -31);
}

#[tokio::test]
async fn test_analyze_invalid_fen_is_bad_request() {
    let app = app();

    let (status, body) = post(&app, "/analyze", json!({ "fen": "not a fen" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("not a fen"));
}

#[tokio::test]
async fn test_analyze_missing_engine_is_bad_request() {
    let config = Config {
        stockfish_path: "/nonexistent/engine".into(),
        ..Config::default()
    };
    let state = AppState::new(db::init_db(":memory:").unwrap(), config, None).unwrap();
    let app = router(state);

    let (status, body) = post(&app, "/analyze", json!({ "fen": START, "depth": 10 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_get_eval_after_analyze() {
    let app = app();
    let uri = format!("/evals?fen={}", START.replace(' ', "%20").replace('/', "%2F"));

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    post(&app, "/analyze", json!({ "fen": START, "depth": 10 })).await;

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["best_move"], "e2e4");
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn test_variations_in_numbered_san() {
    let app = app();

    let (status, body) = post(&app, "/variations", json!({ "fen": START, "lines": 3 })).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let variations = body["variations"].as_array().unwrap();
    assert_eq!(variations.len(), 3);
    assert_eq!(variations[0]["rank"], 1);
    assert_eq!(variations[0]["line"], "1. e4 e5 2. Nf3");
    assert_eq!(variations[0]["score_cp"], 31);
    assert_eq!(variations[1]["line"], "1. d4 d5");
    assert_eq!(variations[2]["line"], "1. Nf3 Nf6");
    assert_eq!(variations[2]["score_cp"], 18);
}

#[tokio::test]
async fn test_variations_are_not_cached() {
    let app = app();
    let uri = format!("/evals?fen={}", START.replace(' ', "%20").replace('/', "%2F"));

    post(&app, "/variations", json!({ "fen": START, "lines": 2 })).await;

    let (status, _) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_variations_respect_line_count() {
    let app = app();

    let (status, body) = post(&app, "/variations", json!({ "fen": START, "lines": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_game_upload_list_and_moves() {
    let app = app();

    let (status, uploaded) = post(&app, "/games", json!({ "pgn": SCHOLARS_MATE })).await;
    assert_eq!(status, StatusCode::OK, "{}", uploaded);
    assert_eq!(uploaded["total_moves"], 7);
    assert_eq!(uploaded["headers"]["white"], "Alice");
    let id = uploaded["id"].as_i64().unwrap();

    let (status, list) = get(&app, "/games").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total_games"], 1);
    assert_eq!(list["games"][0]["id"], id);
    assert_eq!(list["games"][0]["total_moves"], 7);

    let (status, moves) = get(&app, &format!("/games/{}/moves", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moves["total_moves"], 7);
    let positions = moves["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 8);
    assert_eq!(positions[0]["ply"], 0);
    assert_eq!(positions[0]["fen"], START);
    assert_eq!(positions[1]["san"], "e4");
    assert_eq!(positions[7]["san"], "Qxf7#");
}

#[tokio::test]
async fn test_game_analysis_reuses_cache() {
    let app = app();

    let (_, uploaded) = post(&app, "/games", json!({ "pgn": SCHOLARS_MATE })).await;
    let id = uploaded["id"].as_i64().unwrap();
    let uri = format!("/games/{}/analyze", id);

    let (status, first) = post(&app, &uri, json!({ "depth": 10, "time_limit": 1.0 })).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["game_id"], id);
    assert_eq!(first["total_positions"], 8);
    assert_eq!(first["analyzed"], 8);
    assert_eq!(first["cached"], 0);
    assert_eq!(first["errors"], 0);

    let (status, second) = post(&app, &uri, json!({ "depth": 10 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["analyzed"], 0);
    assert_eq!(second["cached"], 8);
}

#[tokio::test]
async fn test_game_upload_rejects_empty_pgn() {
    let app = app();

    let (status, body) = post(&app, "/games", json!({ "pgn": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_unknown_game_is_not_found() {
    let app = app();

    let (status, _) = get(&app, "/games/42/moves").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&app, "/games/42/analyze", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_time_limits_are_bad_requests() {
    let app = app();

    let (status, body) = post(&app, "/analyze", json!({ "fen": START, "time_limit": 1e19 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("time_limit"));

    let (status, _) = post(&app, "/variations", json!({ "fen": START, "time_limit": 1e19 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, uploaded) = post(&app, "/games", json!({ "pgn": SCHOLARS_MATE })).await;
    let uri = format!("/games/{}/analyze", uploaded["id"]);
    let (status, _) = post(&app, &uri, json!({ "time_limit": -1.0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_game_upload_from_multipart_file() {
    let app = app();

    let (status, uploaded) =
        post_multipart(&app, "/games", "file", Some("game.pgn"), SCHOLARS_MATE.as_bytes()).await;
    assert_eq!(status, StatusCode::OK, "{}", uploaded);
    assert_eq!(uploaded["total_moves"], 7);
    assert_eq!(uploaded["headers"]["black"], "Bob");
}

#[tokio::test]
async fn test_game_upload_decodes_latin1_file() {
    let app = app();
    let pgn = b"[White \"R\xe9ti\"]\n\n1. Nf3 d5 *";

    let (status, uploaded) = post_multipart(&app, "/games", "file", Some("reti.pgn"), pgn).await;
    assert_eq!(status, StatusCode::OK, "{}", uploaded);
    assert_eq!(uploaded["headers"]["white"], "R\u{e9}ti");
    assert_eq!(uploaded["total_moves"], 2);
}

#[tokio::test]
async fn test_game_upload_from_form_field() {
    let app = app();

    let (status, uploaded) = post_multipart(&app, "/games", "pgn", None, b"1. d4 d5 2. c4 *").await;
    assert_eq!(status, StatusCode::OK, "{}", uploaded);
    assert_eq!(uploaded["total_moves"], 3);
}

#[tokio::test]
async fn test_game_upload_rejects_empty_file() {
    let app = app();

    let (status, body) = post_multipart(&app, "/games", "file", Some("empty.pgn"), b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Uploaded PGN file is empty");
}

#[tokio::test]
async fn test_game_moves_include_comments() {
    let app = app();
    let pgn = "1. e4 {Best by test} e5 (1... c5 {Sicilian}) 2. Nf3 *";

    let (_, uploaded) = post(&app, "/games", json!({ "pgn": pgn })).await;
    let (status, moves) = get(&app, &format!("/games/{}/moves", uploaded["id"])).await;
    assert_eq!(status, StatusCode::OK);

    let positions = moves["positions"].as_array().unwrap();
    assert_eq!(positions[0]["comment"], serde_json::Value::Null);
    assert_eq!(positions[1]["comment"], "Best by test");
    assert_eq!(positions[2]["comment"], serde_json::Value::Null);
    assert_eq!(positions[3]["comment"], serde_json::Value::Null);
}
