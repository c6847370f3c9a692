//! Shared setup for the server tests: a scripted UCI engine and app state.

#![allow(dead_code)]

use analysis_server::config::Config;
use analysis_server::{db, router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chess_analysis::EngineProcess;
use http_body_util::BodyExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tower::ServiceExt;

pub const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

pub const SCHOLARS_MATE: &str = r#"[Event "Casual Game"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0"#;

/// Answers every bounded search with the same three depth-12 lines and every
/// infinite search with three depth-1 lines, then waits for `stop`.
const ENGINE_SCRIPT: &str = r#"#!/bin/sh
searching=0
while read -r cmd rest; do
  case "$cmd" in
    uci) echo "id name ScriptEngine"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go)
      case "$rest" in
        *infinite*)
          searching=1
          echo "info depth 1 seldepth 1 multipv 1 score cp 20 nodes 100 pv e2e4 e7e5"
          echo "info depth 1 seldepth 1 multipv 2 score cp 15 nodes 100 pv d2d4 d7d5"
          echo "info depth 1 seldepth 1 multipv 3 score cp 10 nodes 100 pv g1f3 g8f6"
          ;;
        *)
          echo "info depth 12 seldepth 16 multipv 1 score cp 31 nodes 120000 pv e2e4 e7e5 g1f3"
          echo "info depth 12 seldepth 16 multipv 2 score cp 25 nodes 120000 pv d2d4 d7d5"
          echo "info depth 12 seldepth 16 multipv 3 score cp 18 nodes 120000 pv g1f3 g8f6"
          echo "bestmove e2e4 ponder e7e5"
          ;;
      esac
      ;;
    stop)
      if [ "$searching" = 1 ]; then searching=0; echo "bestmove e2e4"; fi
      ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Path of the scripted engine, written once per test binary before any
/// engine process is spawned.
pub fn engine_script() -> &'static Path {
    static SCRIPT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = SCRIPT.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script-engine.sh");
        std::fs::write(&path, ENGINE_SCRIPT).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

pub fn config() -> Config {
    Config {
        stockfish_path: engine_script().to_path_buf(),
        ..Config::default()
    }
}

pub fn state() -> AppState {
    let db = db::init_db(":memory:").unwrap();
    AppState::new(db, config(), None).unwrap()
}

pub async fn live_state() -> AppState {
    let db = db::init_db(":memory:").unwrap();
    let engine = EngineProcess::start(engine_script()).await.unwrap();
    AppState::new(db, config(), Some(engine)).unwrap()
}

pub fn app() -> Router {
    router(state())
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a `multipart/form-data` body with one field, as a file upload when
/// `filename` is given.
pub async fn post_multipart(
    app: &Router,
    uri: &str,
    field: &str,
    filename: Option<&str>,
    content: &[u8],
) -> (StatusCode, serde_json::Value) {
    const BOUNDARY: &str = "pgn-upload-boundary";
    let disposition = match filename {
        Some(filename) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, filename),
        None => format!("form-data; name=\"{}\"", field),
    };

    let mut body = format!("--{}\r\nContent-Disposition: {}\r\n\r\n", BOUNDARY, disposition)
        .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, json)
}
