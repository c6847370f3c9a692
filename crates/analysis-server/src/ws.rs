//! WebSocket handler for live analysis.
//!
//! A client opens `/ws/analyze`, sends one FEN (raw text or `{"fen": ...}`)
//! and then receives a stream of principal-variation updates from the shared
//! engine. Opening a new socket supersedes whichever stream is running; the
//! superseded socket is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chess_analysis::{LiveUpdate, Position, StreamEnd};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::AppState;

/// Updates buffered per socket before the stream starts dropping them.
const UPDATE_BUFFER: usize = 64;

/// Server-to-client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// One principal-variation line.
    Update(LiveUpdate),
    /// The request could not be served.
    Error { detail: String },
}

#[derive(Debug, Deserialize)]
struct FenRequest {
    fen: String,
}

/// Extract the FEN from the client's first frame.
fn requested_fen(text: &str) -> String {
    match serde_json::from_str::<FenRequest>(text) {
        Ok(request) => request.fen,
        Err(_) => text.trim().to_string(),
    }
}

/// Axum handler for WebSocket upgrade requests.
pub async fn ws_analyze(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            false
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(live) = state.live.clone() else {
        let detail = "Live analysis engine is not available".to_string();
        send_json(&mut sender, &WsMessage::Error { detail }).await;
        let _ = sender.close().await;
        return;
    };

    // Claim the engine as soon as the socket opens.
    let subscription = live.subscribe();
    let token = subscription.token();

    let fen = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break requested_fen(&text),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                tracing::debug!(token, "WebSocket closed before a position was sent");
                return;
            }
            Some(Ok(_)) => {}
        }
    };

    let position = match Position::parse(&fen) {
        Ok(position) => position,
        Err(e) => {
            let detail = format!("Invalid FEN: {}", e);
            send_json(&mut sender, &WsMessage::Error { detail }).await;
            let _ = sender.close().await;
            return;
        }
    };

    tracing::info!(token, fen = %position, "Live analysis requested");

    let (tx, mut rx) = mpsc::channel::<LiveUpdate>(UPDATE_BUFFER);
    let stream = subscription.run(&position, tx);

    let forward = async {
        loop {
            tokio::select! {
                update = rx.recv() => {
                    let Some(update) = update else { break };
                    if !send_json(&mut sender, &WsMessage::Update(update)).await {
                        break;
                    }
                }
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        // Dropping the receiver tells the stream the client is gone.
        drop(rx);
    };

    let (end, ()) = tokio::join!(stream, forward);
    match end {
        Ok(StreamEnd::Superseded) => {
            tracing::info!(token, "Live analysis superseded by a newer request");
        }
        Ok(StreamEnd::Disconnected) => {
            tracing::info!(token, "Live analysis client disconnected");
        }
        Ok(StreamEnd::EngineClosed) => {
            let detail = "Engine closed unexpectedly".to_string();
            send_json(&mut sender, &WsMessage::Error { detail }).await;
        }
        Err(e) => {
            tracing::error!(token, error = %e, "Live analysis failed");
            send_json(&mut sender, &WsMessage::Error { detail: e.to_string() }).await;
        }
    }
    let _ = sender.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_fen_accepts_raw_text() {
        assert_eq!(
            requested_fen("  8/8/8/8/8/8/8/K6k w - - 0 1\n"),
            "8/8/8/8/8/8/8/K6k w - - 0 1"
        );
    }

    #[test]
    fn test_requested_fen_accepts_json() {
        assert_eq!(
            requested_fen(r#"{"fen": "8/8/8/8/8/8/8/K6k b - - 0 1"}"#),
            "8/8/8/8/8/8/8/K6k b - - 0 1"
        );
    }

    #[test]
    fn test_ws_message_update_serialization() {
        let msg = WsMessage::Update(LiveUpdate {
            depth: 18,
            seldepth: Some(24),
            multipv: 1,
            score_cp: Some(-35),
            score_mate: None,
            best_move: Some("e7e5".to_string()),
            pv: vec!["e7e5".to_string(), "g1f3".to_string()],
            nodes: Some(1_200_000),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"update\""));
        assert!(json.contains("\"depth\":18"));
        assert!(json.contains("\"score_cp\":-35"));
        assert!(json.contains("\"score_mate\":null"));
        assert!(json.contains("\"best_move\":\"e7e5\""));
    }

    #[test]
    fn test_ws_message_error_serialization() {
        let msg = WsMessage::Error {
            detail: "Invalid FEN".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"error","detail":"Invalid FEN"}"#);
    }

    #[test]
    fn test_ws_message_deserialization() {
        let json = r#"{"type":"update","depth":3,"seldepth":null,"multipv":2,"score_cp":12,"score_mate":null,"best_move":"d2d4","pv":["d2d4"],"nodes":null}"#;
        match serde_json::from_str::<WsMessage>(json).unwrap() {
            WsMessage::Update(update) => {
                assert_eq!(update.multipv, 2);
                assert_eq!(update.best_move.as_deref(), Some("d2d4"));
            }
            other => panic!("Expected Update message, got {:?}", other),
        }
    }
}
