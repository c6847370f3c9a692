//! UCI (Universal Chess Interface) protocol library.
//!
//! Types for talking to a UCI engine over its line-oriented text protocol:
//! commands are formatted with [`GuiCommand::to_uci`], and everything the
//! engine prints is classified by [`EngineMessage::parse`].
//!
//! # Commands used for analysis
//!
//! - `uci` / `uciok` - Handshake
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Clear hash and history
//! - `setoption name <name> value <value>` - Configure (MultiPV, UCI_AnalyseMode)
//! - `position fen <fen>` - Set position
//! - `go [depth <d>] [movetime <ms>] [infinite]` - Start search
//! - `stop` - Stop search, engine answers with `bestmove`
//! - `quit` - Exit engine

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, InfoBuilder, Score, ScoreBound};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification (`id name ...` or `id author ...`).
    Id { key: String, value: String },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `None` when the position has no legal moves.
    BestMove { mv: Option<String>, ponder: Option<String> },
    /// Anything else: option declarations, banners, malformed info lines.
    Other(String),
}

impl EngineMessage {
    /// Classify one line of engine output. Never fails; lines that do not
    /// match a known shape come back as [`EngineMessage::Other`].
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("uciok") => EngineMessage::UciOk,
            Some("readyok") => EngineMessage::ReadyOk,
            Some("id") => match parts.next() {
                Some(key) => EngineMessage::Id {
                    key: key.to_string(),
                    value: parts.collect::<Vec<_>>().join(" "),
                },
                None => EngineMessage::Other(line.to_string()),
            },
            Some("bestmove") => {
                let mv = parts
                    .next()
                    .filter(|m| *m != "(none)" && *m != "0000")
                    .map(str::to_string);
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(str::to_string),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            Some("info") => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Other(line.to_string()),
            },
            _ => EngineMessage::Other(line.to_string()),
        }
    }

    /// Format message for output.
    pub fn to_uci(&self) -> String {
        match self {
            EngineMessage::Id { key, value } => format!("id {} {}", key, value),
            EngineMessage::UciOk => "uciok".to_string(),
            EngineMessage::ReadyOk => "readyok".to_string(),
            EngineMessage::Info(info) => info.to_uci(),
            EngineMessage::BestMove { mv, ponder } => {
                let mv = mv.as_deref().unwrap_or("(none)");
                match ponder {
                    Some(p) => format!("bestmove {} ponder {}", mv, p),
                    None => format!("bestmove {}", mv),
                }
            }
            EngineMessage::Other(raw) => raw.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handshake_lines() {
        assert_eq!(EngineMessage::parse("uciok\n"), EngineMessage::UciOk);
        assert_eq!(EngineMessage::parse("readyok"), EngineMessage::ReadyOk);
        assert_eq!(
            EngineMessage::parse("id name Stockfish 16"),
            EngineMessage::Id {
                key: "name".to_string(),
                value: "Stockfish 16".to_string()
            }
        );
    }

    #[test]
    fn parse_bestmove() {
        assert_eq!(
            EngineMessage::parse("bestmove e2e4 ponder e7e5"),
            EngineMessage::BestMove {
                mv: Some("e2e4".to_string()),
                ponder: Some("e7e5".to_string())
            }
        );
        assert_eq!(
            EngineMessage::parse("bestmove (none)"),
            EngineMessage::BestMove {
                mv: None,
                ponder: None
            }
        );
    }

    #[test]
    fn malformed_info_is_other() {
        let msg = EngineMessage::parse("info depth abc pv e2e4");
        assert_eq!(msg, EngineMessage::Other("info depth abc pv e2e4".to_string()));
    }

    #[test]
    fn option_declarations_are_other() {
        let msg = EngineMessage::parse("option name Hash type spin default 16 min 1 max 33554432");
        assert!(matches!(msg, EngineMessage::Other(_)));
    }

    #[test]
    fn bestmove_to_uci() {
        let msg = EngineMessage::BestMove {
            mv: Some("g1f3".to_string()),
            ponder: None,
        };
        assert_eq!(msg.to_uci(), "bestmove g1f3");
        assert_eq!(EngineMessage::parse(&msg.to_uci()), msg);
    }
}
