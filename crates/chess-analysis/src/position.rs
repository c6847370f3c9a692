//! Validated board positions.

use serde::{Serialize, Serializer};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, Position as _};
use std::fmt;
use thiserror::Error;

/// Errors produced when a position string is not a legal board state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    /// The input was empty or only whitespace.
    #[error("Position is empty")]
    Empty,
    /// The input is not syntactically valid FEN.
    #[error("Malformed FEN '{fen}': {reason}")]
    Malformed { fen: String, reason: String },
    /// The FEN parses but describes an impossible position.
    #[error("Illegal position '{fen}': {reason}")]
    Illegal { fen: String, reason: String },
}

/// A board state identified by its FEN string.
///
/// Identity is exact string equality of the (trimmed) input. Two FENs that
/// describe the same board with different move counters are different
/// positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    fen: String,
    turn: Color,
}

impl Position {
    /// Validate `text` as a FEN of a legal standard-chess position.
    ///
    /// # Errors
    ///
    /// - [`PositionError::Empty`] for blank input
    /// - [`PositionError::Malformed`] if the FEN syntax is wrong
    /// - [`PositionError::Illegal`] if the position cannot occur (e.g. missing king)
    pub fn parse(text: &str) -> Result<Self, PositionError> {
        let fen_str = text.trim();
        if fen_str.is_empty() {
            return Err(PositionError::Empty);
        }

        let fen: Fen = fen_str.parse().map_err(|e: shakmaty::fen::ParseFenError| {
            PositionError::Malformed {
                fen: fen_str.to_string(),
                reason: e.to_string(),
            }
        })?;

        let board: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| PositionError::Illegal {
                fen: fen_str.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            fen: fen_str.to_string(),
            turn: board.turn(),
        })
    }

    /// The standard starting position.
    pub fn start() -> Self {
        Self {
            fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            turn: Color::White,
        }
    }

    /// Build from a board, rendering the FEN with legal en passant squares only.
    pub fn from_board(board: &Chess) -> Self {
        Self {
            fen: Fen::from_position(board, shakmaty::EnPassantMode::Legal).to_string(),
            turn: board.turn(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> Color {
        self.turn
    }

    /// Rebuild the board for move generation.
    pub fn board(&self) -> Result<Chess, PositionError> {
        let fen: Fen = self.fen.parse().map_err(|e: shakmaty::fen::ParseFenError| {
            PositionError::Malformed {
                fen: self.fen.clone(),
                reason: e.to_string(),
            }
        })?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| PositionError::Illegal {
                fen: self.fen.clone(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.fen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn parse_start_position() {
        let pos = Position::parse(START).unwrap();
        assert_eq!(pos, Position::start());
        assert_eq!(pos.side_to_move(), Color::White);
    }

    #[test]
    fn parse_trims_but_keeps_text() {
        let pos = Position::parse("  rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1\n").unwrap();
        assert_eq!(
            pos.as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(pos.side_to_move(), Color::Black);
    }

    #[test]
    fn identity_is_exact_string() {
        let a = Position::parse(START).unwrap();
        let b = Position::parse("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Position::parse("   "), Err(PositionError::Empty));
    }

    #[test]
    fn rejects_garbage() {
        let err = Position::parse("not a fen").unwrap_err();
        assert!(matches!(err, PositionError::Malformed { .. }));
        assert!(err.to_string().contains("not a fen"));
    }

    #[test]
    fn rejects_position_without_kings() {
        let err = Position::parse("8/8/8/8/8/8/8/8 w - - 0 1").unwrap_err();
        assert!(matches!(err, PositionError::Illegal { .. }));
    }

    #[test]
    fn board_round_trips() {
        let pos = Position::parse(START).unwrap();
        let board = pos.board().unwrap();
        assert_eq!(Position::from_board(&board), pos);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Position::start()).unwrap();
        assert_eq!(json, format!("\"{}\"", START));
    }
}
