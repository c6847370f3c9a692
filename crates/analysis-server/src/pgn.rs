//! PGN ingest and move notation.
//!
//! Games are read with `pgn-reader` and replayed with `shakmaty`; only the
//! main line is kept.

use chess_analysis::Position;
use pgn_reader::{RawComment, RawTag, Reader, SanPlus, Visitor};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position as _};
use std::io;
use std::ops::ControlFlow;
use thiserror::Error;

/// SAN recorded for the starting position (ply 0).
pub const START_SAN: &str = "START";

/// Errors raised while reading a PGN game.
#[derive(Error, Debug)]
pub enum PgnError {
    #[error("PGN is empty")]
    Empty,
    #[error("PGN contains no game")]
    NoGame,
    #[error("Failed to read PGN: {0}")]
    Read(#[from] io::Error),
    #[error("Invalid FEN tag: {0}")]
    InvalidFen(String),
    #[error("Illegal move {san} at ply {ply}")]
    IllegalMove { ply: u32, san: String },
}

/// Tag pairs kept for each game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameHeaders {
    pub event: String,
    pub site: String,
    pub white: String,
    pub black: String,
    pub date: String,
    pub result: String,
}

impl Default for GameHeaders {
    fn default() -> Self {
        Self {
            event: "Unknown".to_string(),
            site: "Unknown".to_string(),
            white: "Unknown".to_string(),
            black: "Unknown".to_string(),
            date: "Unknown".to_string(),
            result: "*".to_string(),
        }
    }
}

/// One position of a game: the board after `san` was played at `ply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlyRecord {
    pub ply: u32,
    pub fen: String,
    pub san: String,
    /// Main-line comment following the move, if any.
    pub comment: Option<String>,
}

/// A parsed game: headers plus every position from the start.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGame {
    pub headers: GameHeaders,
    pub positions: Vec<PlyRecord>,
}

impl ParsedGame {
    /// Number of half-moves in the main line.
    pub fn total_moves(&self) -> usize {
        self.positions.len().saturating_sub(1)
    }
}

struct Tags {
    headers: GameHeaders,
    start: Option<Chess>,
}

struct Movetext {
    headers: GameHeaders,
    board: Chess,
    positions: Vec<PlyRecord>,
    /// Start of a comment too long for the reader's buffer.
    partial_comment: String,
}

struct GameVisitor;

impl Visitor for GameVisitor {
    type Tags = Tags;
    type Movetext = Movetext;
    type Output = Result<ParsedGame, PgnError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Tags {
            headers: GameHeaders::default(),
            start: None,
        })
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let text = value.decode_utf8_lossy().trim().to_string();
        let slot = match name {
            b"Event" => &mut tags.headers.event,
            b"Site" => &mut tags.headers.site,
            b"White" => &mut tags.headers.white,
            b"Black" => &mut tags.headers.black,
            b"Date" => &mut tags.headers.date,
            b"Result" => &mut tags.headers.result,
            b"FEN" => {
                return match board_from_fen(&text) {
                    Some(board) => {
                        tags.start = Some(board);
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(Err(PgnError::InvalidFen(text))),
                };
            }
            _ => return ControlFlow::Continue(()),
        };
        if !text.is_empty() {
            *slot = text;
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let board = tags.start.unwrap_or_default();
        let start = PlyRecord {
            ply: 0,
            fen: Position::from_board(&board).to_string(),
            san: START_SAN.to_string(),
            comment: None,
        };
        ControlFlow::Continue(Movetext {
            headers: tags.headers,
            board,
            positions: vec![start],
            partial_comment: String::new(),
        })
    }

    fn san(
        &mut self,
        movetext: &mut Self::Movetext,
        san_plus: SanPlus,
    ) -> ControlFlow<Self::Output> {
        let ply = u32::try_from(movetext.positions.len()).unwrap_or(u32::MAX);
        let Ok(m) = san_plus.san.to_move(&movetext.board) else {
            return ControlFlow::Break(Err(PgnError::IllegalMove {
                ply,
                san: san_plus.to_string(),
            }));
        };
        let san = SanPlus::from_move_and_play_unchecked(&mut movetext.board, m);
        movetext.positions.push(PlyRecord {
            ply,
            fen: Position::from_board(&movetext.board).to_string(),
            san: san.to_string(),
            comment: None,
        });
        ControlFlow::Continue(())
    }

    fn partial_comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        movetext
            .partial_comment
            .push_str(&String::from_utf8_lossy(comment.as_bytes()));
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let mut text = std::mem::take(&mut movetext.partial_comment);
        text.push_str(&String::from_utf8_lossy(comment.as_bytes()));
        let text = text.trim();

        // Comments before the first move belong to the game, not a ply.
        let Some(record) = movetext.positions.last_mut().filter(|r| r.ply > 0) else {
            return ControlFlow::Continue(());
        };
        if text.is_empty() {
            return ControlFlow::Continue(());
        }
        match &mut record.comment {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(text);
            }
            None => record.comment = Some(text.to_string()),
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        Ok(ParsedGame {
            headers: movetext.headers,
            positions: movetext.positions,
        })
    }
}

fn board_from_fen(text: &str) -> Option<Chess> {
    text.parse::<Fen>()
        .ok()?
        .into_position::<Chess>(CastlingMode::Standard)
        .ok()
}

/// Decode uploaded PGN bytes as UTF-8, falling back to Latin-1.
pub fn decode_pgn(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().copied().map(char::from).collect(),
    }
}

/// Parse the first game of `pgn`.
///
/// # Errors
///
/// - [`PgnError::Empty`] for blank input
/// - [`PgnError::IllegalMove`] when a main-line move cannot be played
/// - [`PgnError::InvalidFen`] for an unusable `FEN` tag
pub fn parse_pgn(pgn: &str) -> Result<ParsedGame, PgnError> {
    if pgn.trim().is_empty() {
        return Err(PgnError::Empty);
    }
    let mut reader = Reader::new(io::Cursor::new(pgn.as_bytes()));
    reader.read_game(&mut GameVisitor)?.ok_or(PgnError::NoGame)?
}

/// Render a UCI principal variation as numbered SAN, e.g. `1. e4 e5 2. Nf3`
/// or `3... Nf6 4. d4` when Black moves first.
///
/// Stops at the first move that is not legal in the running position.
pub fn numbered_san(position: &Position, pv: &[String]) -> String {
    let Ok(mut board) = position.board() else {
        return String::new();
    };

    let mut parts = Vec::with_capacity(pv.len() + pv.len() / 2 + 1);
    for (i, text) in pv.iter().enumerate() {
        let Some(m) = text
            .parse::<UciMove>()
            .ok()
            .and_then(|uci| uci.to_move(&board).ok())
        else {
            break;
        };

        let number = board.fullmoves();
        if board.turn().is_white() {
            parts.push(format!("{}.", number));
        } else if i == 0 {
            parts.push(format!("{}...", number));
        }
        parts.push(SanPlus::from_move_and_play_unchecked(&mut board, m).to_string());
    }
    parts.join(" ")
}
