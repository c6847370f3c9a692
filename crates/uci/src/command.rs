//! Commands sent from the analysis side to the engine.
//!
//! Besides formatting commands for the engine's stdin, the same type parses
//! them back, which is what the bundled mock engine uses to read its input.

use crate::UciError;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Forget hash and history from the previous search.
    UciNewGame,
    /// Set an engine option.
    SetOption { name: String, value: Option<String> },
    /// Set up position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for at most this time in milliseconds.
    pub movetime: Option<u64>,
    /// Search to this depth.
    pub depth: Option<u32>,
    /// Search indefinitely until `stop`.
    pub infinite: bool,
}

impl GoOptions {
    /// A search bounded by both depth and time; whichever limit is hit first ends it.
    pub fn bounded(depth: u32, movetime_ms: u64) -> Self {
        Self {
            movetime: Some(movetime_ms),
            depth: Some(depth),
            infinite: false,
        }
    }

    /// An unbounded search that runs until `stop`.
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Self::default()
        }
    }
}

impl GuiCommand {
    /// Shorthand for `setoption name <name> value <value>`.
    pub fn set_option(name: &str, value: impl ToString) -> Self {
        GuiCommand::SetOption {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// Shorthand for `position fen <fen>` without moves.
    pub fn position_fen(fen: &str) -> Self {
        GuiCommand::Position {
            fen: Some(fen.to_string()),
            moves: Vec::new(),
        }
    }

    /// Format the command as a single protocol line (without newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(f) => format!("position fen {}", f),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(opts) => {
                let mut line = String::from("go");
                if opts.infinite {
                    line.push_str(" infinite");
                }
                if let Some(d) = opts.depth {
                    line.push_str(&format!(" depth {}", d));
                }
                if let Some(t) = opts.movetime {
                    line.push_str(&format!(" movetime {}", t));
                }
                line
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(GuiCommand::Uci),
            "isready" => Ok(GuiCommand::IsReady),
            "ucinewgame" => Ok(GuiCommand::UciNewGame),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "setoption" => Self::parse_setoption(parts),
            "position" => Self::parse_position(parts),
            "go" => Self::parse_go(parts),
            "" => Ok(GuiCommand::Unknown(String::new())),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_setoption<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        if parts.next() != Some("name") {
            return Err(UciError::ParseError("Expected 'name' after setoption".to_string()));
        }

        // Option names may contain spaces, so collect until "value".
        let mut name = Vec::new();
        let mut value = None;
        for part in parts.by_ref() {
            if part == "value" {
                let rest: Vec<&str> = parts.by_ref().collect();
                value = Some(rest.join(" "));
                break;
            }
            name.push(part);
        }

        if name.is_empty() {
            return Err(UciError::ParseError("Missing option name".to_string()));
        }

        Ok(GuiCommand::SetOption {
            name: name.join(" "),
            value,
        })
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut fen = None;

        match parts.next() {
            Some("startpos") => {}
            Some("fen") => {
                let mut fen_parts = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fen_parts.push(part);
                }
                if !fen_parts.is_empty() {
                    fen = Some(fen_parts.join(" "));
                }
            }
            Some(other) => {
                return Err(UciError::ParseError(format!(
                    "Expected 'startpos' or 'fen', got '{}'",
                    other
                )));
            }
            None => {
                return Err(UciError::ParseError(
                    "Expected 'startpos' or 'fen'".to_string(),
                ));
            }
        }

        // For fen, "moves" was already consumed above.
        let remaining: Vec<&str> = parts.collect();
        let moves = match remaining.iter().position(|&s| s == "moves") {
            Some(idx) => remaining[idx + 1..].iter().map(|s| s.to_string()).collect(),
            None if fen.is_some() => remaining.iter().map(|s| s.to_string()).collect(),
            None => Vec::new(),
        };

        Ok(GuiCommand::Position { fen, moves })
    }

    fn parse_go<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut opts = GoOptions::default();
        let parts: Vec<&str> = parts.collect();
        let mut i = 0;

        while i < parts.len() {
            match parts[i] {
                "movetime" => {
                    i += 1;
                    opts.movetime = parts.get(i).and_then(|s| s.parse().ok());
                }
                "depth" => {
                    i += 1;
                    opts.depth = parts.get(i).and_then(|s| s.parse().ok());
                }
                "infinite" => {
                    opts.infinite = true;
                }
                _ => {}
            }
            i += 1;
        }

        Ok(GuiCommand::Go(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_isready() {
        assert_eq!(GuiCommand::parse("isready").unwrap(), GuiCommand::IsReady);
    }

    #[test]
    fn parse_ucinewgame() {
        assert_eq!(
            GuiCommand::parse("ucinewgame\n").unwrap(),
            GuiCommand::UciNewGame
        );
    }

    #[test]
    fn parse_position_fen() {
        let cmd = GuiCommand::parse(
            "position fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        )
        .unwrap();
        assert_eq!(
            cmd,
            GuiCommand::position_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
        );
    }

    #[test]
    fn parse_position_startpos_with_moves() {
        let cmd = GuiCommand::parse("position startpos moves e2e4 e7e5").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::Position {
                fen: None,
                moves: vec!["e2e4".to_string(), "e7e5".to_string()]
            }
        );
    }

    #[test]
    fn parse_setoption_with_spaces_in_name() {
        let cmd = GuiCommand::parse("setoption name Clear Hash").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::SetOption {
                name: "Clear Hash".to_string(),
                value: None
            }
        );

        let cmd = GuiCommand::parse("setoption name MultiPV value 3").unwrap();
        assert_eq!(cmd, GuiCommand::set_option("MultiPV", 3));
    }

    #[test]
    fn parse_setoption_without_name_fails() {
        assert!(GuiCommand::parse("setoption MultiPV 3").is_err());
    }

    #[test]
    fn parse_go_depth_and_movetime() {
        let cmd = GuiCommand::parse("go depth 10 movetime 500").unwrap();
        assert_eq!(cmd, GuiCommand::Go(GoOptions::bounded(10, 500)));
    }

    #[test]
    fn parse_go_infinite() {
        let cmd = GuiCommand::parse("go infinite").unwrap();
        assert_eq!(cmd, GuiCommand::Go(GoOptions::infinite()));
    }

    #[test]
    fn format_reset_sequence() {
        let lines: Vec<String> = [
            GuiCommand::Stop,
            GuiCommand::UciNewGame,
            GuiCommand::IsReady,
            GuiCommand::set_option("UCI_AnalyseMode", true),
            GuiCommand::set_option("MultiPV", 3),
            GuiCommand::position_fen("8/8/8/8/8/8/8/K1k5 w - - 0 1"),
            GuiCommand::Go(GoOptions::infinite()),
        ]
        .iter()
        .map(GuiCommand::to_uci)
        .collect();

        assert_eq!(
            lines,
            vec![
                "stop",
                "ucinewgame",
                "isready",
                "setoption name UCI_AnalyseMode value true",
                "setoption name MultiPV value 3",
                "position fen 8/8/8/8/8/8/8/K1k5 w - - 0 1",
                "go infinite",
            ]
        );
    }

    #[test]
    fn format_bounded_go() {
        assert_eq!(
            GuiCommand::Go(GoOptions::bounded(20, 500)).to_uci(),
            "go depth 20 movetime 500"
        );
    }
}
