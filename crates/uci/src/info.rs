//! UCI info line grammar.
//!
//! An info line is `info` followed by keyword groups:
//!
//! ```text
//! depth <u32> | seldepth <u32> | multipv <u32> | nodes <u64> | nps <u64>
//! time <u64> | hashfull <u32> | tbhits <u64> | currmove <move>
//! currmovenumber <u32> | wdl <u32> <u32> <u32>
//! score (cp <i32> | mate <i32>) [lowerbound | upperbound]
//! pv <move>...        (consumes the rest of the line)
//! string <text>       (consumes the rest of the line)
//! ```
//!
//! A group whose value is missing or not a number makes the whole line
//! unparseable. Unknown tokens are skipped.

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

impl Score {
    /// The same score seen from the other side.
    pub fn negate(self) -> Self {
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }

    pub fn centipawns(self) -> Option<i32> {
        match self {
            Score::Cp(cp) => Some(cp),
            Score::Mate(_) => None,
        }
    }

    pub fn mate(self) -> Option<i32> {
        match self {
            Score::Cp(_) => None,
            Score::Mate(m) => Some(m),
        }
    }
}

/// Whether a reported score is exact or only a search window bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreBound {
    #[default]
    Exact,
    Lower,
    Upper,
}

/// Search information from engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    /// Search depth in plies.
    pub depth: Option<u32>,
    /// Selective search depth.
    pub seldepth: Option<u32>,
    /// Rank of this line when several variations are searched (1 = best).
    pub multipv: Option<u32>,
    /// Score evaluation, from the side to move.
    pub score: Option<Score>,
    /// Whether `score` is exact or a fail-high/fail-low bound.
    pub bound: ScoreBound,
    /// Nodes searched.
    pub nodes: Option<u64>,
    /// Nodes per second.
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Hash table usage (per mille).
    pub hashfull: Option<u32>,
    /// Current move being searched.
    pub currmove: Option<String>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    /// Arbitrary string info.
    pub string: Option<String>,
}

impl EngineInfo {
    /// Create a new empty info.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this line carries a principal variation.
    pub fn has_pv(&self) -> bool {
        !self.pv.is_empty()
    }

    /// True if the score is exact rather than an aspiration-window bound.
    pub fn is_exact(&self) -> bool {
        self.bound == ScoreBound::Exact
    }

    /// Variation rank, defaulting to 1 when the engine omits `multipv`.
    pub fn rank(&self) -> u32 {
        self.multipv.unwrap_or(1)
    }

    /// Format as UCI info string.
    pub fn to_uci(&self) -> String {
        let mut parts = vec!["info".to_string()];

        if let Some(d) = self.depth {
            parts.push(format!("depth {}", d));
        }
        if let Some(d) = self.seldepth {
            parts.push(format!("seldepth {}", d));
        }
        if let Some(m) = self.multipv {
            parts.push(format!("multipv {}", m));
        }
        if let Some(s) = self.score {
            match s {
                Score::Cp(cp) => parts.push(format!("score cp {}", cp)),
                Score::Mate(m) => parts.push(format!("score mate {}", m)),
            }
            match self.bound {
                ScoreBound::Exact => {}
                ScoreBound::Lower => parts.push("lowerbound".to_string()),
                ScoreBound::Upper => parts.push("upperbound".to_string()),
            }
        }
        if let Some(n) = self.nodes {
            parts.push(format!("nodes {}", n));
        }
        if let Some(n) = self.nps {
            parts.push(format!("nps {}", n));
        }
        if let Some(h) = self.hashfull {
            parts.push(format!("hashfull {}", h));
        }
        if let Some(t) = self.time {
            parts.push(format!("time {}", t));
        }
        if let Some(ref m) = self.currmove {
            parts.push(format!("currmove {}", m));
        }
        if !self.pv.is_empty() {
            parts.push(format!("pv {}", self.pv.join(" ")));
        } else if let Some(ref s) = self.string {
            parts.push(format!("string {}", s));
        }

        parts.join(" ")
    }

    /// Parse a UCI info line. Returns `None` if the line is not an info line
    /// or does not follow the grammar.
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() != Some(&"info") {
            return None;
        }

        let mut info = EngineInfo::new();
        let mut i = 1;

        while i < parts.len() {
            match parts[i] {
                "depth" => info.depth = Some(number(&parts, &mut i)?),
                "seldepth" => info.seldepth = Some(number(&parts, &mut i)?),
                "multipv" => info.multipv = Some(number(&parts, &mut i)?),
                "nodes" => info.nodes = Some(number(&parts, &mut i)?),
                "nps" => info.nps = Some(number(&parts, &mut i)?),
                "time" => info.time = Some(number(&parts, &mut i)?),
                "hashfull" => info.hashfull = Some(number(&parts, &mut i)?),
                "tbhits" | "currmovenumber" | "cpuload" => {
                    number::<u64>(&parts, &mut i)?;
                }
                "wdl" => {
                    for _ in 0..3 {
                        number::<u32>(&parts, &mut i)?;
                    }
                }
                "currmove" => {
                    i += 1;
                    info.currmove = Some(parts.get(i)?.to_string());
                }
                "score" => {
                    i += 1;
                    info.score = Some(match *parts.get(i)? {
                        "cp" => Score::Cp(number(&parts, &mut i)?),
                        "mate" => Score::Mate(number(&parts, &mut i)?),
                        _ => return None,
                    });
                    match parts.get(i + 1) {
                        Some(&"lowerbound") => {
                            info.bound = ScoreBound::Lower;
                            i += 1;
                        }
                        Some(&"upperbound") => {
                            info.bound = ScoreBound::Upper;
                            i += 1;
                        }
                        _ => {}
                    }
                }
                "pv" => {
                    info.pv = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                    break;
                }
                "string" => {
                    info.string = Some(parts[i + 1..].join(" "));
                    break;
                }
                _ => {}
            }
            i += 1;
        }

        Some(info)
    }
}

/// Advance past a keyword and parse the value that follows it.
fn number<T: std::str::FromStr>(parts: &[&str], i: &mut usize) -> Option<T> {
    *i += 1;
    parts.get(*i)?.parse().ok()
}

/// Builder for constructing EngineInfo.
#[derive(Default)]
pub struct InfoBuilder {
    info: EngineInfo,
}

impl InfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, d: u32) -> Self {
        self.info.depth = Some(d);
        self
    }

    pub fn seldepth(mut self, d: u32) -> Self {
        self.info.seldepth = Some(d);
        self
    }

    pub fn multipv(mut self, rank: u32) -> Self {
        self.info.multipv = Some(rank);
        self
    }

    pub fn score_cp(mut self, cp: i32) -> Self {
        self.info.score = Some(Score::Cp(cp));
        self
    }

    pub fn score_mate(mut self, moves: i32) -> Self {
        self.info.score = Some(Score::Mate(moves));
        self
    }

    pub fn bound(mut self, bound: ScoreBound) -> Self {
        self.info.bound = bound;
        self
    }

    pub fn nodes(mut self, n: u64) -> Self {
        self.info.nodes = Some(n);
        self
    }

    pub fn time(mut self, ms: u64) -> Self {
        self.info.time = Some(ms);
        self
    }

    pub fn pv(mut self, moves: Vec<String>) -> Self {
        self.info.pv = moves;
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.info.string = Some(s.to_string());
        self
    }

    pub fn build(self) -> EngineInfo {
        self.info
    }
}
