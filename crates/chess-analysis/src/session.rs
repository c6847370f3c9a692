//! Request/response interactions with a UCI engine.
//!
//! Two modes are supported:
//!
//! - single-shot analysis ([`EngineSession`]), which starts a private engine
//!   process per call so it never sees state left by the live stream
//! - the reset that prepares the shared engine for a new infinite search
//!   ([`reset_for_new_search`])

use crate::engine::{EngineError, EngineIo, EngineProcess, LineRead};
use crate::evaluation::{EngineLine, LIVE_MULTIPV};
use crate::Position;
use shakmaty::Color;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use uci::{EngineMessage, GoOptions, GuiCommand};

/// Extra time allowed past the requested limit before `stop` is forced.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Time allowed for `bestmove` after a forced `stop`.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Longest wait for a single-shot search, whatever limit was requested.
pub const MAX_SEARCH_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

/// Single-shot position analysis.
pub trait Analyser: Send + Sync {
    /// Analyse `position` until `depth` is reached or `time_limit` elapses,
    /// whichever comes first, returning the final line of each of up to
    /// `multipv` variations ordered by rank.
    ///
    /// An engine that reports nothing before its limit yields an empty list.
    fn evaluate(
        &self,
        position: &Position,
        depth: u32,
        time_limit: Duration,
        multipv: u32,
    ) -> impl Future<Output = Result<Vec<EngineLine>, EngineError>> + Send;
}

/// Runs each analysis in a freshly started engine process.
#[derive(Debug, Clone)]
pub struct EngineSession {
    engine_path: PathBuf,
    grace: Duration,
}

impl EngineSession {
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            grace: DEFAULT_GRACE,
        }
    }

    /// Override how long past `time_limit` to wait before forcing `stop`.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }
}

impl Analyser for EngineSession {
    async fn evaluate(
        &self,
        position: &Position,
        depth: u32,
        time_limit: Duration,
        multipv: u32,
    ) -> Result<Vec<EngineLine>, EngineError> {
        let process = EngineProcess::spawn(&self.engine_path)?;
        let mut io = process.lock().await;

        io.handshake().await?;
        io.send(&GuiCommand::set_option("MultiPV", multipv.max(1)))?;
        io.send(&GuiCommand::UciNewGame)?;
        io.sync_ready().await?;
        io.send(&GuiCommand::position_fen(position.as_str()))?;

        let movetime = u64::try_from(time_limit.as_millis()).unwrap_or(u64::MAX).max(1);
        io.send(&GuiCommand::Go(GoOptions::bounded(depth, movetime)))?;

        let lines = collect_search(
            &mut io,
            position.side_to_move(),
            multipv.max(1),
            time_limit.saturating_add(self.grace),
        )
        .await?;

        tracing::debug!(
            fen = %position,
            depth,
            lines = lines.len(),
            reached = lines.first().map(|l| l.depth),
            "Single-shot analysis finished"
        );
        Ok(lines)
    }
}

/// Read a bounded search's output until `bestmove`, keeping the latest exact
/// line per rank.
///
/// If nothing ends the search within `budget` (capped at
/// [`MAX_SEARCH_BUDGET`]), `stop` is sent and whatever was collected is
/// returned once `bestmove` arrives (or a short grace ends).
pub(crate) async fn collect_search(
    io: &mut EngineIo,
    side_to_move: Color,
    multipv: u32,
    budget: Duration,
) -> Result<Vec<EngineLine>, EngineError> {
    let mut latest: BTreeMap<u32, EngineLine> = BTreeMap::new();
    let mut deadline = Instant::now() + budget.min(MAX_SEARCH_BUDGET);
    let mut stop_sent = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match io.read_line_timeout(remaining).await {
            LineRead::Line(line) => match EngineMessage::parse(&line) {
                EngineMessage::Info(info) if info.is_exact() => {
                    if let Some(entry) = EngineLine::from_info(&info, side_to_move) {
                        // A score-only line never replaces one with moves.
                        let keeps_moves = entry.pv.is_empty() && latest.contains_key(&entry.rank);
                        if entry.rank <= multipv && !keeps_moves {
                            latest.insert(entry.rank, entry);
                        }
                    }
                }
                EngineMessage::BestMove { .. } => break,
                EngineMessage::Other(raw) if raw.starts_with("info") => {
                    tracing::debug!(line = %raw, "Ignoring unparseable info line");
                }
                _ => {}
            },
            LineRead::Idle if !stop_sent => {
                tracing::warn!("Engine exceeded its time limit, sending stop");
                io.send(&GuiCommand::Stop)?;
                stop_sent = true;
                deadline = Instant::now() + STOP_GRACE;
            }
            LineRead::Idle => {
                tracing::warn!("Engine did not answer stop");
                break;
            }
            LineRead::Eof => return Err(EngineError::Closed),
        }
    }

    Ok(latest.into_values().collect())
}

/// Bring the shared engine from any state to a fresh infinite search of
/// `position`.
///
/// Stops the running search, clears hash and history, then drains output
/// up to `readyok` so nothing from the previous search can be read after
/// this returns. Returns the number of stale lines discarded.
pub async fn reset_for_new_search(
    io: &mut EngineIo,
    position: &Position,
) -> Result<usize, EngineError> {
    io.send(&GuiCommand::Stop)?;
    io.send(&GuiCommand::UciNewGame)?;
    let stale = io.sync_ready().await?;

    io.send(&GuiCommand::set_option("UCI_AnalyseMode", true))?;
    io.send(&GuiCommand::set_option("MultiPV", LIVE_MULTIPV))?;
    io.send(&GuiCommand::position_fen(position.as_str()))?;
    io.send(&GuiCommand::Go(GoOptions::infinite()))?;

    tracing::debug!(fen = %position, stale, "Engine reset for new search");
    Ok(stale)
}
