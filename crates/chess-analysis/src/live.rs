//! Live analysis on the shared engine.
//!
//! Only one infinite search runs at a time. Every new subscription bumps a
//! process-wide stream token; a running stream compares its own token against
//! the current one around every read and exits as soon as it is superseded,
//! releasing the engine to the newer subscription. The newer subscription
//! only resets the engine after taking the engine lock, so the older stream
//! can never read a line produced after that reset.

use crate::cache::{EvaluationStore, LinesOutcome};
use crate::engine::{EngineError, EngineIo, EngineProcess, LineRead};
use crate::evaluation::{AnalysisLine, EngineLine, Evaluation, LIVE_MULTIPV, MIN_PERSIST_DEPTH};
use crate::session::reset_for_new_search;
use crate::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use uci::{EngineMessage, Score};

/// Longest wait for one engine line before re-checking the token and the
/// subscriber.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One principal-variation line forwarded to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub depth: u32,
    pub seldepth: Option<u32>,
    /// Variation rank, 1 = best.
    pub multipv: u32,
    /// Centipawns from White's perspective.
    pub score_cp: Option<i32>,
    /// Mate distance from White's perspective.
    pub score_mate: Option<i32>,
    pub best_move: Option<String>,
    pub pv: Vec<String>,
    pub nodes: Option<u64>,
}

impl From<&EngineLine> for LiveUpdate {
    fn from(line: &EngineLine) -> Self {
        Self {
            depth: line.depth,
            seldepth: line.seldepth,
            multipv: line.rank,
            score_cp: line.score.and_then(Score::centipawns),
            score_mate: line.score.and_then(Score::mate),
            best_move: line.best_move().map(str::to_string),
            pv: line.pv.clone(),
            nodes: line.nodes,
        }
    }
}

/// Why a live stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A newer subscription took over the engine.
    Superseded,
    /// The subscriber went away.
    Disconnected,
    /// The engine process exited.
    EngineClosed,
}

/// The shared engine plus the token that arbitrates between subscribers.
pub struct LiveAnalysis<S> {
    process: EngineProcess,
    token: AtomicU64,
    store: S,
}

impl<S: EvaluationStore> LiveAnalysis<S> {
    pub fn new(process: EngineProcess, store: S) -> Self {
        Self {
            process,
            token: AtomicU64::new(0),
            store,
        }
    }

    /// Register a new subscriber, superseding any running stream.
    pub fn subscribe(&self) -> Subscription<'_, S> {
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(token, "Live analysis subscription started");
        Subscription { live: self, token }
    }

    /// Current stream token.
    pub fn current_token(&self) -> u64 {
        self.token.load(Ordering::SeqCst)
    }

    pub fn process(&self) -> &EngineProcess {
        &self.process
    }
}

/// One subscriber's claim on the shared engine.
pub struct Subscription<'a, S> {
    live: &'a LiveAnalysis<S>,
    token: u64,
}

impl<S: EvaluationStore> Subscription<'_, S> {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_superseded(&self) -> bool {
        self.live.current_token() != self.token
    }

    /// Reset the engine to `position` and stream principal-variation updates
    /// into `updates` until superseded, disconnected or the engine exits.
    ///
    /// Updates are dropped, not queued, when the subscriber falls behind.
    /// On every exit path other than a dead engine a best-effort `stop` is
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the reset itself fails.
    pub async fn run(
        self,
        position: &Position,
        updates: mpsc::Sender<LiveUpdate>,
    ) -> Result<StreamEnd, EngineError> {
        let mut io = self.live.process.lock().await;
        if self.is_superseded() {
            return Ok(StreamEnd::Superseded);
        }

        if let Err(e) = reset_for_new_search(&mut io, position).await {
            self.live.process.try_stop();
            return Err(e);
        }

        let end = self.pump(&mut io, position, &updates).await;
        match end {
            StreamEnd::EngineClosed => {
                tracing::warn!(token = self.token, "Engine closed during live analysis");
            }
            _ => {
                if !self.live.process.try_stop() {
                    tracing::debug!(token = self.token, "Engine already gone at stop");
                }
                tracing::debug!(token = self.token, ?end, "Live analysis ended");
            }
        }
        Ok(end)
    }

    async fn pump(
        &self,
        io: &mut EngineIo,
        position: &Position,
        updates: &mpsc::Sender<LiveUpdate>,
    ) -> StreamEnd {
        let mut persist = Persister::new(position, &self.live.store);

        loop {
            if self.is_superseded() {
                return StreamEnd::Superseded;
            }
            if updates.is_closed() {
                return StreamEnd::Disconnected;
            }

            let read = io.read_line_timeout(POLL_INTERVAL).await;

            // The token may have moved while we waited.
            if self.is_superseded() {
                return StreamEnd::Superseded;
            }

            let line = match read {
                LineRead::Line(line) => line,
                LineRead::Idle => continue,
                LineRead::Eof => return StreamEnd::EngineClosed,
            };

            let info = match EngineMessage::parse(&line) {
                EngineMessage::Info(info) => info,
                EngineMessage::Other(raw) if raw.starts_with("info") => {
                    tracing::debug!(line = %raw, "Ignoring unparseable info line");
                    continue;
                }
                _ => continue,
            };
            let Some(entry) = EngineLine::from_info(&info, position.side_to_move())
                .filter(|entry| !entry.pv.is_empty())
            else {
                continue;
            };

            match updates.try_send(LiveUpdate::from(&entry)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(depth = entry.depth, "Subscriber lagging, update dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return StreamEnd::Disconnected,
            }

            if info.is_exact() {
                persist.observe(&entry);
            }
        }
    }
}

/// Opportunistic persistence of live lines once they are deep enough.
struct Persister<'a, S> {
    position: &'a Position,
    store: &'a S,
    depth: u32,
    ranks: BTreeMap<u32, AnalysisLine>,
    lines_saved: bool,
}

impl<'a, S: EvaluationStore> Persister<'a, S> {
    fn new(position: &'a Position, store: &'a S) -> Self {
        Self {
            position,
            store,
            depth: 0,
            ranks: BTreeMap::new(),
            lines_saved: false,
        }
    }

    fn observe(&mut self, entry: &EngineLine) {
        if entry.depth < MIN_PERSIST_DEPTH {
            return;
        }

        if entry.depth != self.depth {
            self.depth = entry.depth;
            self.ranks.clear();
            self.lines_saved = false;
        }

        if entry.rank == 1 {
            let evaluation = Evaluation::from_line(self.position.clone(), entry);
            if let Err(e) = self.store.upsert(&evaluation) {
                tracing::warn!(fen = %self.position, depth = entry.depth, error = %e, "Failed to store live evaluation");
            }
        }

        self.ranks.insert(entry.rank, AnalysisLine::from_line(entry));

        let complete = (1..=LIVE_MULTIPV).all(|rank| self.ranks.contains_key(&rank));
        if complete && !self.lines_saved {
            let lines: Vec<AnalysisLine> = self.ranks.values().cloned().collect();
            match self.store.upsert_lines(self.position, self.depth, &lines) {
                Ok(LinesOutcome::Stored(_)) => self.lines_saved = true,
                Ok(outcome) => {
                    tracing::debug!(fen = %self.position, depth = self.depth, ?outcome, "Live lines not stored");
                    self.lines_saved = true;
                }
                Err(e) => {
                    tracing::warn!(fen = %self.position, depth = self.depth, error = %e, "Failed to store live lines");
                }
            }
        }
    }
}
