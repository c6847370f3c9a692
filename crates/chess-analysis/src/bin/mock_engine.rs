//! Deterministic UCI engine for tests.
//!
//! Speaks enough UCI to stand in for Stockfish: it answers the handshake,
//! tracks the position, and "searches" by ranking legal moves in UCI order.
//! Every info line carries `nodes = search_id * 1_000_000 + depth * 1000 + rank`
//! so a test can tell which search produced it.
//!
//! Options:
//! - `MultiPV` - number of ranked lines (default 1)
//! - `MaxDepth` - deepest iteration a bounded search reports (default 30)
//! - `TickMs` - delay between iterations of `go infinite` (default 10)

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Move, Position};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use uci::{EngineMessage, GoOptions, GuiCommand, InfoBuilder, UciError};

const IDLE_WAIT: Duration = Duration::from_secs(3600);

struct Infinite {
    depth: u32,
    next_tick: Instant,
}

struct MockEngine {
    board: Chess,
    multipv: u32,
    max_depth: u32,
    tick: Duration,
    search_id: u64,
    infinite: Option<Infinite>,
}

impl MockEngine {
    fn new() -> Self {
        Self {
            board: Chess::default(),
            multipv: 1,
            max_depth: 30,
            tick: Duration::from_millis(10),
            search_id: 0,
            infinite: None,
        }
    }

    fn set_option(&mut self, name: &str, value: Option<&str>) {
        let Some(value) = value.and_then(|v| v.parse::<u64>().ok()) else {
            return;
        };
        match name {
            "MultiPV" => self.multipv = u32::try_from(value).unwrap_or(1).max(1),
            "MaxDepth" => self.max_depth = u32::try_from(value).unwrap_or(u32::MAX),
            "TickMs" => self.tick = Duration::from_millis(value),
            _ => {}
        }
    }

    fn set_position(&mut self, fen: Option<&str>, moves: &[String]) {
        let mut board = match fen.map(|f| f.parse::<Fen>()) {
            None => Chess::default(),
            Some(Ok(fen)) => match fen.into_position::<Chess>(CastlingMode::Standard) {
                Ok(board) => board,
                Err(_) => Chess::default(),
            },
            Some(Err(_)) => Chess::default(),
        };
        for text in moves {
            let Ok(uci) = text.parse::<UciMove>() else {
                break;
            };
            let Ok(m) = uci.to_move(&board) else {
                break;
            };
            board.play_unchecked(m);
        }
        self.board = board;
    }

    /// Legal moves in UCI order, each with the first legal reply.
    fn ranked_moves(&self) -> Vec<(String, Option<String>)> {
        let mut moves: Vec<(String, Move)> = self
            .board
            .legal_moves()
            .into_iter()
            .map(|m| (m.to_uci(CastlingMode::Standard).to_string(), m))
            .collect();
        moves.sort_by(|a, b| a.0.cmp(&b.0));

        moves
            .into_iter()
            .map(|(text, m)| {
                let mut next = self.board.clone();
                next.play_unchecked(m);
                let reply = next
                    .legal_moves()
                    .into_iter()
                    .map(|r| r.to_uci(CastlingMode::Standard).to_string())
                    .min();
                (text, reply)
            })
            .collect()
    }

    fn iteration(&self, depth: u32) -> Vec<String> {
        if self.board.is_checkmate() {
            return vec![InfoBuilder::new().depth(0).score_mate(0).build().to_uci()];
        }
        if self.board.is_stalemate() {
            return vec![InfoBuilder::new().depth(0).score_cp(0).build().to_uci()];
        }

        let ranked = self.ranked_moves();
        let lines = usize::try_from(self.multipv).unwrap_or(1).min(ranked.len());
        ranked
            .into_iter()
            .take(lines)
            .zip(1u32..)
            .map(|((first, reply), rank)| {
                let mut pv = vec![first];
                pv.extend(reply);
                let cp = 25 + i32::try_from(depth).unwrap_or(0) - 15 * (i32::try_from(rank).unwrap_or(0) - 1);
                InfoBuilder::new()
                    .depth(depth)
                    .seldepth(depth + 2)
                    .multipv(rank)
                    .score_cp(cp)
                    .nodes(self.search_id * 1_000_000 + u64::from(depth) * 1000 + u64::from(rank))
                    .time(u64::from(depth))
                    .pv(pv)
                    .build()
                    .to_uci()
            })
            .collect()
    }

    fn best_move(&self) -> EngineMessage {
        let best = self.ranked_moves().into_iter().next();
        EngineMessage::BestMove {
            mv: best.as_ref().map(|(m, _)| m.clone()),
            ponder: best.and_then(|(_, reply)| reply),
        }
    }

    fn go(&mut self, options: &GoOptions, out: &mut impl Write) -> io::Result<()> {
        self.search_id += 1;

        if options.infinite {
            self.infinite = Some(Infinite {
                depth: 0,
                next_tick: Instant::now(),
            });
            return Ok(());
        }

        let target = options.depth.unwrap_or(self.max_depth).min(self.max_depth);
        let terminal = self.board.is_checkmate() || self.board.is_stalemate();
        let last = if terminal { 0 } else { target.max(1) };
        for depth in (if terminal { 0 } else { 1 })..=last {
            for line in self.iteration(depth) {
                writeln!(out, "{}", line)?;
            }
        }
        writeln!(out, "{}", self.best_move().to_uci())?;
        out.flush()
    }

    fn tick(&mut self, out: &mut impl Write) -> io::Result<()> {
        let Some(search) = self.infinite.as_mut() else {
            return Ok(());
        };
        search.depth += 1;
        search.next_tick = Instant::now() + self.tick;
        let depth = search.depth;

        let terminal = self.board.is_checkmate() || self.board.is_stalemate();
        if terminal && depth > 1 {
            return Ok(());
        }
        for line in self.iteration(if terminal { 0 } else { depth }) {
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }

    fn stop(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.infinite.take().is_some() {
            writeln!(out, "{}", self.best_move().to_uci())?;
            out.flush()?;
        }
        Ok(())
    }

    fn wait(&self) -> Duration {
        match &self.infinite {
            Some(search) => search.next_tick.saturating_duration_since(Instant::now()),
            None => IDLE_WAIT,
        }
    }
}

fn main() -> Result<(), UciError> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut engine = MockEngine::new();

    loop {
        let line = match rx.recv_timeout(engine.wait()) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                engine.tick(&mut out)?;
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let cmd = match GuiCommand::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("Error reading command: {}", e);
                continue;
            }
        };

        match cmd {
            GuiCommand::Uci => {
                writeln!(out, "id name MockEngine")?;
                writeln!(out, "id author Chess Analysis")?;
                writeln!(out, "option name MultiPV type spin default 1 min 1 max 500")?;
                writeln!(out, "option name UCI_AnalyseMode type check default false")?;
                writeln!(out, "uciok")?;
                out.flush()?;
            }
            GuiCommand::IsReady => {
                writeln!(out, "readyok")?;
                out.flush()?;
            }
            GuiCommand::UciNewGame => engine.board = Chess::default(),
            GuiCommand::SetOption { name, value } => engine.set_option(&name, value.as_deref()),
            GuiCommand::Position { fen, moves } => engine.set_position(fen.as_deref(), &moves),
            GuiCommand::Go(options) => engine.go(&options, &mut out)?,
            GuiCommand::Stop => engine.stop(&mut out)?,
            GuiCommand::Quit => break,
            GuiCommand::Unknown(_) => {}
        }
    }

    Ok(())
}
