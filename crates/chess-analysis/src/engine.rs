//! UCI engine subprocess with worker-thread I/O.
//!
//! The engine's stdin and stdout are owned by two dedicated threads so that
//! blocking pipe I/O never runs on the async scheduler:
//!
//! - the writer thread takes command lines from a channel, writes and flushes them
//! - the reader thread pushes every stdout line into a channel
//!
//! Async code talks to the engine through [`EngineIo`], reachable only via
//! [`EngineProcess::lock`], so a multi-command sequence (send, then drain until
//! an acknowledgment) is never interleaved with another caller's.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time::Instant;
use uci::{EngineMessage, GuiCommand};

/// How long to wait for `uciok` / `readyok`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const QUIT_GRACE_POLLS: u32 = 20;
const QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("Engine not available at {path}: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The engine's pipes closed (process exited or crashed).
    #[error("Engine closed unexpectedly")]
    Closed,
    /// The engine did not answer in time.
    #[error("Timed out waiting for engine {0}")]
    Timeout(&'static str),
}

/// Result of waiting for one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRead {
    Line(String),
    /// Nothing arrived within the wait.
    Idle,
    /// The engine's stdout is closed.
    Eof,
}

/// Exclusive access to the engine's command and output channels.
pub struct EngineIo {
    commands: mpsc::UnboundedSender<String>,
    lines: mpsc::UnboundedReceiver<String>,
}

impl EngineIo {
    /// Queue a command line for the writer thread.
    pub fn send(&self, command: &GuiCommand) -> Result<(), EngineError> {
        self.commands
            .send(command.to_uci())
            .map_err(|_| EngineError::Closed)
    }

    /// Next output line, or `None` once the engine's stdout is closed.
    pub async fn read_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Next output line, waiting at most `wait`.
    pub async fn read_line_timeout(&mut self, wait: Duration) -> LineRead {
        match tokio::time::timeout(wait, self.lines.recv()).await {
            Ok(Some(line)) => LineRead::Line(line),
            Ok(None) => LineRead::Eof,
            Err(_) => LineRead::Idle,
        }
    }

    /// Read and discard lines until one matches `done`.
    ///
    /// Returns the number of lines discarded before the match.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Timeout`] if no matching line arrives within `timeout`
    /// - [`EngineError::Closed`] if the engine exits first
    pub async fn drain_until(
        &mut self,
        what: &'static str,
        timeout: Duration,
        done: impl Fn(&EngineMessage) -> bool,
    ) -> Result<usize, EngineError> {
        let deadline = Instant::now() + timeout;
        let mut discarded = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.read_line_timeout(remaining).await {
                LineRead::Line(line) => {
                    if done(&EngineMessage::parse(&line)) {
                        return Ok(discarded);
                    }
                    discarded += 1;
                }
                LineRead::Idle => return Err(EngineError::Timeout(what)),
                LineRead::Eof => return Err(EngineError::Closed),
            }
        }
    }

    /// An `EngineIo` wired to plain channels instead of a process: the
    /// returned receiver sees every command sent, the sender feeds output lines.
    #[cfg(test)]
    pub(crate) fn detached() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let io = Self {
            commands: command_tx,
            lines: line_rx,
        };
        (io, command_rx, line_tx)
    }

    /// `uci` / `uciok` handshake.
    pub async fn handshake(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci)?;
        self.drain_until("uciok", HANDSHAKE_TIMEOUT, |m| {
            matches!(m, EngineMessage::UciOk)
        })
        .await?;
        Ok(())
    }

    /// `isready` / `readyok` synchronization. Returns how many stale lines
    /// were discarded while waiting.
    pub async fn sync_ready(&mut self) -> Result<usize, EngineError> {
        self.send(&GuiCommand::IsReady)?;
        self.drain_until("readyok", HANDSHAKE_TIMEOUT, |m| {
            matches!(m, EngineMessage::ReadyOk)
        })
        .await
    }
}

/// A running UCI engine.
///
/// Dropping the process sends `quit`; a background thread kills it if it
/// does not exit promptly.
pub struct EngineProcess {
    path: PathBuf,
    io: Mutex<EngineIo>,
    commands: mpsc::UnboundedSender<String>,
    exited: Arc<AtomicBool>,
    child: std::sync::Mutex<Option<Child>>,
}

impl EngineProcess {
    /// Spawn the engine and its I/O threads. No protocol traffic is sent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if the binary cannot be started.
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |source| EngineError::Unavailable {
            path: path.display().to_string(),
            source,
        };

        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(unavailable)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(unavailable(std::io::Error::other("engine pipes unavailable")));
            }
        };

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
        let exited = Arc::new(AtomicBool::new(false));

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let writer_name = name.clone();
        std::thread::Builder::new()
            .name("engine-writer".to_string())
            .spawn(move || {
                let mut stdin = stdin;
                while let Some(line) = command_rx.blocking_recv() {
                    tracing::debug!(engine = %writer_name, "< {}", line);
                    if writeln!(stdin, "{}", line).and_then(|_| stdin.flush()).is_err() {
                        tracing::debug!(engine = %writer_name, "stdin closed");
                        break;
                    }
                }
            })
            .map_err(unavailable)?;

        let reader_exited = exited.clone();
        std::thread::Builder::new()
            .name("engine-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    let line = line.trim_end().to_string();
                    tracing::debug!(engine = %name, "> {}", line);
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                reader_exited.store(true, Ordering::SeqCst);
            })
            .map_err(unavailable)?;

        Ok(Self {
            path,
            io: Mutex::new(EngineIo {
                commands: command_tx.clone(),
                lines: line_rx,
            }),
            commands: command_tx,
            exited,
            child: std::sync::Mutex::new(Some(child)),
        })
    }

    /// Spawn the engine and complete the UCI handshake.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Unavailable`] if the binary cannot be started
    /// - [`EngineError::Timeout`] / [`EngineError::Closed`] if it never answers `uciok`
    pub async fn start(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let process = Self::spawn(path)?;
        {
            let mut io = process.lock().await;
            io.handshake().await?;
            io.sync_ready().await?;
        }
        tracing::info!(path = %process.path.display(), "Engine ready");
        Ok(process)
    }

    /// Wait for exclusive use of the engine's channels.
    pub async fn lock(&self) -> MutexGuard<'_, EngineIo> {
        self.io.lock().await
    }

    /// Ask the engine to stop searching without waiting for the lock.
    ///
    /// Returns `false` if the engine is already gone; that case is not an error.
    pub fn try_stop(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        self.commands.send(GuiCommand::Stop.to_uci()).is_ok()
    }

    /// True once the engine's stdout has closed.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.commands.send(GuiCommand::Quit.to_uci());
        let child = self
            .child
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        let reaped = std::thread::Builder::new()
            .name("engine-reaper".to_string())
            .spawn(move || reap(child));
        if let Err(e) = reaped {
            tracing::warn!(error = %e, "Could not start engine reaper");
        }
    }
}

/// Give an engine that was sent `quit` a short grace period, then kill it.
fn reap(mut child: Child) {
    for _ in 0..QUIT_GRACE_POLLS {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(QUIT_POLL_INTERVAL),
            Err(_) => break,
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
