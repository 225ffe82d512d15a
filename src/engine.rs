//! UCI engine subprocess primitives.
//!
//! [`UciEngine`] owns exactly one child process and its stdio pipes, and
//! speaks the line-oriented UCI handshake over them. The [`EngineLink`] and
//! [`EngineSpawner`] traits are the seam the session manager works through,
//! so tests can substitute a scripted engine double.

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument, warn};

/// Default engine binary, resolved on `PATH`.
const DEFAULT_ENGINE: &str = "stockfish";

/// Engine subprocess configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the engine executable; `stockfish` on `PATH` when `None`.
    pub path: Option<PathBuf>,
    /// Fixed search depth for analysis calls.
    pub depth: u32,
    /// Bound on each handshake or probe exchange.
    pub handshake_timeout: Duration,
    /// Bound on waiting for each line of search output.
    pub search_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            depth: 15,
            handshake_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Executable to launch, falling back to the default discoverable name.
    pub fn executable(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE))
    }
}

/// Errors crossing the engine boundary.
#[derive(Debug, Clone, Display, Error)]
pub enum EngineError {
    /// The subprocess could not be spawned, or failed even after the
    /// allowed restart. The session slot is left empty; the next call may
    /// try again.
    #[display("engine unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// A mid-call communication failure (crash, closed pipe, timeout).
    /// Triggers exactly one restart-and-retry in the session.
    #[display("engine communication fault: {_0}")]
    Fault(#[error(not(source))] String),
    /// The session was closed; no further calls are possible.
    #[display("engine session is closed")]
    Closed,
    /// The engine produced no principal variation for the position.
    #[display("engine returned no analysis for the position")]
    EmptyAnalysis,
}

/// Engine evaluation, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    /// Centipawns; positive favors the side to move.
    Cp(i32),
    /// Forced mate in the given number of moves (negative: being mated).
    Mate(i32),
}

/// One ranked line of search output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchLine {
    /// 1-based rank among the requested principal variations.
    pub multipv: u32,
    /// Depth this line was searched to.
    pub depth: u32,
    /// Evaluation of the line.
    pub score: Score,
    /// Nodes searched, when reported.
    pub nodes: Option<u64>,
    /// Elapsed milliseconds, when reported.
    pub time_ms: Option<u64>,
    /// Principal variation in coordinate notation, best move first.
    pub pv: Vec<String>,
}

/// Everything a single search produced.
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Ranked lines, best first; one per requested principal variation.
    pub lines: Vec<SearchLine>,
    /// The engine's `bestmove` verdict.
    pub best_move: String,
}

/// Full analysis of one position.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// Best move in coordinate notation.
    pub best_move: String,
    /// Evaluation relative to the side to move.
    pub score: Score,
    /// Depth reached.
    pub depth: u32,
    /// Nodes searched, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    /// Elapsed milliseconds, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    /// Principal variation, best move first.
    pub principal_variation: Vec<String>,
}

/// A live connection to one engine process.
#[async_trait]
pub trait EngineLink: Send {
    /// Lightweight liveness probe.
    async fn ping(&mut self) -> Result<(), EngineError>;

    /// Fixed-depth search of `fen`, requesting `multipv` ranked lines.
    async fn search(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<SearchReport, EngineError>;

    /// Graceful shutdown of the process.
    async fn quit(&mut self) -> Result<(), EngineError>;
}

/// Spawns engine connections; the session owns one of these.
#[async_trait]
pub trait EngineSpawner: Send + Sync {
    /// Launches a fresh engine process and completes the handshake.
    async fn spawn(&self) -> Result<Box<dyn EngineLink>, EngineError>;
}

/// Production spawner launching the configured UCI executable.
#[derive(Debug, Clone)]
pub struct UciSpawner {
    config: EngineConfig,
}

impl UciSpawner {
    /// Creates a spawner for the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineSpawner for UciSpawner {
    async fn spawn(&self) -> Result<Box<dyn EngineLink>, EngineError> {
        let engine = UciEngine::spawn(&self.config).await?;
        Ok(Box::new(engine))
    }
}

/// A UCI engine subprocess with exclusive ownership of its stdio pipes.
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    handshake_timeout: Duration,
    search_timeout: Duration,
}

impl UciEngine {
    /// Spawns the engine process and performs the `uci`/`isready` handshake.
    #[instrument(skip(config), fields(executable = %config.executable().display()))]
    pub async fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        let executable = config.executable();
        let mut child = Command::new(&executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "failed to launch '{}': {e}",
                    executable.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("failed to capture engine stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("failed to capture engine stdout".into()))?;

        let mut engine = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            handshake_timeout: config.handshake_timeout,
            search_timeout: config.search_timeout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok", engine.handshake_timeout).await?;
        engine.send("setoption name Threads value 1").await?;
        engine.ping().await?;

        debug!("engine launched");
        Ok(engine)
    }

    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        debug!(command, "engine <-");
        let line = format!("{command}\n");
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EngineError::Fault(format!("write to engine failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Fault(format!("flush to engine failed: {e}")))
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, EngineError> {
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| EngineError::Fault("timed out waiting for engine output".into()))?
            .map_err(|e| EngineError::Fault(format!("read from engine failed: {e}")))?;
        if read == 0 {
            return Err(EngineError::Fault("engine closed its output pipe".into()));
        }
        Ok(line)
    }

    async fn wait_for(&mut self, token: &str, timeout: Duration) -> Result<(), EngineError> {
        loop {
            let line = self.read_line(timeout).await?;
            if line.trim().starts_with(token) {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl EngineLink for UciEngine {
    async fn ping(&mut self) -> Result<(), EngineError> {
        self.send("isready").await?;
        self.wait_for("readyok", self.handshake_timeout).await
    }

    #[instrument(skip(self, fen))]
    async fn search(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<SearchReport, EngineError> {
        self.send(&format!("setoption name MultiPV value {multipv}"))
            .await?;
        // Sync before each search to keep the engine in a consistent state.
        self.ping().await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut lines: Vec<SearchLine> = Vec::new();
        loop {
            let raw = self.read_line(self.search_timeout).await?;
            let trimmed = raw.trim();

            if let Some(parsed) = parse_info_line(trimmed) {
                // Keep only the deepest report per multipv rank.
                lines.retain(|l| l.multipv != parsed.multipv);
                lines.push(parsed);
            }

            if let Some(best_move) = parse_bestmove_line(trimmed) {
                lines.sort_by_key(|l| l.multipv);
                debug!(%best_move, lines = lines.len(), "search finished");
                return Ok(SearchReport { lines, best_move });
            }
        }
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        self.send("quit").await?;
        match tokio::time::timeout(self.handshake_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "engine exited");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Fault(format!("wait on engine failed: {e}"))),
            Err(_) => {
                warn!("engine ignored quit, killing");
                self.child
                    .start_kill()
                    .map_err(|e| EngineError::Fault(format!("kill engine failed: {e}")))?;
                Ok(())
            }
        }
    }
}

/// Parses an `info ... score ... pv ...` line into a [`SearchLine`].
/// Lines without a score or principal variation are ignored.
fn parse_info_line(line: &str) -> Option<SearchLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"info") {
        return None;
    }
    let pv_at = tokens.iter().position(|&t| t == "pv")?;
    let score_at = tokens.iter().position(|&t| t == "score")?;
    let score = match (tokens.get(score_at + 1), tokens.get(score_at + 2)) {
        (Some(&"cp"), Some(value)) => Score::Cp(value.parse().ok()?),
        (Some(&"mate"), Some(value)) => Score::Mate(value.parse().ok()?),
        _ => return None,
    };
    let pv: Vec<String> = tokens[pv_at + 1..].iter().map(|t| t.to_string()).collect();
    if pv.is_empty() {
        return None;
    }

    Some(SearchLine {
        multipv: token_value(&tokens, "multipv").unwrap_or(1),
        depth: token_value(&tokens, "depth").unwrap_or(0),
        score,
        nodes: token_value(&tokens, "nodes"),
        time_ms: token_value(&tokens, "time"),
        pv,
    })
}

/// Extracts the move from a `bestmove ...` line.
fn parse_bestmove_line(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("bestmove") {
        return None;
    }
    tokens.next().map(|t| t.to_string())
}

fn token_value<T: FromStr>(tokens: &[&str], name: &str) -> Option<T> {
    let at = tokens.iter().position(|&t| t == name)?;
    tokens.get(at + 1)?.parse().ok()
}
