//! Engine session management.
//!
//! [`EngineSession`] is the single owner of the engine subprocess. Every
//! operation runs under one mutex, because a UCI engine cannot interleave
//! two searches over its single stdin/stdout pipe. The session starts the
//! engine lazily, probes it before each call, and retries a failed search
//! exactly once after a restart — bounded latency instead of masking a
//! persistently dead engine.

use crate::engine::{
    AnalysisResult, EngineConfig, EngineError, EngineLink, EngineSpawner, Score, SearchReport,
    UciSpawner,
};
use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::{Chess, EnPassantMode, Position};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// A move with its evaluation, as returned by [`EngineSession::top_moves`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMove {
    /// Move in coordinate notation.
    #[serde(rename = "move")]
    pub uci: String,
    /// Evaluation of the line starting with this move.
    pub score: Score,
}

/// Connection slot guarded by the session mutex.
///
/// `link: None, closed: false` is the Unstarted state, `Some` is Running,
/// and `closed: true` is the terminal Stopped state.
#[derive(Default)]
struct Slot {
    link: Option<Box<dyn EngineLink>>,
    closed: bool,
}

/// Serialized access to a single lazily-started engine subprocess.
pub struct EngineSession {
    spawner: Box<dyn EngineSpawner>,
    depth: u32,
    slot: Mutex<Slot>,
}

impl EngineSession {
    /// Creates a session that spawns the configured UCI executable.
    /// No process is launched until the first analysis call.
    pub fn new(config: EngineConfig) -> Self {
        let depth = config.depth;
        Self::with_spawner(Box::new(UciSpawner::new(config)), depth)
    }

    /// Creates a session over an arbitrary spawner. This is the seam the
    /// engine-double tests use.
    pub fn with_spawner(spawner: Box<dyn EngineSpawner>, depth: u32) -> Self {
        Self {
            spawner,
            depth,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Full fixed-depth analysis of a position.
    #[instrument(skip(self, position))]
    pub async fn analyze(&self, position: &Chess) -> Result<AnalysisResult, EngineError> {
        let report = self.run_search(position, 1).await?;
        let line = report
            .lines
            .into_iter()
            .next()
            .ok_or(EngineError::EmptyAnalysis)?;
        Ok(AnalysisResult {
            best_move: report.best_move,
            score: line.score,
            depth: line.depth,
            nodes: line.nodes,
            time_ms: line.time_ms,
            principal_variation: line.pv,
        })
    }

    /// First move of the principal variation.
    #[instrument(skip(self, position))]
    pub async fn best_move(&self, position: &Chess) -> Result<String, EngineError> {
        let analysis = self.analyze(position).await?;
        Ok(analysis.best_move)
    }

    /// Up to `count` ranked moves, best first. The engine is trusted to
    /// rank its principal variations; positions with fewer legal moves
    /// yield fewer entries.
    #[instrument(skip(self, position))]
    pub async fn top_moves(
        &self,
        position: &Chess,
        count: u32,
    ) -> Result<Vec<RankedMove>, EngineError> {
        let report = self.run_search(position, count.max(1)).await?;
        let mut ranked: Vec<RankedMove> = report
            .lines
            .into_iter()
            .filter_map(|line| {
                line.pv.first().map(|uci| RankedMove {
                    uci: uci.clone(),
                    score: line.score,
                })
            })
            .collect();
        ranked.truncate(count as usize);
        Ok(ranked)
    }

    /// Shuts the engine down. Termination failure is logged and swallowed;
    /// the session is unusable afterward.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        slot.closed = true;
        if let Some(mut link) = slot.link.take() {
            match link.quit().await {
                Ok(()) => info!("engine shut down"),
                Err(e) => warn!(error = %e, "engine shutdown failed, discarding handle"),
            }
        }
    }

    /// Runs one search under the session mutex: lazy start, pre-call
    /// probe, and a single restart-and-retry on a mid-search fault.
    async fn run_search(
        &self,
        position: &Chess,
        multipv: u32,
    ) -> Result<SearchReport, EngineError> {
        let fen = Fen(position.clone().into_setup(EnPassantMode::Legal)).to_string();
        let mut slot = self.slot.lock().await;
        if slot.closed {
            return Err(EngineError::Closed);
        }

        self.probe_and_restart_if_dead(&mut slot).await?;

        let link = live_link(&mut slot)?;
        match link.search(&fen, self.depth, multipv).await {
            Ok(report) => Ok(report),
            Err(EngineError::Fault(reason)) => {
                warn!(%reason, "search faulted, restarting engine for one retry");
                slot.link = None;
                self.ensure_started(&mut slot).await?;
                let link = live_link(&mut slot)?;
                match link.search(&fen, self.depth, multipv).await {
                    Ok(report) => {
                        debug!("retry after restart succeeded");
                        Ok(report)
                    }
                    Err(e) => {
                        slot.link = None;
                        Err(EngineError::Unavailable(format!(
                            "search failed again after restart: {e}"
                        )))
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Spawns the engine if the slot is empty. Spawn failure surfaces as
    /// [`EngineError::Unavailable`] without retry.
    async fn ensure_started(&self, slot: &mut Slot) -> Result<(), EngineError> {
        if slot.link.is_none() {
            info!("starting engine subprocess");
            slot.link = Some(self.spawner.spawn().await?);
        }
        Ok(())
    }

    /// Lazy start plus liveness probe. A failed probe discards the process
    /// reference and immediately starts a fresh one; probe failures are
    /// expected occasionally and never crash the caller.
    async fn probe_and_restart_if_dead(&self, slot: &mut Slot) -> Result<(), EngineError> {
        self.ensure_started(slot).await?;
        if let Some(link) = slot.link.as_mut()
            && let Err(e) = link.ping().await
        {
            warn!(error = %e, "engine failed liveness probe, restarting");
            slot.link = None;
            self.ensure_started(slot).await?;
        }
        Ok(())
    }
}

fn live_link(slot: &mut Slot) -> Result<&mut Box<dyn EngineLink>, EngineError> {
    slot.link
        .as_mut()
        .ok_or_else(|| EngineError::Unavailable("engine slot empty after start".into()))
}
