//! Lifecycle tests for the engine session, driven by a scripted engine
//! double instead of a real subprocess.

use async_trait::async_trait;
use shakmaty::Chess;
use std::sync::{Arc, Mutex};
use stockfish_mcp::{
    EngineError, EngineLink, EngineSession, EngineSpawner, Score, SearchLine, SearchReport,
};

/// Shared journal the double writes every call into, plus counters for
/// failures the test wants injected.
#[derive(Default)]
struct Script {
    events: Vec<&'static str>,
    spawns: usize,
    spawn_failures: usize,
    ping_failures: usize,
    search_failures: usize,
}

type Shared = Arc<Mutex<Script>>;

struct FakeSpawner {
    shared: Shared,
}

#[async_trait]
impl EngineSpawner for FakeSpawner {
    async fn spawn(&self) -> Result<Box<dyn EngineLink>, EngineError> {
        let mut script = self.shared.lock().unwrap();
        script.events.push("spawn");
        if script.spawn_failures > 0 {
            script.spawn_failures -= 1;
            return Err(EngineError::Unavailable("scripted launch failure".into()));
        }
        script.spawns += 1;
        Ok(Box::new(FakeLink {
            shared: self.shared.clone(),
        }))
    }
}

struct FakeLink {
    shared: Shared,
}

#[async_trait]
impl EngineLink for FakeLink {
    async fn ping(&mut self) -> Result<(), EngineError> {
        let mut script = self.shared.lock().unwrap();
        script.events.push("ping");
        if script.ping_failures > 0 {
            script.ping_failures -= 1;
            return Err(EngineError::Fault("scripted probe failure".into()));
        }
        Ok(())
    }

    async fn search(
        &mut self,
        _fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<SearchReport, EngineError> {
        let mut script = self.shared.lock().unwrap();
        script.events.push("search");
        if script.search_failures > 0 {
            script.search_failures -= 1;
            return Err(EngineError::Fault("scripted crash mid-search".into()));
        }
        Ok(canned_report(depth, multipv))
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        self.shared.lock().unwrap().events.push("quit");
        Ok(())
    }
}

fn canned_report(depth: u32, multipv: u32) -> SearchReport {
    let moves = ["e2e4", "d2d4", "g1f3", "c2c4", "e2e3", "b1c3"];
    let lines: Vec<SearchLine> = moves
        .iter()
        .take(multipv as usize)
        .enumerate()
        .map(|(i, mv)| SearchLine {
            multipv: i as u32 + 1,
            depth,
            score: Score::Cp(30 - 10 * i as i32),
            nodes: Some(40_000),
            time_ms: Some(120),
            pv: vec![mv.to_string(), "e7e5".to_string()],
        })
        .collect();
    SearchReport {
        lines,
        best_move: moves[0].to_string(),
    }
}

fn session(shared: &Shared) -> EngineSession {
    EngineSession::with_spawner(
        Box::new(FakeSpawner {
            shared: shared.clone(),
        }),
        12,
    )
}

#[tokio::test]
async fn test_lazy_start_spawns_once() {
    let shared = Shared::default();
    let session = session(&shared);
    assert_eq!(shared.lock().unwrap().spawns, 0, "no spawn before first call");

    let pos = Chess::default();
    session.analyze(&pos).await.unwrap();
    session.analyze(&pos).await.unwrap();
    session.best_move(&pos).await.unwrap();

    let script = shared.lock().unwrap();
    assert_eq!(script.spawns, 1, "healthy engine is reused across calls");
}

#[tokio::test]
async fn test_calls_are_serialized() {
    let shared = Shared::default();
    let session = session(&shared);
    let pos = Chess::default();

    let (a, b) = tokio::join!(session.analyze(&pos), session.analyze(&pos));
    a.unwrap();
    b.unwrap();

    // Each call probes, then searches; concurrent callers never interleave
    // inside an exchange.
    let script = shared.lock().unwrap();
    assert_eq!(script.events, vec!["spawn", "ping", "search", "ping", "search"]);
}

#[tokio::test]
async fn test_fault_restarts_once_and_retries() {
    let shared = Shared::default();
    shared.lock().unwrap().search_failures = 1;
    let session = session(&shared);

    let analysis = session.analyze(&Chess::default()).await.unwrap();
    assert_eq!(analysis.best_move, "e2e4");

    let script = shared.lock().unwrap();
    assert_eq!(script.spawns, 2, "fault triggers one restart");
    assert_eq!(
        script.events.iter().filter(|e| **e == "search").count(),
        2,
        "exactly one retry"
    );
}

#[tokio::test]
async fn test_second_fault_fails_without_looping() {
    let shared = Shared::default();
    shared.lock().unwrap().search_failures = 2;
    let session = session(&shared);
    let pos = Chess::default();

    let err = session.analyze(&pos).await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert_eq!(shared.lock().unwrap().spawns, 2, "no third attempt");

    // The slot was cleared, so a later call starts fresh and succeeds.
    session.analyze(&pos).await.unwrap();
    assert_eq!(shared.lock().unwrap().spawns, 3);
}

#[tokio::test]
async fn test_spawn_failure_is_unavailable_without_retry() {
    let shared = Shared::default();
    shared.lock().unwrap().spawn_failures = 1;
    let session = session(&shared);
    let pos = Chess::default();

    let err = session.analyze(&pos).await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    let searches = shared
        .lock()
        .unwrap()
        .events
        .iter()
        .filter(|e| **e == "search")
        .count();
    assert_eq!(searches, 0, "nothing to search without a process");

    // Next call is allowed to try launching again.
    session.analyze(&pos).await.unwrap();
    assert_eq!(shared.lock().unwrap().spawns, 1);
}

#[tokio::test]
async fn test_failed_probe_restarts_before_search() {
    let shared = Shared::default();
    let session = session(&shared);
    let pos = Chess::default();

    session.analyze(&pos).await.unwrap();
    shared.lock().unwrap().ping_failures = 1;
    session.analyze(&pos).await.unwrap();

    let script = shared.lock().unwrap();
    assert_eq!(script.spawns, 2, "dead probe replaces the process");
    assert_eq!(
        script.events,
        vec!["spawn", "ping", "search", "ping", "spawn", "search"]
    );
}

#[tokio::test]
async fn test_closed_session_rejects_calls() {
    let shared = Shared::default();
    let session = session(&shared);
    let pos = Chess::default();

    session.analyze(&pos).await.unwrap();
    session.close().await;

    let err = session.analyze(&pos).await.unwrap_err();
    assert!(matches!(err, EngineError::Closed));
    assert!(shared.lock().unwrap().events.contains(&"quit"));
}

#[tokio::test]
async fn test_close_before_start_spawns_nothing() {
    let shared = Shared::default();
    let session = session(&shared);
    session.close().await;

    let script = shared.lock().unwrap();
    assert_eq!(script.spawns, 0);
    assert!(!script.events.contains(&"quit"));
}

#[tokio::test]
async fn test_top_moves_ranked_and_bounded() {
    let shared = Shared::default();
    let session = session(&shared);
    let pos = Chess::default();

    let ranked = session.top_moves(&pos, 3).await.unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].uci, "e2e4");
    assert_eq!(ranked[0].score, Score::Cp(30));
    assert_eq!(ranked[2].uci, "g1f3");

    // Asking for more lines than the engine reports yields what exists.
    let ranked = session.top_moves(&pos, 50).await.unwrap();
    assert_eq!(ranked.len(), 6);
}
