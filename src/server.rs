//! MCP server setup and tool surface.
//!
//! Thin request/response wrappers over the validator, the engine session,
//! and the game store. Every analysis tool gates its FEN through the
//! structural validator and the rules library before the engine sees it;
//! every domain error becomes a structured MCP error, never a panic.

use crate::engine::EngineConfig;
use crate::game::{GameError, GameStore};
use crate::session::EngineSession;
use crate::fen;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default number of ranked moves for `top_moves`.
const DEFAULT_TOP_MOVES: u32 = 5;

/// Request carrying a FEN position string.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PositionRequest {
    /// Position in FEN notation.
    pub fen: String,
}

/// Request for ranked candidate moves.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopMovesRequest {
    /// Position in FEN notation.
    pub fen: String,
    /// Number of ranked moves to return (default 5).
    pub count: Option<u32>,
}

/// Side assignment for a new game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSide {
    /// The engine plays white.
    White,
    /// The engine plays black.
    Black,
}

impl From<PlayerSide> for Color {
    fn from(side: PlayerSide) -> Self {
        match side {
            PlayerSide::White => Color::White,
            PlayerSide::Black => Color::Black,
        }
    }
}

/// Request for starting a new game.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StartGameRequest {
    /// Side the engine plays (default black).
    pub side: Option<PlayerSide>,
    /// Difficulty level, 1-30 (default 10).
    pub difficulty: Option<u32>,
    /// Starting position in FEN notation (default: standard initial setup).
    pub fen: Option<String>,
}

/// Request carrying a move in coordinate notation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MoveRequest {
    /// Move in coordinate notation, e.g. `e2e4` or `e7e8q`.
    #[serde(rename = "move")]
    pub mv: String,
}

/// Main server handler.
pub struct ChessServer {
    engine: Arc<EngineSession>,
    games: GameStore,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ChessServer {
    /// Creates a server sharing an engine session and game store with
    /// other connections (HTTP mode spawns one server per session).
    pub fn with_shared(engine: Arc<EngineSession>, games: GameStore) -> Self {
        info!("creating chess server with shared engine session");
        Self {
            engine,
            games,
            tool_router: Self::tool_router(),
        }
    }

    /// Creates a server owning a fresh engine session.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_shared(Arc::new(EngineSession::new(config)), GameStore::new())
    }

    /// Validates a FEN string structurally.
    #[instrument(skip(self, req), fields(fen = %req.fen))]
    #[tool(description = "Validate a chess position in FEN notation. Returns whether it is \
                          structurally valid and every violated rule if not.")]
    pub async fn validate_position(
        &self,
        Parameters(req): Parameters<PositionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let errors: Vec<String> = fen::validation_errors(&req.fen)
            .iter()
            .map(|e| e.to_string())
            .collect();
        debug!(valid = errors.is_empty(), violations = errors.len(), "validated position");
        json_result(&json!({
            "valid": errors.is_empty(),
            "errors": errors,
        }))
    }

    /// Full engine analysis of a position.
    #[instrument(skip(self, req), fields(fen = %req.fen))]
    #[tool(description = "Analyze a chess position with the engine. Returns the best move, \
                          evaluation, search depth, and principal variation.")]
    pub async fn analyze_position(
        &self,
        Parameters(req): Parameters<PositionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let position = parse_position(&req.fen)?;
        let analysis = self
            .engine
            .analyze(&position)
            .await
            .map_err(engine_error)?;
        json_result(&analysis)
    }

    /// Best move only.
    #[instrument(skip(self, req), fields(fen = %req.fen))]
    #[tool(description = "Get the engine's best move for a chess position in FEN notation.")]
    pub async fn best_move(
        &self,
        Parameters(req): Parameters<PositionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let position = parse_position(&req.fen)?;
        let best = self
            .engine
            .best_move(&position)
            .await
            .map_err(engine_error)?;
        json_result(&json!({ "best_move": best }))
    }

    /// Ranked candidate moves.
    #[instrument(skip(self, req), fields(fen = %req.fen, count = ?req.count))]
    #[tool(description = "Get the engine's top candidate moves for a position, ranked best \
                          first with evaluations.")]
    pub async fn top_moves(
        &self,
        Parameters(req): Parameters<TopMovesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let position = parse_position(&req.fen)?;
        let count = req.count.unwrap_or(DEFAULT_TOP_MOVES);
        let ranked = self
            .engine
            .top_moves(&position, count)
            .await
            .map_err(engine_error)?;
        json_result(&ranked)
    }

    /// Starts a new game, replacing any prior one.
    #[instrument(skip(self, req))]
    #[tool(description = "Start a new game against the engine. Replaces any game in \
                          progress. The engine plays black unless told otherwise.")]
    pub async fn start_game(
        &self,
        Parameters(req): Parameters<StartGameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let side = req.side.unwrap_or(PlayerSide::Black);
        let difficulty = req.difficulty.unwrap_or(10);
        let status = self
            .games
            .start(side.into(), difficulty, req.fen.as_deref())
            .map_err(game_error)?;
        info!(engine_plays = status.engine_plays, difficulty, "game started");
        json_result(&json!({ "status": "started", "game": status }))
    }

    /// Applies the caller's move to the active game.
    #[instrument(skip(self, req), fields(r#move = %req.mv))]
    #[tool(description = "Make a move in the active game, in coordinate notation such as \
                          e2e4 or e7e8q.")]
    pub async fn make_move(
        &self,
        Parameters(req): Parameters<MoveRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.apply_move(&req.mv)
    }

    /// Records the opponent's move; identical to `make_move` by design —
    /// the game tracker does not enforce whose turn it is.
    #[instrument(skip(self, req), fields(r#move = %req.mv))]
    #[tool(description = "Record the opponent's move in the active game, in coordinate \
                          notation such as e2e4.")]
    pub async fn record_opponent_move(
        &self,
        Parameters(req): Parameters<MoveRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.apply_move(&req.mv)
    }

    /// Current game status.
    #[instrument(skip(self))]
    #[tool(description = "Get the status of the active game: position, move history, side \
                          to move, and game-over flags.")]
    pub async fn game_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.games.status().map_err(game_error)?;
        json_result(&status)
    }

    fn apply_move(&self, mv: &str) -> Result<CallToolResult, McpError> {
        let status = self.games.apply_move(mv).map_err(game_error)?;
        debug!(moves = status.move_history.len(), "move applied");
        json_result(&json!({ "status": "move applied", "game": status }))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ChessServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.instructions = Some(
            "Chess analysis and game tools backed by a UCI engine. Analysis tools take \
             FEN positions; game tools track a single active game."
                .into(),
        );
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info
    }
}

/// Gates a FEN through the structural validator, then the rules library.
/// Only positions that pass both ever reach the engine session.
fn parse_position(text: &str) -> Result<Chess, McpError> {
    fen::validate(text).map_err(|e| {
        warn!(error = %e, "rejected position");
        McpError::invalid_params(format!("invalid position: {e}"), None)
    })?;
    text.parse::<Fen>()
        .map_err(|e| McpError::invalid_params(format!("invalid position: {e}"), None))?
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| McpError::invalid_params(format!("invalid position: {e}"), None))
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn engine_error(e: crate::engine::EngineError) -> McpError {
    warn!(error = %e, "engine call failed");
    McpError::internal_error(e.to_string(), None)
}

fn game_error(e: GameError) -> McpError {
    match e {
        GameError::InvalidFen(_)
        | GameError::MoveSyntax(_)
        | GameError::IllegalMove(_)
        | GameError::NoActiveGame => McpError::invalid_params(e.to_string(), None),
    }
}
