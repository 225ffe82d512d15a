//! Stockfish MCP library - chess analysis tools over the Model Context Protocol
//!
//! This library exposes a UCI chess engine (Stockfish by default) as a set of
//! MCP tools: position validation, engine analysis, and lightweight game
//! tracking.
//!
//! # Architecture
//!
//! - **Server**: MCP tool surface (stdio or HTTP)
//! - **Session**: lifecycle manager owning the engine subprocess
//! - **Engine**: UCI wire protocol over the subprocess pipes
//! - **Fen**: structural position validation, independent of the engine
//! - **Game**: single active game with move log and terminal-state flags
//!
//! # Example
//!
//! ```no_run
//! use stockfish_mcp::{ChessServer, EngineConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = ChessServer::new(EngineConfig::default());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod engine;
mod fen;
mod game;
mod server;
mod session;

// Crate-level exports - Engine protocol
pub use engine::{
    AnalysisResult, EngineConfig, EngineError, EngineLink, EngineSpawner, Score, SearchLine,
    SearchReport,
};

// Crate-level exports - Position validation
pub use fen::{FenError, is_valid, validate, validation_errors};

// Crate-level exports - Game tracking
pub use game::{GameError, GameState, GameStatus, GameStore};

// Crate-level exports - Server types
pub use server::{
    ChessServer, MoveRequest, PlayerSide, PositionRequest, StartGameRequest, TopMovesRequest,
};

// Crate-level exports - Session management
pub use session::{EngineSession, RankedMove};
