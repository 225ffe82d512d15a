//! Single active game tracking.
//!
//! One game exists at a time; starting a new one unconditionally replaces
//! the old (replace-not-merge). All rules questions — parsing, legality,
//! terminal states — are delegated to the rules library; this module only
//! keeps the position, the move log, and the engine assignment together.

use derive_more::{Display, Error};
use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// Difficulty bounds; maps onto engine search depth.
const DIFFICULTY_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

/// Errors from game management.
#[derive(Debug, Clone, Display, Error)]
pub enum GameError {
    /// The position text was rejected by the rules library.
    #[display("invalid FEN: {_0}")]
    InvalidFen(#[error(not(source))] String),
    /// The move text is not coordinate notation.
    #[display("invalid move syntax '{_0}'")]
    MoveSyntax(#[error(not(source))] String),
    /// A well-formed move that is not legal in the current position.
    #[display("illegal move '{_0}' in the current position")]
    IllegalMove(#[error(not(source))] String),
    /// No game has been started yet.
    #[display("no active game, call start_game first")]
    NoActiveGame,
}

/// Snapshot of the game, fully derived from [`GameState`].
#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    /// Canonical FEN of the current position.
    pub fen: String,
    /// `"white"` or `"black"`.
    pub side_to_move: &'static str,
    /// Applied moves in coordinate notation, oldest first.
    pub move_history: Vec<String>,
    /// Side the engine plays.
    pub engine_plays: &'static str,
    /// Difficulty the game was started with.
    pub difficulty: u32,
    /// Side to move is in check.
    pub in_check: bool,
    /// Side to move is checkmated.
    pub checkmate: bool,
    /// Side to move is stalemated.
    pub stalemate: bool,
    /// Neither side can mate.
    pub insufficient_material: bool,
    /// The game has ended.
    pub game_over: bool,
}

/// One ongoing game: position, move log, engine side, difficulty.
#[derive(Debug, Clone)]
pub struct GameState {
    position: Chess,
    moves: Vec<String>,
    engine_color: Color,
    difficulty: u32,
}

impl GameState {
    /// Starts a game from `fen`, or the standard initial position when
    /// absent. The move log starts empty.
    #[instrument(skip(fen))]
    pub fn start(
        engine_color: Color,
        difficulty: u32,
        fen: Option<&str>,
    ) -> Result<Self, GameError> {
        let position = match fen {
            Some(text) => text
                .parse::<Fen>()
                .map_err(|e| GameError::InvalidFen(e.to_string()))?
                .into_position::<Chess>(CastlingMode::Standard)
                .map_err(|e| GameError::InvalidFen(e.to_string()))?,
            None => Chess::default(),
        };
        let difficulty = difficulty.clamp(*DIFFICULTY_RANGE.start(), *DIFFICULTY_RANGE.end());
        info!(engine_color = color_name(engine_color), difficulty, "game started");
        Ok(Self {
            position,
            moves: Vec::new(),
            engine_color,
            difficulty,
        })
    }

    /// Applies one move in coordinate notation, appending it to the log.
    /// Whose turn it logically is goes unchecked — the same entry point
    /// records both players' moves.
    #[instrument(skip(self))]
    pub fn apply_move(&mut self, text: &str) -> Result<(), GameError> {
        let uci: UciMove = text
            .parse()
            .map_err(|_| GameError::MoveSyntax(text.to_string()))?;
        let m = uci.to_move(&self.position).map_err(|_| {
            warn!(r#move = text, "move rejected as illegal");
            GameError::IllegalMove(text.to_string())
        })?;
        self.position.play_unchecked(&m);
        self.moves
            .push(m.to_uci(CastlingMode::Standard).to_string());
        Ok(())
    }

    /// Derives the full status snapshot.
    pub fn status(&self) -> GameStatus {
        let pos = &self.position;
        GameStatus {
            fen: Fen(pos.clone().into_setup(EnPassantMode::Legal)).to_string(),
            side_to_move: color_name(pos.turn()),
            move_history: self.moves.clone(),
            engine_plays: color_name(self.engine_color),
            difficulty: self.difficulty,
            in_check: pos.is_check(),
            checkmate: pos.is_checkmate(),
            stalemate: pos.is_stalemate(),
            insufficient_material: pos.is_insufficient_material(),
            game_over: pos.is_game_over(),
        }
    }

    /// Number of applied moves.
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Shared handle to the single active game.
///
/// Starting and applying moves both take the same lock: a `start_game`
/// racing a `make_move` can interleave no further than whole operations.
#[derive(Debug, Clone, Default)]
pub struct GameStore {
    inner: Arc<Mutex<Option<GameState>>>,
}

impl GameStore {
    /// Creates an empty store with no active game.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new game, unconditionally replacing any prior one.
    #[instrument(skip(self, fen))]
    pub fn start(
        &self,
        engine_color: Color,
        difficulty: u32,
        fen: Option<&str>,
    ) -> Result<GameStatus, GameError> {
        let mut guard = self.inner.lock().unwrap();
        let state = GameState::start(engine_color, difficulty, fen)?;
        let status = state.status();
        *guard = Some(state);
        Ok(status)
    }

    /// Applies a move to the active game.
    #[instrument(skip(self))]
    pub fn apply_move(&self, text: &str) -> Result<GameStatus, GameError> {
        let mut guard = self.inner.lock().unwrap();
        let state = guard.as_mut().ok_or(GameError::NoActiveGame)?;
        state.apply_move(text)?;
        Ok(state.status())
    }

    /// Status of the active game.
    pub fn status(&self) -> Result<GameStatus, GameError> {
        let guard = self.inner.lock().unwrap();
        let state = guard.as_ref().ok_or(GameError::NoActiveGame)?;
        Ok(state.status())
    }
}
