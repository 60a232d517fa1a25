//! Persistence seam for the engine service.
//!
//! The [`Store`] trait is what the service layer writes games, sessions and
//! challenges through. [`MemoryStore`] is the in-process implementation used
//! by the binaries and tests.

mod memory;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::game::{GameSnapshot, PlayState};
use crate::rules::{RuleMode, Rules};

pub use memory::MemoryStore;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing argument: {0}")]
    ArgumentMissing(&'static str),
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),
    #[error("internal store error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: SystemTime,
    pub invalid_after: SystemTime,
}

/// A persisted game and who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub user_id: String,
    /// Template the game was started from, if any.
    pub template_id: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
    pub snapshot: GameSnapshot,
}

impl GameRecord {
    #[inline]
    pub fn id(&self) -> &str { &self.snapshot.id }
}

/// A session joined with its user and the user's active game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub session: Session,
    pub user: User,
    pub game: GameRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayStats {
    pub game_id: String,
    pub user_id: String,
    pub username: String,
    pub score: i64,
    pub moves: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTemplateRecord {
    pub id: String,
    pub created_at: SystemTime,
    pub created_by_id: String,
    pub challenge_number: Option<u32>,
    pub ideal_moves: Option<u64>,
    pub name: String,
    pub description: String,
    pub cells: Vec<Cell>,
    pub rules: Rules,
    /// Won games played from this template.
    pub stats: Vec<PlayStats>,
}

/// Aggregate counters over everything in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub users: u64,
    pub sessions: u64,
    pub games: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub games_abandoned: u64,
    pub games_current: u64,
    /// Most moves recorded for a game.
    pub longest_game: u64,
    pub highest_score: i64,
    pub history_total: u64,
    pub history_min: u64,
    pub history_max: u64,
    pub history_avg: f64,
    pub history_std_dev: f64,
}

#[derive(Debug, Clone)]
pub struct CreateUserSessionPayload {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub invalid_after: SystemTime,
    pub game: GameSnapshot,
}

impl CreateUserSessionPayload {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.game.id.is_empty() {
            return Err(StoreError::ArgumentMissing("game.id"));
        }
        if self.user_id.is_empty() {
            return Err(StoreError::ArgumentMissing("user_id"));
        }
        if self.username.is_empty() {
            return Err(StoreError::ArgumentMissing("username"));
        }
        if self.session_id.is_empty() {
            return Err(StoreError::ArgumentMissing("session_id"));
        }
        if self.invalid_after < SystemTime::now() {
            return Err(StoreError::ArgumentInvalid("invalid_after cannot be in the past".into()));
        }
        validate_snapshot(&self.game)
    }
}

#[derive(Debug, Clone)]
pub struct NewGamePayload {
    pub user_id: String,
    pub template_id: Option<String>,
    pub game: GameSnapshot,
}

impl NewGamePayload {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.user_id.is_empty() {
            return Err(StoreError::ArgumentMissing("user_id"));
        }
        validate_snapshot(&self.game)
    }
}

/// The mutable part of a game after a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGamePayload {
    pub game_id: String,
    pub moves: u64,
    pub score: i64,
    pub cells: Vec<Cell>,
    pub seed: u64,
    pub state: u64,
    pub history: Vec<u8>,
    pub play_state: PlayState,
}

impl UpdateGamePayload {
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        UpdateGamePayload {
            game_id: snapshot.id.clone(),
            moves: snapshot.moves,
            score: snapshot.score,
            cells: snapshot.cells.clone(),
            seed: snapshot.seed,
            state: snapshot.state,
            history: snapshot.history.clone(),
            play_state: snapshot.play_state,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.game_id.is_empty() {
            return Err(StoreError::ArgumentMissing("game_id"));
        }
        if self.cells.is_empty() {
            return Err(StoreError::ArgumentMissing("cells"));
        }
        if self.moves > 0 && self.history.is_empty() {
            return Err(StoreError::ArgumentMissing("history"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RestartGamePayload {
    pub user_id: String,
    pub game_id: String,
}

impl RestartGamePayload {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.game_id.is_empty() {
            return Err(StoreError::ArgumentMissing("game_id"));
        }
        if self.user_id.is_empty() {
            return Err(StoreError::ArgumentMissing("user_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateGameTemplatePayload {
    pub id: String,
    pub created_by_id: String,
    pub challenge_number: Option<u32>,
    pub ideal_moves: Option<u64>,
    pub name: String,
    pub description: String,
    pub cells: Vec<Cell>,
    pub rules: Rules,
}

impl CreateGameTemplatePayload {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.is_empty() {
            return Err(StoreError::ArgumentMissing("id"));
        }
        if self.created_by_id.is_empty() {
            return Err(StoreError::ArgumentMissing("created_by_id"));
        }
        if self.name.is_empty() {
            return Err(StoreError::ArgumentMissing("name"));
        }
        if self.rules.mode == RuleMode::Challenge && self.rules.target_cell_value == 0 {
            return Err(StoreError::ArgumentMissing("rules.target_cell_value"));
        }
        if self.cells.len() != self.rules.rows as usize * self.rules.columns as usize {
            return Err(StoreError::ArgumentInvalid("number of cells must match rows * columns".into()));
        }
        Ok(())
    }
}

fn validate_snapshot(game: &GameSnapshot) -> Result<(), StoreError> {
    if game.id.is_empty() {
        return Err(StoreError::ArgumentMissing("game.id"));
    }
    if game.cells.is_empty() {
        return Err(StoreError::ArgumentMissing("game.cells"));
    }
    if game.cells.len() != game.rules.rows as usize * game.rules.columns as usize {
        return Err(StoreError::ArgumentInvalid(format!(
            "game has {} cells for a {}x{} board",
            game.cells.len(),
            game.rules.rows,
            game.rules.columns
        )));
    }
    if game.moves > 0 && game.history.is_empty() {
        return Err(StoreError::ArgumentMissing("game.history"));
    }
    game.rules.validate().map_err(|e| StoreError::ArgumentInvalid(e.to_string()))
}

/// Storage operations the engine service depends on.
///
/// Every write validates its payload first and leaves the store untouched on
/// error.
pub trait Store: Send + Sync {
    fn get_user_by_session_id(&self, session_id: &str) -> Result<SessionUser, StoreError>;

    /// Creates the user, the session and the user's first game.
    fn create_user_session(&self, payload: CreateUserSessionPayload) -> Result<SessionUser, StoreError>;

    /// Persists a new game and makes it the user's active game. A previous
    /// active game that was still being played is marked abandoned.
    fn new_game_for_user(&self, payload: NewGamePayload) -> Result<GameRecord, StoreError>;

    fn update_game(&self, payload: UpdateGamePayload) -> Result<(), StoreError>;

    /// The game as it was when it was created.
    fn get_original_game(&self, game_id: &str) -> Result<GameSnapshot, StoreError>;

    /// Resets a game to its original state and returns it.
    fn restart_game(&self, payload: RestartGamePayload) -> Result<GameRecord, StoreError>;

    fn create_game_template(&self, payload: CreateGameTemplatePayload) -> Result<GameTemplateRecord, StoreError>;

    /// Challenge templates ordered by challenge number, with play stats.
    fn get_game_challenges(&self) -> Result<Vec<GameTemplateRecord>, StoreError>;

    fn stats(&self) -> Result<Statistics, StoreError>;
}
