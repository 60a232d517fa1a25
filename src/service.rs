//! Engine operations behind a transport.
//!
//! [`TallyService`] owns a [`Store`] and an in-memory cache of active games
//! keyed by session id. Every mutation works on a copy of the cached game,
//! persists it, and only then replaces the cached game, so a failed write
//! leaves the session where it was.
//!
//! ```
//! use tally_engine::board::Direction;
//! use tally_engine::service::{ServiceConfig, TallyService};
//! use tally_engine::store::MemoryStore;
//!
//! let service = TallyService::new(MemoryStore::new(), ServiceConfig::default());
//! let session = service.create_session("ada").unwrap();
//! let swiped = service.swipe(&session.session_id, Direction::Up).unwrap();
//! assert!(swiped.moves <= 1);
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, SystemTime};

use ahash::RandomState as AHasher;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::board::{Board, Direction, EvalMethod};
use crate::cell::Cell;
use crate::game::{self, Game, GameError, GameOptions, PlayState};
use crate::generator::{GameGenerator, GeneratorError, GeneratorOptions, SolvableGame, TargetCellGenerator, TargetCellOptions};
use crate::history::Instruction;
use crate::rating::Rating;
use crate::rules::{RuleMode, Rules};
use crate::solver::{new_solver, SolveOptions, Solution, SolverError};
use crate::stats::SolutionStats;
use crate::store::{
    CreateGameTemplatePayload, CreateUserSessionPayload, NewGamePayload, RestartGamePayload, Store, StoreError,
    UpdateGamePayload,
};
use crate::template::{template_by_id, tutorial_games, GameTemplate};

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("missing argument: {0}")]
    ArgumentMissing(String),
    #[error("invalid argument: {message}")]
    ArgumentInvalid { message: String, violations: Vec<FieldViolation> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl ServiceError {
    fn invalid(message: impl Into<String>) -> Self {
        ServiceError::ArgumentInvalid { message: message.into(), violations: Vec::new() }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => ServiceError::NotFound(m),
            StoreError::ArgumentMissing(m) => ServiceError::ArgumentMissing(m.to_string()),
            StoreError::ArgumentInvalid(m) => ServiceError::invalid(m),
            StoreError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

impl From<GameError> for ServiceError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::Path(e) if !e.is_invalid_path() => ServiceError::NotFound(e.to_string()),
            GameError::Path(e) => ServiceError::invalid(e.to_string()),
            GameError::NothingToUndo => ServiceError::invalid("nothing to undo"),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<SolverError> for ServiceError {
    fn from(err: SolverError) -> Self { ServiceError::Internal(err.to_string()) }
}

impl From<GeneratorError> for ServiceError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::InvalidOptions(_)
            | GeneratorError::TargetBelowMin { .. }
            | GeneratorError::TargetNotEven { .. }
            | GeneratorError::TooManyCells { .. } => ServiceError::invalid(err.to_string()),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub allow_challenge_creation: bool,
    pub allow_generation: bool,
    pub rows: usize,
    pub columns: usize,
    pub session_lifetime: Duration,
    /// Solver budget for [`TallyService::get_hint`]. `max_moves` is counted
    /// from the game's current move.
    pub hint_options: SolveOptions,
    /// Time each generated candidate may spend in the solver.
    pub generate_solve_time: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            allow_challenge_creation: false,
            allow_generation: false,
            rows: 5,
            columns: 5,
            session_lifetime: Duration::from_secs(60 * 60 * 24 * 30),
            hint_options: SolveOptions {
                max_depth: 10,
                max_visits: 6000,
                max_moves: 10,
                max_solutions: 1,
                max_time: Duration::from_secs(10),
                ..SolveOptions::default()
            },
            generate_solve_time: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    pub rows: usize,
    pub columns: usize,
    pub cells: Vec<Cell>,
}

impl From<&Board> for BoardView {
    fn from(b: &Board) -> Self { BoardView { rows: b.rows(), columns: b.columns(), cells: b.cells().to_vec() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub id: String,
    pub board: BoardView,
    pub score: i64,
    pub moves: u64,
    /// Falls back to the game name when the description is empty.
    pub description: String,
    pub mode: RuleMode,
    pub play_state: PlayState,
}

impl From<&Game> for GameView {
    fn from(g: &Game) -> Self {
        let description = if g.description().is_empty() { g.name() } else { g.description() };
        GameView {
            id: g.id().to_string(),
            board: g.board().into(),
            score: g.score(),
            moves: g.moves(),
            description: description.to_string(),
            mode: g.rules().mode,
            play_state: g.play_state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub username: String,
    pub game: GameView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeOutcome {
    pub did_change: bool,
    pub did_win: bool,
    pub did_lose: bool,
    pub board: BoardView,
    pub moves: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub board: BoardView,
    pub score: i64,
    pub moves: u64,
    pub did_win: bool,
}

/// Cells to combine, by index or by `(x, y)` coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Indexes(Vec<usize>),
    Coordinates(Vec<(usize, usize)>),
}

/// Ordering of solver results when picking a hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HintPreference {
    /// Short for fixed boards, first-combine for infinite modes.
    #[default]
    Unspecified,
    Short,
    HighestScore,
    MinimumSwipes,
    FirstCombine,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorAlgorithm {
    /// Random boards certified by the solver.
    #[default]
    Randomized,
    /// Boards built backwards from the target cell.
    Reverse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateGameRequest {
    pub algorithm: GeneratorAlgorithm,
    /// 0 uses the configured board size.
    pub rows: usize,
    pub columns: usize,
    pub target_cell_value: u64,
    pub max_bricks: usize,
    /// Reverse algorithm only. 0 places just the halving chain.
    pub max_additional_cells: usize,
    pub min_moves: u64,
    pub max_moves: u64,
    pub seed: u64,
    pub with_solutions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedGame {
    pub game: GameView,
    pub ideal_moves: u64,
    pub ideal_score: i64,
    pub highest_score: i64,
    pub solutions: Vec<Vec<Instruction>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChallengeRequest {
    pub name: String,
    pub description: String,
    pub rows: usize,
    pub columns: usize,
    pub target_cell_value: u64,
    pub challenge_number: Option<u32>,
    pub ideal_moves: Option<u64>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub id: String,
    pub challenge_number: Option<u32>,
    pub ideal_moves: Option<u64>,
    pub target_cell_value: u64,
    pub rows: u8,
    pub columns: u8,
    pub name: String,
    pub description: String,
    pub cells: Vec<Cell>,
    /// The caller's best won run: highest score, fewest moves.
    pub current_user_best_score: i64,
    pub current_user_fewest_moves: u64,
    pub rating: Rating,
}

#[derive(Debug, Clone)]
struct Active {
    user_id: String,
    username: String,
    game: Game,
}

/// Session-scoped game operations over a [`Store`].
pub struct TallyService<S: Store> {
    store: S,
    config: ServiceConfig,
    sessions: DashMap<String, Active, AHasher>,
}

impl<S: Store> TallyService<S> {
    pub fn new(store: S, config: ServiceConfig) -> Self {
        TallyService { store, config, sessions: DashMap::with_hasher(AHasher::new()) }
    }

    #[inline]
    pub fn config(&self) -> &ServiceConfig { &self.config }

    #[inline]
    pub fn store(&self) -> &S { &self.store }

    /// Create a user, a session and an infinite game for them.
    pub fn create_session(&self, username: &str) -> Result<SessionView, ServiceError> {
        boundary("create_session", || {
            if username.is_empty() {
                return Err(ServiceError::ArgumentMissing("username".into()));
            }
            let mut game = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::default())?;
            game.set_id(game::new_id());
            let created = self.store.create_user_session(CreateUserSessionPayload {
                session_id: game::new_id(),
                user_id: game::new_id(),
                username: username.to_string(),
                invalid_after: SystemTime::now() + self.config.session_lifetime,
                game: game.snapshot(),
            })?;
            let view = SessionView {
                session_id: created.session.id.clone(),
                username: created.user.username.clone(),
                game: (&game).into(),
            };
            self.sessions
                .insert(created.session.id, Active { user_id: created.user.id, username: created.user.username, game });
            log::info!("new session {} for {username}", view.session_id);
            Ok(view)
        })
    }

    /// Run `f` against the session's active game, loading it from the store
    /// on a cache miss.
    fn with_active<T>(&self, session_id: &str, f: impl FnOnce(&mut Active) -> Result<T, ServiceError>) -> Result<T, ServiceError> {
        if session_id.is_empty() {
            return Err(ServiceError::ArgumentMissing("session_id".into()));
        }
        if !self.sessions.contains_key(session_id) {
            let su = self.store.get_user_by_session_id(session_id)?;
            let game = Game::restore(&su.game.snapshot)?;
            self.sessions
                .entry(session_id.to_string())
                .or_insert(Active { user_id: su.user.id, username: su.user.username, game });
        }
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ServiceError::Internal(format!("session {session_id} vanished from the cache")))?;
        f(entry.value_mut())
    }

    fn persist(&self, game: &Game) -> Result<(), ServiceError> {
        self.store.update_game(UpdateGamePayload::from_snapshot(&game.snapshot())).map_err(|err| {
            log::error!("failed to save game {} at move {}: {err}", game.id(), game.moves());
            ServiceError::Internal(format!("failed to save the board: {err}"))
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionView, ServiceError> {
        boundary("get_session", || {
            self.with_active(session_id, |a| {
                Ok(SessionView { session_id: session_id.to_string(), username: a.username.clone(), game: (&a.game).into() })
            })
        })
    }

    /// Start a new game for the session's user. The previous game, if still
    /// being played, is abandoned.
    ///
    /// Infinite modes get a fresh seed. Tutorials default to the first level,
    /// challenges need a template id. A random challenge without a template
    /// picks one of the stored challenges.
    pub fn new_game(&self, session_id: &str, mode: RuleMode, template_id: Option<&str>) -> Result<GameView, ServiceError> {
        boundary("new_game", || {
            self.with_active(session_id, |a| {
                let (mut game, template_id) = match mode {
                    m if m.is_infinite() => (Game::new_infinite(m, GameOptions::default())?, None),
                    RuleMode::Tutorial => {
                        let template = match template_id {
                            Some(id) => self.find_template(id)?,
                            None => tutorial_games()
                                .first()
                                .cloned()
                                .ok_or_else(|| ServiceError::Internal("no tutorials are built in".into()))?,
                        };
                        (Game::from_template(&template, GameOptions::default())?, Some(template.id))
                    }
                    _ => {
                        let template = match template_id {
                            Some(id) => self.find_template(id)?,
                            None if mode == RuleMode::RandomChallenge => self.random_challenge()?,
                            None => return Err(ServiceError::ArgumentMissing("template_id".into())),
                        };
                        (Game::from_template(&template, GameOptions::default())?, Some(template.id))
                    }
                };
                game.set_id(game::new_id());
                self.store.new_game_for_user(NewGamePayload {
                    user_id: a.user_id.clone(),
                    template_id,
                    game: game.snapshot(),
                })?;
                log::info!("session {session_id} started {} game {}", mode, game.id());
                a.game = game;
                Ok((&a.game).into())
            })
        })
    }

    fn find_template(&self, id: &str) -> Result<GameTemplate, ServiceError> {
        if let Some(t) = template_by_id(id) {
            return Ok(t.clone());
        }
        self.store
            .get_game_challenges()?
            .into_iter()
            .find(|t| t.id == id)
            .map(|t| GameTemplate { id: t.id, name: t.name, description: t.description, rules: t.rules, cells: t.cells })
            .ok_or_else(|| ServiceError::NotFound(format!("template {id}")))
    }

    fn random_challenge(&self) -> Result<GameTemplate, ServiceError> {
        let challenges = self.store.get_game_challenges()?;
        if challenges.is_empty() {
            return Err(ServiceError::ResourceExhausted("no challenges are available at this time".into()));
        }
        let t = challenges[rand::random::<usize>() % challenges.len()].clone();
        Ok(GameTemplate { id: t.id, name: t.name, description: t.description, rules: t.rules, cells: t.cells })
    }

    pub fn swipe(&self, session_id: &str, dir: Direction) -> Result<SwipeOutcome, ServiceError> {
        boundary("swipe", || {
            self.with_active(session_id, |a| {
                let mut game = a.game.clone();
                let did_change = game.swipe(dir);
                if did_change {
                    self.persist(&game)?;
                    a.game = game;
                }
                Ok(SwipeOutcome {
                    did_change,
                    did_win: a.game.is_won(),
                    did_lose: a.game.is_lost(),
                    board: a.game.board().into(),
                    moves: a.game.moves(),
                })
            })
        })
    }

    /// Combine a selection of cells.
    ///
    /// An invalid path is rejected with a violation naming the failing
    /// position and the valid neighbours of the cell before it. A valid path
    /// that does not evaluate is `NotFound`.
    pub fn combine_cells(&self, session_id: &str, selection: Selection) -> Result<MoveOutcome, ServiceError> {
        boundary("combine_cells", || {
            let path = match selection {
                Selection::Indexes(p) => p,
                Selection::Coordinates(_) => return Err(ServiceError::Unimplemented("coordinate selections".into())),
            };
            if path.len() < 2 {
                return Err(ServiceError::invalid("selection must have at least two items"));
            }
            self.with_active(session_id, |a| {
                if let Err(err) = a.game.board().validate_path(&path) {
                    return Err(path_violation(a.game.board(), &path, &err.to_string(), err.position()));
                }
                let mut game = a.game.clone();
                game.combine(&path)?;
                self.persist(&game)?;
                a.game = game;
                Ok(MoveOutcome {
                    board: a.game.board().into(),
                    score: a.game.score(),
                    moves: a.game.moves(),
                    did_win: a.game.is_won(),
                })
            })
        })
    }

    pub fn undo(&self, session_id: &str) -> Result<MoveOutcome, ServiceError> {
        boundary("undo", || {
            self.with_active(session_id, |a| {
                if a.game.moves() == 0 {
                    return Err(ServiceError::invalid("the game is already at the beginning"));
                }
                let mut game = a.game.clone();
                game.undo()?;
                self.persist(&game)?;
                a.game = game;
                Ok(MoveOutcome {
                    board: a.game.board().into(),
                    score: a.game.score(),
                    moves: a.game.moves(),
                    did_win: a.game.is_won(),
                })
            })
        })
    }

    pub fn restart_game(&self, session_id: &str) -> Result<GameView, ServiceError> {
        boundary("restart_game", || {
            self.with_active(session_id, |a| {
                if a.game.moves() == 0 {
                    return Err(ServiceError::invalid("the game is already at the start"));
                }
                let record = self
                    .store
                    .restart_game(RestartGamePayload { user_id: a.user_id.clone(), game_id: a.game.id().to_string() })?;
                a.game = Game::restore(&record.snapshot)?;
                Ok((&a.game).into())
            })
        })
    }

    /// Instructions that lead towards a win, at most `max_length` of them
    /// (0 means one). Empty when nothing was found.
    ///
    /// Infinite games get a single combine from the current board, products
    /// first. Fixed boards are searched with the solver.
    pub fn get_hint(
        &self,
        session_id: &str,
        max_length: usize,
        preference: HintPreference,
    ) -> Result<Vec<Instruction>, ServiceError> {
        boundary("get_hint", || {
            let game = self.with_active(session_id, |a| Ok(a.game.clone()))?;
            let infinite = game.rules().mode.is_infinite();
            if infinite {
                let hints = game.hints();
                let pick = hints.iter().find(|h| h.method == EvalMethod::Product).or_else(|| hints.first());
                if let Some(h) = pick {
                    log::debug!("quick hint for game {} out of {}", game.id(), hints.len());
                    return self.record_hint(session_id, vec![Instruction::Combine(h.path.clone())]);
                }
            }
            let mut options = self.config.hint_options;
            if options.max_moves > 0 {
                options.max_moves += game.moves();
            }
            if game.rules().max_moves > 0 {
                options.max_moves = if options.max_moves == 0 {
                    game.rules().max_moves
                } else {
                    options.max_moves.min(game.rules().max_moves)
                };
            }
            let mut solutions = match new_solver(game.rules().mode, options).solve(&game) {
                Ok(s) => s,
                Err(err @ (SolverError::VisitsOverflow(_) | SolverError::Deadline(_))) => {
                    log::debug!("hint search for game {} gave up: {err}", game.id());
                    Vec::new()
                }
                Err(err) => return Err(err.into()),
            };
            log::debug!("hint solver returned {} solutions for game {}", solutions.len(), game.id());
            if solutions.is_empty() {
                return Ok(Vec::new());
            }
            let preference = match preference {
                HintPreference::Unspecified if infinite => HintPreference::FirstCombine,
                HintPreference::Unspecified => HintPreference::Short,
                p => p,
            };
            sort_by_preference(&mut solutions, preference);
            let mut best = solutions.swap_remove(0).instructions;
            best.truncate(max_length.max(1));
            self.record_hint(session_id, best)
        })
    }

    fn record_hint(&self, session_id: &str, instructions: Vec<Instruction>) -> Result<Vec<Instruction>, ServiceError> {
        self.with_active(session_id, |a| {
            let mut game = a.game.clone();
            game.record_hint();
            self.persist(&game)?;
            a.game = game;
            Ok(instructions)
        })
    }

    /// Generate a board with a known solution. Disabled unless
    /// `allow_generation` is set.
    pub fn generate_game(&self, request: &GenerateGameRequest) -> Result<GeneratedGame, ServiceError> {
        boundary("generate_game", || {
            if !self.config.allow_generation {
                return Err(ServiceError::ResourceExhausted("generating games has been disabled".into()));
            }
            let rows = if request.rows == 0 { self.config.rows } else { request.rows };
            let columns = if request.columns == 0 { self.config.columns } else { request.columns };
            if request.target_cell_value == 0 {
                return Err(ServiceError::ArgumentMissing("target_cell_value".into()));
            }
            let solvable = match request.algorithm {
                GeneratorAlgorithm::Reverse => TargetCellGenerator::new(TargetCellOptions {
                    target_cell: request.target_cell_value,
                    min_cell_value: 0,
                    random_cell_chance: -1,
                    max_cells: request.max_bricks,
                    max_additional_cells: match request.max_additional_cells {
                        0 => None,
                        n => Some(n),
                    },
                    rows,
                    columns,
                    max_moves: request.max_moves,
                    min_moves: request.min_moves,
                    seed: request.seed,
                    solve_time: self.config.generate_solve_time,
                    ..TargetCellOptions::default()
                })?
                .generate_game()?,
                GeneratorAlgorithm::Randomized => GameGenerator::new(GeneratorOptions {
                    rows,
                    columns,
                    target_cell_value: request.target_cell_value,
                    max_cells: request.max_bricks,
                    min_moves: request.min_moves,
                    max_moves: request.max_moves,
                    seed: request.seed,
                    solve: SolveOptions { max_time: self.config.generate_solve_time, ..SolveOptions::default() },
                    ..GeneratorOptions::default()
                })?
                .generate_one()?,
            };
            generated(solvable, request.with_solutions)
        })
    }

    /// Store a user-made challenge. Disabled unless
    /// `allow_challenge_creation` is set.
    pub fn create_game_challenge(&self, session_id: &str, request: CreateChallengeRequest) -> Result<String, ServiceError> {
        boundary("create_game_challenge", || {
            if !self.config.allow_challenge_creation {
                return Err(ServiceError::ResourceExhausted("creating game challenges has been disabled".into()));
            }
            for (field, n) in [("rows", request.rows), ("columns", request.columns)] {
                if !(3..=16).contains(&n) {
                    return Err(ServiceError::ArgumentInvalid {
                        message: format!("{field} must be between 3 and 16"),
                        violations: vec![FieldViolation { field: field.into(), description: format!("got {n}") }],
                    });
                }
            }
            if request.cells.len() != request.rows * request.columns {
                return Err(ServiceError::invalid("the number of cells must match rows * columns"));
            }
            let user_id = self.with_active(session_id, |a| Ok(a.user_id.clone()))?;
            let rules = Rules {
                description: request.description.clone(),
                ..Rules::challenge(
                    RuleMode::Challenge,
                    request.rows as u8,
                    request.columns as u8,
                    request.target_cell_value,
                    0,
                )
            };
            let record = self.store.create_game_template(CreateGameTemplatePayload {
                id: game::new_id(),
                created_by_id: user_id,
                challenge_number: request.challenge_number,
                ideal_moves: request.ideal_moves,
                name: request.name,
                description: request.description,
                cells: request.cells,
                rules,
            })?;
            Ok(record.id)
        })
    }

    /// Stored challenges with the caller's best run and its rating.
    pub fn get_game_challenges(&self, session_id: &str) -> Result<Vec<ChallengeView>, ServiceError> {
        boundary("get_game_challenges", || {
            let user_id = self.with_active(session_id, |a| Ok(a.user_id.clone()))?;
            let challenges = self.store.get_game_challenges()?;
            Ok(challenges
                .into_iter()
                .map(|c| {
                    let mine = c.stats.iter().filter(|s| s.user_id == user_id);
                    let best_score = mine.clone().map(|s| s.score).max().unwrap_or(0);
                    let fewest_moves = mine.map(|s| s.moves).min().unwrap_or(0);
                    let rating = match c.ideal_moves {
                        Some(ideal) => Rating::compute(best_score, 0, fewest_moves, ideal),
                        None => Rating::Unspecified,
                    };
                    ChallengeView {
                        id: c.id,
                        challenge_number: c.challenge_number,
                        ideal_moves: c.ideal_moves,
                        target_cell_value: c.rules.target_cell_value,
                        rows: c.rules.rows,
                        columns: c.rules.columns,
                        name: c.name,
                        description: c.description,
                        cells: c.cells,
                        current_user_best_score: best_score,
                        current_user_fewest_moves: fewest_moves,
                        rating,
                    }
                })
                .collect())
        })
    }
}

fn path_violation(board: &Board, path: &[usize], message: &str, position: Option<usize>) -> ServiceError {
    let position = position.unwrap_or(0);
    let description = match position.checked_sub(1).and_then(|p| path.get(p)) {
        Some(&previous) => format!(
            "the item before the invalid path ({previous}) has valid neighbours {:?}",
            board.neighbours(previous)
        ),
        None => String::new(),
    };
    ServiceError::ArgumentInvalid {
        message: format!("invalid path at ({position}): {message}"),
        violations: vec![FieldViolation { field: format!("path-index: {position}"), description }],
    }
}

fn count_swipes(s: &Solution) -> usize { s.instructions.iter().filter(|i| matches!(i, Instruction::Swipe(_))).count() }

fn first_combine(s: &Solution) -> usize {
    s.instructions.iter().position(|i| matches!(i, Instruction::Combine(_))).unwrap_or(s.instructions.len())
}

fn sort_by_preference(solutions: &mut [Solution], preference: HintPreference) {
    match preference {
        HintPreference::HighestScore => solutions.sort_by_key(|s| std::cmp::Reverse(s.score())),
        HintPreference::MinimumSwipes => solutions.sort_by_key(count_swipes),
        HintPreference::FirstCombine => solutions.sort_by_key(|s| (first_combine(s), s.moves())),
        HintPreference::Short | HintPreference::Unspecified => solutions.sort_by_key(Solution::moves),
    }
}

fn generated(solvable: SolvableGame, with_solutions: bool) -> Result<GeneratedGame, ServiceError> {
    let stats = SolutionStats::new(&solvable.game, &solvable.solutions)?;
    Ok(GeneratedGame {
        game: (&solvable.game).into(),
        ideal_moves: stats.ideal_moves as u64,
        ideal_score: stats.score_on_ideal,
        highest_score: stats.max_score,
        solutions: if with_solutions {
            solvable.solutions.into_iter().map(|s| s.instructions).collect()
        } else {
            Vec::new()
        },
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Recover panics from an operation and surface them as `Internal`.
fn boundary<T>(op: &str, f: impl FnOnce() -> Result<T, ServiceError>) -> Result<T, ServiceError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => {
            if let Err(err) = &result {
                log::debug!("{op} failed: {err}");
            }
            result
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("panic in {op}: {message}\n{}", Backtrace::force_capture());
            Err(ServiceError::Internal(format!("{op} panicked")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::template::challenge_games;

    fn service() -> TallyService<MemoryStore> {
        TallyService::new(
            MemoryStore::new(),
            ServiceConfig { allow_challenge_creation: true, allow_generation: true, ..ServiceConfig::default() },
        )
    }

    fn tutorial_session(svc: &TallyService<MemoryStore>) -> String {
        let s = svc.create_session("ada").unwrap();
        svc.new_game(&s.session_id, RuleMode::Tutorial, None).unwrap();
        s.session_id
    }

    #[test]
    fn sessions_start_with_an_infinite_game() {
        let svc = service();
        let s = svc.create_session("ada").unwrap();
        assert_eq!(s.username, "ada");
        assert_eq!(s.game.mode, RuleMode::InfiniteNormal);
        assert_eq!(s.game.moves, 0);
        assert_eq!(svc.get_session(&s.session_id).unwrap(), s);
        assert!(matches!(svc.get_session("missing"), Err(ServiceError::NotFound(_))));
        assert!(matches!(svc.get_session(""), Err(ServiceError::ArgumentMissing(_))));
        assert!(matches!(svc.create_session(""), Err(ServiceError::ArgumentMissing(_))));
    }

    #[test]
    fn new_game_abandons_the_previous_one() {
        let svc = service();
        let id = tutorial_session(&svc);
        let stats = svc.store().stats().unwrap();
        assert_eq!(stats.games, 2);
        assert_eq!(stats.games_abandoned, 1);
        let view = svc.get_session(&id).unwrap().game;
        assert_eq!(view.mode, RuleMode::Tutorial);
        assert!(view.description.starts_with("Get a brick to 36"));
        assert!(matches!(
            svc.new_game(&id, RuleMode::Challenge, None),
            Err(ServiceError::ArgumentMissing(_))
        ));
        assert!(matches!(
            svc.new_game(&id, RuleMode::RandomChallenge, None),
            Err(ServiceError::ResourceExhausted(_))
        ));
        assert!(matches!(svc.new_game(&id, RuleMode::Tutorial, Some("nope")), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn the_tutorial_can_be_won_through_the_service() {
        let svc = service();
        let id = tutorial_session(&svc);
        let first = svc.combine_cells(&id, Selection::Indexes(vec![2, 5, 8])).unwrap();
        assert_eq!(first.score, 18);
        assert!(!first.did_win);
        let second = svc.combine_cells(&id, Selection::Indexes(vec![6, 7, 8])).unwrap();
        assert_eq!(second.score, 54);
        assert_eq!(second.moves, 2);
        assert!(second.did_win);
        assert_eq!(svc.get_session(&id).unwrap().game.play_state, PlayState::Won);
        assert_eq!(svc.store().stats().unwrap().games_won, 1);
    }

    #[test]
    fn invalid_paths_carry_violation_details() {
        let svc = service();
        let id = tutorial_session(&svc);
        match svc.combine_cells(&id, Selection::Indexes(vec![5, 7])) {
            Err(ServiceError::ArgumentInvalid { violations, .. }) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "path-index: 1");
                assert!(violations[0].description.contains("(5)"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(svc.combine_cells(&id, Selection::Indexes(vec![2])), Err(ServiceError::ArgumentInvalid { .. })));
        assert!(matches!(svc.combine_cells(&id, Selection::Indexes(vec![2, 5])), Err(ServiceError::NotFound(_))));
        assert!(matches!(
            svc.combine_cells(&id, Selection::Coordinates(vec![(0, 0), (1, 0)])),
            Err(ServiceError::Unimplemented(_))
        ));
        assert_eq!(svc.get_session(&id).unwrap().game.moves, 0);
    }

    #[test]
    fn undo_and_restart() {
        let svc = service();
        let id = tutorial_session(&svc);
        assert!(matches!(svc.undo(&id), Err(ServiceError::ArgumentInvalid { .. })));
        assert!(matches!(svc.restart_game(&id), Err(ServiceError::ArgumentInvalid { .. })));
        let start = svc.get_session(&id).unwrap().game.board;

        svc.combine_cells(&id, Selection::Indexes(vec![2, 5, 8])).unwrap();
        let undone = svc.undo(&id).unwrap();
        assert_eq!(undone.board, start);
        assert_eq!(undone.score, 0);

        svc.combine_cells(&id, Selection::Indexes(vec![2, 5, 8])).unwrap();
        let restarted = svc.restart_game(&id).unwrap();
        assert_eq!(restarted.board, start);
        assert_eq!(restarted.moves, 0);
        assert_eq!(restarted.score, 0);
    }

    #[test]
    fn swipes_persist_only_on_change() {
        let svc = service();
        let id = tutorial_session(&svc);
        let right = svc.swipe(&id, Direction::Right).unwrap();
        assert!(!right.did_change);
        assert_eq!(right.moves, 0);
        let up = svc.swipe(&id, Direction::Up).unwrap();
        assert!(up.did_change);
        assert_eq!(up.moves, 1);
        assert_eq!(svc.store().stats().unwrap().longest_game, 1);
    }

    #[test]
    fn hints_for_fixed_and_infinite_games() {
        let svc = service();
        let id = tutorial_session(&svc);
        let hint = svc.get_hint(&id, 5, HintPreference::Unspecified).unwrap();
        assert_eq!(hint.len(), 2);
        assert!(matches!(hint[0], Instruction::Combine(_)));
        let one = svc.get_hint(&id, 0, HintPreference::Short).unwrap();
        assert_eq!(one.len(), 1);

        let s = svc.create_session("bob").unwrap();
        let quick = svc.get_hint(&s.session_id, 1, HintPreference::Unspecified).unwrap();
        assert!(quick.len() <= 1);
    }

    #[test]
    fn disabled_features_are_resource_exhausted() {
        let svc = TallyService::new(MemoryStore::new(), ServiceConfig::default());
        let s = svc.create_session("ada").unwrap();
        let req = GenerateGameRequest { target_cell_value: 48, max_moves: 10, ..Default::default() };
        assert!(matches!(svc.generate_game(&req), Err(ServiceError::ResourceExhausted(_))));
        let tpl = &challenge_games()[0];
        let create = CreateChallengeRequest {
            name: "x".into(),
            description: String::new(),
            rows: 5,
            columns: 5,
            target_cell_value: 512,
            challenge_number: None,
            ideal_moves: None,
            cells: tpl.cells.clone(),
        };
        assert!(matches!(svc.create_game_challenge(&s.session_id, create), Err(ServiceError::ResourceExhausted(_))));
    }

    #[test]
    fn reverse_generation_returns_a_solved_game() {
        let svc = service();
        let req = GenerateGameRequest {
            algorithm: GeneratorAlgorithm::Reverse,
            rows: 3,
            columns: 3,
            target_cell_value: 48,
            max_moves: 10,
            seed: 3,
            with_solutions: true,
            ..Default::default()
        };
        let g = svc.generate_game(&req).unwrap();
        assert!(g.ideal_moves >= 1);
        assert!(g.ideal_moves <= 10);
        assert_eq!(g.solutions.len(), 1);
        assert!(g.highest_score >= g.ideal_score);
    }

    #[test]
    fn challenges_are_rated_for_the_caller() {
        let svc = service();
        let id = tutorial_session(&svc);
        let tpl = &challenge_games()[0];
        let challenge_id = svc
            .create_game_challenge(
                &id,
                CreateChallengeRequest {
                    name: tpl.name.clone(),
                    description: tpl.description.clone(),
                    rows: 5,
                    columns: 5,
                    target_cell_value: 512,
                    challenge_number: Some(1),
                    ideal_moves: Some(9),
                    cells: tpl.cells.clone(),
                },
            )
            .unwrap();
        let listed = svc.get_game_challenges(&id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, challenge_id);
        assert_eq!(listed[0].rating, Rating::Unplayed);

        let view = svc.new_game(&id, RuleMode::Challenge, Some(&challenge_id)).unwrap();
        assert_eq!(view.board.cells, tpl.cells);
        assert!(matches!(
            svc.create_game_challenge(
                &id,
                CreateChallengeRequest {
                    name: "tiny".into(),
                    description: String::new(),
                    rows: 2,
                    columns: 2,
                    target_cell_value: 4,
                    challenge_number: None,
                    ideal_moves: None,
                    cells: vec![Cell::EMPTY; 4],
                },
            ),
            Err(ServiceError::ArgumentInvalid { .. })
        ));
    }

    #[test]
    fn a_cold_cache_loads_from_the_store() {
        let svc = service();
        let id = tutorial_session(&svc);
        svc.combine_cells(&id, Selection::Indexes(vec![2, 5, 8])).unwrap();
        svc.sessions.clear();
        let view = svc.get_session(&id).unwrap().game;
        assert_eq!(view.moves, 1);
        assert_eq!(view.score, 18);
        let undone = svc.undo(&id).unwrap();
        assert_eq!(undone.moves, 1);
        assert_eq!(undone.score, 0);
    }

    #[test]
    fn panics_become_internal_errors() {
        let err = boundary::<()>("explode", || panic!("boom")).unwrap_err();
        assert_eq!(err, ServiceError::Internal("explode panicked".into()));
    }
}
