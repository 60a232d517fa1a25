//! Procedural board generation, certified by the breadth-first solver.
//!
//! [`GameGenerator`] fills random boards from the cell generator and runs a
//! rayon pool of candidate checks. [`TargetCellGenerator`] builds boards that
//! contain the halving chain of a target cell.

mod target_cell;

pub use target_cell::{required_cell_count, required_cells_highest_form, TargetCellGenerator, TargetCellOptions};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

use ahash::RandomState as AHasher;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::board::{Board, BoardHash};
use crate::cell::Cell;
use crate::cellgen::{pick_random_empty_cell, CellGenerator};
use crate::game::{Game, GameError, GameOptions};
use crate::randomizer::{Randomizer, SeededRandomizer};
use crate::rules::RuleMode;
use crate::solver::{BreadthFirstSolver, SolveOptions, Solution, Solver, SolverError};
use crate::stats::{GameStats, StatsRequirement};
use crate::template::GameTemplate;

#[derive(thiserror::Error, Debug)]
pub enum GeneratorError {
    #[error("invalid generator options: {0}")]
    InvalidOptions(String),
    #[error("target {target} is below the minimum cell value {min}")]
    TargetBelowMin { target: u64, min: u64 },
    #[error("target {target} is above the maximum cell value {max} and not divisible by 2")]
    TargetNotEven { target: u64, max: u64 },
    #[error("the target needs {needed} cells but only {available} are allowed")]
    TooManyCells { needed: usize, available: usize },
    #[error("no solvable game found in {attempts} attempts")]
    Exhausted { attempts: u64 },
    #[error("solution receiver hung up")]
    SinkClosed,
    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// A generated game together with the solver's proof that it can be won.
#[derive(Debug, Clone)]
pub struct SolvableGame {
    pub game: Game,
    pub solutions: Vec<Solution>,
}

impl SolvableGame {
    /// Moves of the shortest known solution.
    pub fn ideal_moves(&self) -> usize { self.solutions.iter().map(Solution::moves).min().unwrap_or(0) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub rows: usize,
    pub columns: usize,
    /// Win by reaching this cell value. Takes precedence over `target_score`.
    pub target_cell_value: u64,
    pub target_score: u64,
    /// Raised to the chain length of `target_cell_value` when lower.
    pub min_cells: usize,
    /// 0 means the board size.
    pub max_cells: usize,
    /// Reject boards solvable in fewer moves.
    pub min_moves: u64,
    pub max_moves: u64,
    pub max_iterations: u64,
    /// Worker threads. 0 uses rayon's default.
    pub concurrency: usize,
    /// Stop after this many accepted games.
    pub min_games: usize,
    pub seed: u64,
    pub solve: SolveOptions,
    pub requirements: Option<StatsRequirement>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            rows: 5,
            columns: 5,
            target_cell_value: 0,
            target_score: 0,
            min_cells: 0,
            max_cells: 0,
            min_moves: 0,
            max_moves: 0,
            max_iterations: 1_000_000,
            concurrency: 0,
            min_games: 1,
            seed: 0,
            solve: SolveOptions { max_time: Duration::from_millis(100), ..SolveOptions::default() },
            requirements: None,
        }
    }
}

/// Counters of a running or finished generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorReport {
    pub attempts: u64,
    pub accepted: u64,
    pub duplicates: u64,
    /// Rejected before solving: quick check or stats requirements.
    pub skipped: u64,
    /// Solver found nothing within bounds.
    pub unsolved: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    accepted: AtomicU64,
    duplicates: AtomicU64,
    skipped: AtomicU64,
    unsolved: AtomicU64,
}

impl Counters {
    fn report(&self, elapsed: Duration) -> GeneratorReport {
        GeneratorReport {
            attempts: self.attempts.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            unsolved: self.unsolved.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Why a worker stopped the pool.
enum Halt {
    Enough,
    Stopped,
    Failed(GeneratorError),
}

/// Random boards checked in parallel for solvability.
pub struct GameGenerator {
    options: GeneratorOptions,
    cell_generator: CellGenerator,
    counters: Counters,
}

impl GameGenerator {
    pub fn new(mut options: GeneratorOptions) -> Result<Self, GeneratorError> {
        if options.rows == 0 || options.columns == 0 {
            return Err(GeneratorError::InvalidOptions("rows and columns must be positive".into()));
        }
        let len = options.rows * options.columns;
        if options.max_cells > len {
            return Err(GeneratorError::InvalidOptions("max_cells cannot exceed rows * columns".into()));
        }
        if options.max_cells == 0 {
            options.max_cells = len;
        }
        if options.target_cell_value == 0 && options.target_score == 0 {
            return Err(GeneratorError::InvalidOptions("a target cell value or target score is required".into()));
        }
        if options.target_cell_value > 0 {
            let min = required_cell_count(1, 12, options.target_cell_value)? as usize;
            options.min_cells = options.min_cells.max(min);
        }
        options.min_cells = options.min_cells.max(1);
        if options.min_cells > options.max_cells {
            return Err(GeneratorError::TooManyCells { needed: options.min_cells, available: options.max_cells });
        }
        Ok(GameGenerator { options, cell_generator: CellGenerator::default(), counters: Counters::default() })
    }

    pub fn options(&self) -> &GeneratorOptions { &self.options }

    /// Counters so far. Safe to call from another thread while [`Self::generate`] runs.
    pub fn progress(&self) -> GeneratorReport { self.counters.report(Duration::ZERO) }

    /// Random cells on an empty board, between `min_cells` and `max_cells` of them.
    pub fn generate_board_values<R: Randomizer + ?Sized>(&self, rng: &R) -> Vec<Cell> {
        let o = &self.options;
        let mut board = Board::new(o.rows, o.columns);
        let span = o.max_cells - o.min_cells;
        let count = o.min_cells + if span > 0 { rng.intn(span + 1) } else { 0 };
        for _ in 0..count {
            let Some(index) = pick_random_empty_cell(&board, rng) else { break };
            if let Err(err) = board.add_cell(index, self.cell_generator.generate_pure(rng), false) {
                log::warn!("generator could not place a cell at {index}: {err}");
            }
        }
        board.cells().to_vec()
    }

    /// The candidate for one iteration. Deterministic in `seed` and `iteration`.
    pub fn candidate(&self, iteration: u64) -> Result<Game, GeneratorError> {
        let o = &self.options;
        let rng = SeededRandomizer::new(o.seed.wrapping_add(iteration));
        let mut template = GameTemplate::new(RuleMode::RandomChallenge, "gen", "generated", "", o.rows as u8, o.columns as u8)
            .with_cells(self.generate_board_values(&rng))
            .with_max_moves(o.max_moves)
            .with_target_cell(o.target_cell_value);
        template.rules.target_score = o.target_score;
        Ok(Game::from_template(&template, GameOptions::seeded(rng.int63() as u64))?)
    }

    /// Run the pool until `min_games` are accepted, `max_iterations` are spent
    /// or `stop` is raised. Accepted games go to `sink`.
    pub fn generate(&self, sink: &Sender<SolvableGame>, stop: &AtomicBool) -> Result<GeneratorReport, GeneratorError> {
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.options.concurrency).build()?;
        let seen: DashMap<BoardHash, (), AHasher> = DashMap::with_hasher(AHasher::new());
        log::info!(
            "generating {}x{} boards: target cell {}, moves {}..={}, {} iterations",
            self.options.rows,
            self.options.columns,
            self.options.target_cell_value,
            self.options.min_moves,
            self.options.max_moves,
            self.options.max_iterations
        );
        let result = pool.install(|| {
            (0..self.options.max_iterations)
                .into_par_iter()
                .try_for_each_with(sink.clone(), |tx, i| self.attempt(i, tx, stop, &seen))
        });
        let report = self.counters.report(started.elapsed());
        log::info!(
            "generator finished: {} attempts, {} accepted, {} duplicates, {} skipped, {} unsolved in {:?}",
            report.attempts,
            report.accepted,
            report.duplicates,
            report.skipped,
            report.unsolved,
            report.elapsed
        );
        match result {
            Ok(()) | Err(Halt::Enough) | Err(Halt::Stopped) => Ok(report),
            Err(Halt::Failed(e)) => Err(e),
        }
    }

    /// Convenience wrapper returning the first accepted game.
    pub fn generate_one(&self) -> Result<SolvableGame, GeneratorError> {
        let (tx, rx) = mpsc::channel();
        let report = self.generate(&tx, &AtomicBool::new(false))?;
        drop(tx);
        rx.into_iter().next().ok_or(GeneratorError::Exhausted { attempts: report.attempts })
    }

    fn attempt(
        &self,
        iteration: u64,
        sink: &mut Sender<SolvableGame>,
        stop: &AtomicBool,
        seen: &DashMap<BoardHash, (), AHasher>,
    ) -> Result<(), Halt> {
        if stop.load(Ordering::Relaxed) {
            return Err(Halt::Stopped);
        }
        if self.counters.accepted.load(Ordering::Relaxed) >= self.options.min_games as u64 {
            return Err(Halt::Enough);
        }
        let attempts = self.counters.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if attempts % 1_000 == 0 {
            log::debug!("generator progress: {:?}", self.counters.report(Duration::ZERO));
        }
        let game = self.candidate(iteration).map_err(Halt::Failed)?;
        if self.rejects(&game) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        if seen.insert(game.board().hash(), ()).is_some() {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let options = SolveOptions { max_moves: self.options.max_moves, max_solutions: 1, ..self.options.solve };
        let solutions = match BreadthFirstSolver::with_options(options).solve(&game) {
            Ok(s) => s,
            Err(SolverError::Game(e)) => return Err(Halt::Failed(e.into())),
            Err(_) => Vec::new(),
        };
        let shortest_ok = solutions.first().is_some_and(|s| s.game.moves() >= self.options.min_moves);
        if !shortest_ok {
            self.counters.unsolved.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        // Claim a slot before sending so racing workers never exceed `min_games`.
        let wanted = self.options.min_games as u64;
        let claimed = self
            .counters
            .accepted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < wanted).then_some(n + 1))
            .map_err(|_| Halt::Enough)?;
        sink.send(SolvableGame { game, solutions }).map_err(|_| Halt::Failed(GeneratorError::SinkClosed))?;
        if claimed + 1 >= wanted {
            return Err(Halt::Enough);
        }
        Ok(())
    }

    fn rejects(&self, game: &Game) -> bool {
        if self.options.target_cell_value > 0 {
            let values: Vec<u64> = game.cells().iter().map(|c| c.value().max(0) as u64).collect();
            if is_unsolvable_quick_check(&values, self.options.target_cell_value) {
                return true;
            }
        }
        self.options.requirements.as_ref().is_some_and(|r| r.excludes(&GameStats::quick(game.board())))
    }
}

/// True when the cells cannot possibly reach `target`: no cell is already at
/// the target and the product of all cells stays below twice the target.
pub fn is_unsolvable_quick_check(values: &[u64], target: u64) -> bool {
    let doubled = target.saturating_mul(2);
    let mut product = 1u64;
    for &v in values.iter().filter(|&&v| v != 0) {
        if v >= target {
            return false;
        }
        product = product.saturating_mul(v);
        if product >= doubled {
            return false;
        }
    }
    true
}
