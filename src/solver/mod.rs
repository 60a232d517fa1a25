//! Brute-force solvers over combine and swipe expansions.
//!
//! Both variants share [`SolveOptions`], a visited set keyed by
//! [`BoardHash`](crate::board::BoardHash) and the termination taxonomy in
//! [`SolverError`]. Use [`new_solver`] to get the variant that fits a mode.

mod breadth;
mod depth;

pub use breadth::BreadthFirstSolver;
pub use depth::DepthFirstSolver;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashSet;

use crate::board::{Board, BoardHash, Direction};
use crate::game::{Game, GameError};
use crate::hints;
use crate::history::Instruction;
use crate::rules::RuleMode;

/// Search limits.
///
/// There is no lower bound on moves. Callers that need one, such as the
/// generator's `min_moves`, filter the returned solutions by `Game::moves`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolveOptions {
    /// Deepest expansion, in instructions from the input game.
    pub max_depth: usize,
    /// Distinct board states visited before giving up.
    pub max_visits: usize,
    /// Total move count a solution may reach, counted like `Game::moves`. 0 is unlimited.
    pub max_moves: u64,
    /// Stop once this many solutions are found. 0 is unlimited.
    pub max_solutions: usize,
    pub max_time: Duration,
    /// Infinite modes: stop once a candidate gained this much score.
    pub infinite_game_max_score_increase: i64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_depth: 1_000,
            max_visits: 10_000,
            max_moves: 0,
            max_solutions: 0,
            max_time: Duration::from_secs(10),
            infinite_game_max_score_increase: 1_000,
        }
    }
}

/// Counters from the last search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Distinct states inserted into the visited set.
    pub visits: u64,
    /// States whose children were generated.
    pub expanded: u64,
    pub deepest: u64,
    pub solutions: u64,
    pub elapsed: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum SolverError {
    #[error("depth overflow at {depth} ({seen} states seen)")]
    DepthOverflow { depth: usize, seen: usize },
    #[error("visited more than {0} states")]
    VisitsOverflow(usize),
    #[error("reached the move limit of {0}")]
    MaxMovesReached(u64),
    #[error("state already seen")]
    AlreadySeen,
    #[error("time budget of {0:?} exceeded")]
    Deadline(Duration),
    #[error("search canceled")]
    Canceled,
    #[error(transparent)]
    Game(#[from] GameError),
}

impl SolverError {
    /// Whether the whole search stops, as opposed to only the current branch.
    pub fn should_quit(&self) -> bool {
        matches!(self, SolverError::VisitsOverflow(_) | SolverError::Deadline(_) | SolverError::Canceled | SolverError::Game(_))
    }

    /// Terminal errors that still hand back any solutions found so far.
    fn keeps_solutions(&self) -> bool {
        matches!(self, SolverError::VisitsOverflow(_) | SolverError::Deadline(_) | SolverError::Canceled)
    }
}

/// A finished game and the instructions that led there from the input game.
#[derive(Debug, Clone)]
pub struct Solution {
    pub game: Game,
    pub instructions: Vec<Instruction>,
}

impl Solution {
    /// Moves taken on top of the input game.
    pub fn moves(&self) -> usize { self.instructions.len() }

    pub fn score(&self) -> i64 { self.game.score() }

    /// `"7,6,3,4;2,5,4;0,1,4;"`
    pub fn describe(&self) -> String { self.instructions.iter().map(|i| i.to_string()).collect() }
}

pub trait Solver {
    fn solve_with_cancel(&mut self, game: &Game, cancel: &AtomicBool) -> Result<Vec<Solution>, SolverError>;

    fn solve(&mut self, game: &Game) -> Result<Vec<Solution>, SolverError> {
        self.solve_with_cancel(game, &AtomicBool::new(false))
    }

    fn last_stats(&self) -> SolveStats;
}

/// Depth-first for infinite modes, breadth-first (shortest solutions first) otherwise.
pub fn new_solver(mode: RuleMode, options: SolveOptions) -> Box<dyn Solver + Send> {
    if mode.is_infinite() {
        Box::new(DepthFirstSolver::with_options(options))
    } else {
        Box::new(BreadthFirstSolver::with_options(options))
    }
}

#[derive(Debug, Clone)]
struct Node {
    game: Game,
    steps: Vec<Instruction>,
    last_swipe: Option<Direction>,
}

impl Node {
    fn root(game: &Game) -> Self {
        let last_swipe = match game.history().last() {
            Some(Instruction::Swipe(d)) => Some(d),
            _ => None,
        };
        Node { game: game.clone(), steps: Vec::new(), last_swipe }
    }

    fn child(&self, game: Game, step: Instruction) -> Self {
        let last_swipe = match step {
            Instruction::Swipe(d) => Some(d),
            _ => None,
        };
        let mut steps = self.steps.clone();
        steps.push(step);
        Node { game, steps, last_swipe }
    }
}

/// Every hint path, plus its reverse where that also evaluates.
fn combine_paths(board: &Board) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    for hint in hints::get_hints(board) {
        let reversed: Vec<usize> = hint.path.iter().rev().copied().collect();
        let both = board.evaluates_to(&reversed).is_ok();
        paths.push(hint.path);
        if both {
            paths.push(reversed);
        }
    }
    paths
}

/// What became of an expanded child.
enum Outcome {
    /// Won, or a scoring candidate in an infinite mode. Not expanded further.
    Solved,
    /// Worth expanding.
    Open(Node),
}

/// State shared by one run of either solver.
struct Search<'a> {
    options: SolveOptions,
    cancel: &'a AtomicBool,
    started: Instant,
    seen: AHashSet<BoardHash>,
    solutions: Vec<Solution>,
    start_score: i64,
    infinite: bool,
    done: bool,
    stats: SolveStats,
}

impl<'a> Search<'a> {
    fn new(options: SolveOptions, game: &Game, cancel: &'a AtomicBool) -> Self {
        Search {
            options,
            cancel,
            started: Instant::now(),
            seen: AHashSet::default(),
            solutions: Vec::new(),
            start_score: game.score(),
            infinite: game.rules().mode.is_infinite(),
            done: false,
            stats: SolveStats::default(),
        }
    }

    fn check_budget(&self) -> Result<(), SolverError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SolverError::Canceled);
        }
        if self.started.elapsed() >= self.options.max_time {
            return Err(SolverError::Deadline(self.options.max_time));
        }
        Ok(())
    }

    /// Insert into the visited set; `AlreadySeen` if present.
    fn visit(&mut self, node: &Node) -> Result<(), SolverError> {
        if !self.seen.insert(node.game.board().hash()) {
            return Err(SolverError::AlreadySeen);
        }
        self.stats.visits += 1;
        self.stats.deepest = self.stats.deepest.max(node.steps.len() as u64);
        if self.seen.len() > self.options.max_visits {
            return Err(SolverError::VisitsOverflow(self.options.max_visits));
        }
        Ok(())
    }

    fn at_move_limit(&self, game: &Game) -> bool { self.options.max_moves > 0 && game.moves() >= self.options.max_moves }

    fn record(&mut self, node: &Node) {
        self.solutions.push(Solution { game: node.game.clone(), instructions: node.steps.clone() });
        self.stats.solutions += 1;
        if self.options.max_solutions > 0 && self.solutions.len() >= self.options.max_solutions {
            self.done = true;
        }
        if self.infinite && node.game.score() - self.start_score > self.options.infinite_game_max_score_increase {
            self.done = true;
        }
    }

    /// Children of `node`: every hint combine, then every useful swipe.
    ///
    /// Solved children are recorded here. Stops early once the search is done.
    fn expand(&mut self, node: &Node) -> Result<Vec<Node>, SolverError> {
        self.stats.expanded += 1;
        let mut open = Vec::new();
        for path in combine_paths(node.game.board()) {
            self.check_budget()?;
            let mut game = node.game.clone();
            game.combine(&path)?;
            let child = node.child(game, Instruction::Combine(path));
            match self.classify(child) {
                Outcome::Solved if self.done => return Ok(open),
                Outcome::Solved => {}
                Outcome::Open(n) => open.push(n),
            }
        }
        for dir in Direction::ALL {
            if let Some(last) = node.last_swipe {
                if last == dir || last == dir.opposite() {
                    continue;
                }
            }
            let mut game = node.game.clone();
            if !game.swipe(dir) {
                continue;
            }
            let child = node.child(game, Instruction::Swipe(dir));
            match self.classify(child) {
                Outcome::Solved if self.done => return Ok(open),
                Outcome::Solved => {}
                Outcome::Open(n) => open.push(n),
            }
        }
        Ok(open)
    }

    fn classify(&mut self, child: Node) -> Outcome {
        if child.game.is_won() {
            self.record(&child);
            return Outcome::Solved;
        }
        if self.infinite && child.game.score() > self.start_score {
            self.record(&child);
            if self.done {
                return Outcome::Solved;
            }
        }
        Outcome::Open(child)
    }

    /// Map the terminal error onto the result handed to callers.
    fn finish(mut self, result: Result<(), SolverError>, stats: &mut SolveStats, name: &str) -> Result<Vec<Solution>, SolverError> {
        self.stats.elapsed = self.started.elapsed();
        *stats = self.stats;
        log::debug!(
            "{name} solver: {} visits, {} expanded, depth {}, {} solutions in {:?}",
            self.stats.visits,
            self.stats.expanded,
            self.stats.deepest,
            self.stats.solutions,
            self.stats.elapsed
        );
        match result {
            Ok(()) => Ok(self.solutions),
            Err(e) if e.keeps_solutions() && !self.solutions.is_empty() => {
                log::debug!("{name} solver stopped early: {e}");
                Ok(self.solutions)
            }
            Err(e) => Err(e),
        }
    }
}
