use std::sync::atomic::AtomicBool;

use crate::game::Game;

use super::{Node, Search, SolveOptions, SolveStats, Solution, Solver, SolverError};

/// Recursive search with one shared visited set.
///
/// In infinite modes every combine that raises the score is returned as a
/// candidate, and the search stops once a candidate gained
/// `infinite_game_max_score_increase` over the input game.
pub struct DepthFirstSolver {
    options: SolveOptions,
    stats: SolveStats,
}

impl Default for DepthFirstSolver {
    fn default() -> Self { Self::new() }
}

impl DepthFirstSolver {
    pub fn new() -> Self { Self::with_options(SolveOptions::default()) }

    pub fn with_options(options: SolveOptions) -> Self { Self { options, stats: SolveStats::default() } }

    #[inline]
    pub fn options(&self) -> &SolveOptions { &self.options }

    pub fn reset_stats(&mut self) { self.stats = SolveStats::default(); }

    fn descend(&self, search: &mut Search<'_>, node: Node) -> Result<(), SolverError> {
        search.check_budget()?;
        let depth = node.steps.len();
        if depth > self.options.max_depth {
            return Err(SolverError::DepthOverflow { depth, seen: search.seen.len() });
        }
        if search.at_move_limit(&node.game) {
            return Err(SolverError::MaxMovesReached(self.options.max_moves));
        }
        search.visit(&node)?;
        if node.game.is_lost() {
            return Ok(());
        }
        for child in search.expand(&node)? {
            if search.done {
                break;
            }
            match self.descend(search, child) {
                Err(e) if e.should_quit() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Solver for DepthFirstSolver {
    fn solve_with_cancel(&mut self, game: &Game, cancel: &AtomicBool) -> Result<Vec<Solution>, SolverError> {
        let mut search = Search::new(self.options, game, cancel);
        let result = match self.descend(&mut search, Node::root(game)) {
            Err(e) if e.should_quit() => Err(e),
            _ => Ok(()),
        };
        search.finish(result, &mut self.stats, "depth-first")
    }

    #[inline]
    fn last_stats(&self) -> SolveStats { self.stats }
}
