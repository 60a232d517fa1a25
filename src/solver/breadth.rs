use std::mem;
use std::sync::atomic::AtomicBool;

use crate::game::Game;

use super::{Node, Search, SolveOptions, SolveStats, Solution, Solver, SolverError};

/// Level-by-level search. Solutions come back shortest first.
///
/// ```
/// use tally_engine::game::{Game, GameOptions};
/// use tally_engine::solver::{BreadthFirstSolver, Solver};
/// use tally_engine::template::tutorial_games;
///
/// let game = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
/// let mut solver = BreadthFirstSolver::new();
/// let solutions = solver.solve(&game).unwrap();
/// assert_eq!(solutions[0].moves(), 2);
/// ```
pub struct BreadthFirstSolver {
    options: SolveOptions,
    stats: SolveStats,
}

impl Default for BreadthFirstSolver {
    fn default() -> Self { Self::new() }
}

impl BreadthFirstSolver {
    pub fn new() -> Self { Self::with_options(SolveOptions::default()) }

    pub fn with_options(options: SolveOptions) -> Self { Self { options, stats: SolveStats::default() } }

    #[inline]
    pub fn options(&self) -> &SolveOptions { &self.options }

    pub fn reset_stats(&mut self) { self.stats = SolveStats::default(); }

    fn run(&self, search: &mut Search<'_>, game: &Game) -> Result<(), SolverError> {
        let root = Node::root(game);
        search.visit(&root)?;
        let mut frontier = vec![root];
        let mut depth = 0;
        while !frontier.is_empty() && !search.done {
            depth += 1;
            if depth > self.options.max_depth {
                log::debug!("breadth-first: {}", SolverError::DepthOverflow { depth, seen: search.seen.len() });
                break;
            }
            let mut next = Vec::new();
            for node in mem::take(&mut frontier) {
                search.check_budget()?;
                if node.game.is_lost() || search.at_move_limit(&node.game) {
                    continue;
                }
                for child in search.expand(&node)? {
                    match search.visit(&child) {
                        Ok(()) => next.push(child),
                        Err(SolverError::AlreadySeen) => {}
                        Err(e) => return Err(e),
                    }
                }
                if search.done {
                    break;
                }
            }
            frontier = next;
        }
        Ok(())
    }
}

impl Solver for BreadthFirstSolver {
    fn solve_with_cancel(&mut self, game: &Game, cancel: &AtomicBool) -> Result<Vec<Solution>, SolverError> {
        let mut search = Search::new(self.options, game, cancel);
        let result = self.run(&mut search, game);
        search.finish(result, &mut self.stats, "breadth-first")
    }

    #[inline]
    fn last_stats(&self) -> SolveStats { self.stats }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::solver::tests::{daily_midgame, replay, three_step_challenge, tutorial};

    #[test]
    fn it_solves_the_tutorial() {
        let g = tutorial();
        let mut s = BreadthFirstSolver::new();
        let solutions = s.solve(&g).unwrap();
        assert!(!solutions.is_empty());
        assert_eq!(solutions[0].moves(), 2);
        for sol in &solutions {
            assert!(sol.game.is_won());
            assert!(sol.game.moves() <= 8);
            assert!(replay(&g, sol).is_won());
        }
        let moves: Vec<usize> = solutions.iter().map(Solution::moves).collect();
        assert!(moves.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn it_finds_the_shortest_challenge_line() {
        let g = three_step_challenge();
        let mut s = BreadthFirstSolver::with_options(SolveOptions { max_solutions: 1, ..SolveOptions::default() });
        let solutions = s.solve(&g).unwrap();
        assert_eq!(solutions.len(), 1);
        assert!(["7,6,3,4;2,5,4;0,1,4;", "3,6,7,4;2,5,4;0,1,4;"].contains(&solutions[0].describe().as_str()), "{}", solutions[0].describe());
        assert_eq!(solutions[0].game.board().highest_value().0.value(), 80);
    }

    #[test]
    fn it_finishes_the_daily_challenge() {
        let g = daily_midgame();
        let options = SolveOptions { max_moves: 10, max_visits: 50_000, max_solutions: 1, max_time: Duration::from_secs(60), ..SolveOptions::default() };
        let mut s = BreadthFirstSolver::with_options(options);
        let solutions = s.solve(&g).unwrap();
        assert_eq!(solutions.len(), 1);
        let won = replay(&g, &solutions[0]);
        assert!(won.is_won());
        assert!(won.moves() <= 10);
        assert!(won.board().highest_value().0.value() >= 512);
    }

    #[test]
    fn move_limit_bounds_solutions() {
        let g = three_step_challenge();
        let mut s = BreadthFirstSolver::with_options(SolveOptions { max_moves: 2, ..SolveOptions::default() });
        assert!(s.solve(&g).unwrap().is_empty());
        let mut s = BreadthFirstSolver::with_options(SolveOptions { max_moves: 3, ..SolveOptions::default() });
        let solutions = s.solve(&g).unwrap();
        assert!(!solutions.is_empty());
        assert!(solutions.iter().all(|sol| sol.moves() == 3));
    }

    #[test]
    fn canceled_before_any_solution() {
        let cancel = AtomicBool::new(true);
        let mut s = BreadthFirstSolver::new();
        assert!(matches!(s.solve_with_cancel(&tutorial(), &cancel), Err(SolverError::Canceled)));
    }

    #[test]
    fn deadline_without_solutions_is_an_error() {
        let mut s = BreadthFirstSolver::with_options(SolveOptions { max_time: Duration::ZERO, ..SolveOptions::default() });
        assert!(matches!(s.solve(&tutorial()), Err(SolverError::Deadline(_))));
    }

    #[test]
    fn visits_overflow_keeps_solutions() {
        let mut s = BreadthFirstSolver::with_options(SolveOptions { max_visits: 3, ..SolveOptions::default() });
        match s.solve(&three_step_challenge()) {
            Err(SolverError::VisitsOverflow(3)) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.last_stats().visits, 4);
    }
}
