//! Board statistics and the requirements the generator filters with.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::{Board, EvalMethod};
use crate::factors::Factors;
use crate::game::{Game, GameError};
use crate::hints;
use crate::history::Instruction;
use crate::solver::Solution;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    /// Distinct prime factors across all cells, ascending.
    pub unique_factors: Vec<u64>,
    /// Distinct cell values, ascending.
    pub unique_values: Vec<u64>,
    pub duplicate_factors: usize,
    pub duplicate_values: usize,
    /// Non-empty cells.
    pub with_value_count: usize,
    pub cell_count: usize,
    /// Only filled in by [`GameStats::with_hints`].
    pub unique_hints: usize,
}

impl GameStats {
    /// Cell-only statistics. No hint search.
    pub fn quick(board: &Board) -> Self {
        let mut combined = Factors::default();
        let mut values = Vec::new();
        for c in board.cells().iter().filter(|c| !c.is_empty()) {
            values.push(c.value().max(0) as u64);
            for &f in c.factors().factors() {
                combined.add_factor(f);
            }
        }
        let unique_values: Vec<u64> = values.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let unique_factors = combined.unique_factors();
        GameStats {
            duplicate_factors: combined.factors().len() - unique_factors.len(),
            duplicate_values: values.len() - unique_values.len(),
            with_value_count: values.len(),
            cell_count: board.len(),
            unique_factors,
            unique_values,
            unique_hints: 0,
        }
    }

    pub fn with_hints(board: &Board) -> Self {
        GameStats { unique_hints: hints::get_hints(board).len(), ..Self::quick(board) }
    }
}

/// What kind of move a solution step was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionTag {
    Addition,
    Multiplication,
    Swipe,
    Helper,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionStat {
    pub moves: usize,
    pub score: i64,
    pub tags: Vec<InstructionTag>,
}

/// Aggregates over a set of solutions to the same game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionStats {
    pub ideal_moves: usize,
    pub ideal_moves_index: usize,
    /// Score reached by the solution with the fewest moves.
    pub score_on_ideal: i64,
    pub max_score: i64,
    pub max_score_index: usize,
    pub stats: Vec<SolutionStat>,
}

impl SolutionStats {
    /// Replays every solution from `game` to tag its steps.
    pub fn new(game: &Game, solutions: &[Solution]) -> Result<Self, GameError> {
        let mut out = SolutionStats { stats: Vec::with_capacity(solutions.len()), ..Default::default() };
        for (i, s) in solutions.iter().enumerate() {
            if out.ideal_moves == 0 || s.moves() < out.ideal_moves {
                out.ideal_moves = s.moves();
                out.ideal_moves_index = i;
                out.score_on_ideal = s.score();
            }
            if s.score() > out.max_score {
                out.max_score = s.score();
                out.max_score_index = i;
            }
            out.stats.push(solution_stat(game, s)?);
        }
        Ok(out)
    }
}

fn solution_stat(game: &Game, solution: &Solution) -> Result<SolutionStat, GameError> {
    let mut g = game.clone();
    let mut tags = Vec::with_capacity(solution.instructions.len());
    for ins in &solution.instructions {
        let tag = match ins {
            Instruction::Swipe(_) => InstructionTag::Swipe,
            Instruction::Combine(path) => match g.board().evaluates_to(path)?.method {
                EvalMethod::Sum => InstructionTag::Addition,
                EvalMethod::Product => InstructionTag::Multiplication,
            },
            Instruction::Helper(_) => InstructionTag::Helper,
        };
        if !g.instruct(ins)? {
            return Err(GameError::Replay { instruction: ins.clone() });
        }
        tags.push(tag);
    }
    Ok(SolutionStat { moves: solution.moves(), score: g.score() - game.score(), tags })
}

/// Bounds on one integer. Every set bound must hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRequirement {
    pub gt: Option<i64>,
    pub gte: Option<i64>,
    pub eq: Option<i64>,
    pub lt: Option<i64>,
    pub lte: Option<i64>,
}

impl IntRequirement {
    pub fn between(min: i64, max: i64) -> Self { IntRequirement { gte: Some(min), lte: Some(max), ..Default::default() } }

    pub fn excludes(&self, n: i64) -> bool {
        self.gt.is_some_and(|b| n <= b)
            || self.gte.is_some_and(|b| n < b)
            || self.eq.is_some_and(|b| n != b)
            || self.lt.is_some_and(|b| n >= b)
            || self.lte.is_some_and(|b| n > b)
    }
}

/// Membership constraints on a list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntListRequirement {
    /// Every item must be present. Others are allowed.
    pub includes: Option<Vec<u64>>,
    /// No item may be present.
    pub excludes: Option<Vec<u64>>,
    /// Exactly these items, in any order.
    pub only: Option<Vec<u64>>,
}

impl IntListRequirement {
    pub fn excludes(&self, list: &[u64]) -> bool {
        if let Some(inc) = &self.includes {
            if inc.iter().any(|v| !list.contains(v)) {
                return true;
            }
        }
        if let Some(exc) = &self.excludes {
            if exc.iter().any(|v| list.contains(v)) {
                return true;
            }
        }
        if let Some(only) = &self.only {
            if only.len() != list.len() || only.iter().any(|v| !list.contains(v)) {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRequirement {
    pub cell_count: Option<IntRequirement>,
    pub duplicate_factors: Option<IntRequirement>,
    pub duplicate_values: Option<IntRequirement>,
    pub unique_factor_count: Option<IntRequirement>,
    pub with_value_count: Option<IntRequirement>,
    pub unique_factors: Option<IntListRequirement>,
    pub unique_values: Option<IntListRequirement>,
}

impl StatsRequirement {
    /// True if `stats` falls outside any set bound.
    pub fn excludes(&self, stats: &GameStats) -> bool {
        let int = |r: &Option<IntRequirement>, n: usize| r.as_ref().is_some_and(|r| r.excludes(n as i64));
        let list = |r: &Option<IntListRequirement>, l: &[u64]| r.as_ref().is_some_and(|r| r.excludes(l));
        int(&self.cell_count, stats.cell_count)
            || int(&self.duplicate_factors, stats.duplicate_factors)
            || int(&self.duplicate_values, stats.duplicate_values)
            || int(&self.unique_factor_count, stats.unique_factors.len())
            || int(&self.with_value_count, stats.with_value_count)
            || list(&self.unique_factors, &stats.unique_factors)
            || list(&self.unique_values, &stats.unique_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameOptions;
    use crate::solver::{BreadthFirstSolver, Solver};
    use crate::template::tutorial_games;

    #[test]
    fn quick_stats_count_values_and_factors() {
        let b = Board::from_values(2, 3, &[4, 6, 0, 4, 0, 9]).unwrap();
        let s = GameStats::quick(&b);
        assert_eq!(s.cell_count, 6);
        assert_eq!(s.with_value_count, 4);
        assert_eq!(s.unique_values, vec![4, 6, 9]);
        assert_eq!(s.duplicate_values, 1);
        assert_eq!(s.unique_factors, vec![2, 3]);
        // 2,2 + 2,3 + 2,2 + 3,3
        assert_eq!(s.duplicate_factors, 6);
        assert_eq!(s.unique_hints, 0);
    }

    #[test]
    fn hint_count() {
        let b = Board::from_values(3, 3, &[0, 0, 5, 0, 0, 4, 3, 6, 9]).unwrap();
        assert_eq!(GameStats::with_hints(&b).unique_hints, 2);
    }

    #[test]
    fn int_requirements() {
        let r = IntRequirement::between(3, 5);
        assert!(r.excludes(2));
        assert!(!r.excludes(3));
        assert!(!r.excludes(5));
        assert!(r.excludes(6));
        let r = IntRequirement { gt: Some(1), lt: Some(3), eq: Some(2), ..Default::default() };
        assert!(!r.excludes(2));
        assert!(r.excludes(1));
        assert!(!IntRequirement::default().excludes(i64::MIN));
    }

    #[test]
    fn list_requirements() {
        let r = IntListRequirement { includes: Some(vec![2, 3]), ..Default::default() };
        assert!(!r.excludes(&[2, 3, 5]));
        assert!(r.excludes(&[2, 5]));
        let r = IntListRequirement { excludes: Some(vec![7]), ..Default::default() };
        assert!(r.excludes(&[2, 7]));
        assert!(!r.excludes(&[2, 3]));
        let r = IntListRequirement { only: Some(vec![3, 2]), ..Default::default() };
        assert!(!r.excludes(&[2, 3]));
        assert!(r.excludes(&[2, 3, 5]));
    }

    #[test]
    fn stats_requirement_checks_each_field() {
        let b = Board::from_values(2, 3, &[4, 6, 0, 4, 0, 9]).unwrap();
        let s = GameStats::quick(&b);
        assert!(!StatsRequirement::default().excludes(&s));
        let r = StatsRequirement { with_value_count: Some(IntRequirement::between(5, 10)), ..Default::default() };
        assert!(r.excludes(&s));
        let r = StatsRequirement {
            unique_factors: Some(IntListRequirement { only: Some(vec![2, 3]), ..Default::default() }),
            ..Default::default()
        };
        assert!(!r.excludes(&s));
    }

    #[test]
    fn solution_stats_for_the_tutorial() {
        let g = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
        let solutions = BreadthFirstSolver::new().solve(&g).unwrap();
        let stats = SolutionStats::new(&g, &solutions).unwrap();
        assert_eq!(stats.ideal_moves, 2);
        assert_eq!(stats.stats.len(), solutions.len());
        let ideal = &stats.stats[stats.ideal_moves_index];
        assert_eq!(ideal.tags.len(), 2);
        assert_eq!(ideal.tags[0], InstructionTag::Addition);
        assert!(stats.max_score >= stats.score_on_ideal);
    }
}
