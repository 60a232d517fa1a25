use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{Board, Direction};
use crate::hints;

/// Win or defeat condition evaluated after every move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalChecker {
    /// Some cell reaches at least this value.
    LargestCell(i64),
    /// The score reaches at least this value.
    TargetScore(i64),
    /// No combine path exists and no swipe changes the board.
    NoMoreMoves,
    /// Never satisfied.
    RunsForever,
}

impl GoalChecker {
    pub fn check(&self, board: &Board, score: i64) -> bool {
        match *self {
            GoalChecker::LargestCell(target) => board.highest_value().0.value() >= target,
            GoalChecker::TargetScore(target) => score >= target,
            GoalChecker::NoMoreMoves => !has_moves(board),
            GoalChecker::RunsForever => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            GoalChecker::LargestCell(v) => format!("Get a cell to {v}"),
            GoalChecker::TargetScore(v) => format!("Reach a score of {v}"),
            GoalChecker::NoMoreMoves => "No more moves available".to_string(),
            GoalChecker::RunsForever => "Game runs forever".to_string(),
        }
    }
}

impl fmt::Display for GoalChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.description()) }
}

/// True while any combine path or board-changing swipe remains.
pub fn has_moves(board: &Board) -> bool {
    hints::has_any_hint(board) || Direction::ALL.iter().any(|&d| board.swipe_changes(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_cell_and_score() {
        let b = Board::from_values(2, 2, &[1, 64, 0, 0]).unwrap();
        assert!(GoalChecker::LargestCell(64).check(&b, 0));
        assert!(!GoalChecker::LargestCell(65).check(&b, 0));
        assert!(GoalChecker::TargetScore(10).check(&b, 10));
        assert!(!GoalChecker::TargetScore(10).check(&b, 9));
        assert!(!GoalChecker::RunsForever.check(&b, i64::MAX));
    }

    #[test]
    fn no_more_moves_on_a_locked_board() {
        let locked = Board::from_values(2, 2, &[1, 5, 7, 11]).unwrap();
        assert!(GoalChecker::NoMoreMoves.check(&locked, 0));
        let swipeable = Board::from_values(2, 2, &[1, 5, 0, 11]).unwrap();
        assert!(!GoalChecker::NoMoreMoves.check(&swipeable, 0));
        let combinable = Board::from_values(2, 2, &[2, 2, 7, 11]).unwrap();
        assert!(!GoalChecker::NoMoreMoves.check(&combinable, 0));
    }
}
