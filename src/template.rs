use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardError};
use crate::cell::{cells_from_values, Cell};
use crate::goal::GoalChecker;
use crate::rules::{RuleMode, Rules};

/// A fixed starting position with its rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rules: Rules,
    pub cells: Vec<Cell>,
}

impl GameTemplate {
    pub fn new(mode: RuleMode, id: &str, name: &str, description: &str, rows: u8, columns: u8) -> Self {
        GameTemplate {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            rules: Rules { description: description.to_string(), ..Rules::challenge(mode, rows, columns, 0, 0) },
            cells: vec![Cell::EMPTY; rows as usize * columns as usize],
        }
    }

    pub fn with_layout(mut self, values: &[i64]) -> Self {
        self.cells = cells_from_values(values);
        self
    }

    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }

    pub fn with_target_cell(mut self, value: u64) -> Self {
        self.rules.target_cell_value = value;
        self
    }

    pub fn with_max_moves(mut self, moves: u64) -> Self {
        self.rules.max_moves = moves;
        self
    }

    pub fn board(&self) -> Result<Board, BoardError> {
        Ok(Board::from_cells(self.rules.rows as usize, self.rules.columns as usize, self.cells.clone())?
            .with_options(self.rules.evaluate_options()))
    }

    pub fn goal(&self) -> GoalChecker { goal_for(&self.rules) }
}

/// Win condition implied by a rule set.
pub fn goal_for(rules: &Rules) -> GoalChecker {
    if rules.target_cell_value > 0 {
        GoalChecker::LargestCell(rules.target_cell_value as i64)
    } else if rules.target_score > 0 {
        GoalChecker::TargetScore(rules.target_score as i64)
    } else {
        GoalChecker::RunsForever
    }
}

static TUTORIALS: OnceLock<Vec<GameTemplate>> = OnceLock::new();
static CHALLENGES: OnceLock<Vec<GameTemplate>> = OnceLock::new();

pub fn tutorial_games() -> &'static [GameTemplate] {
    TUTORIALS.get_or_init(|| {
        vec![
            GameTemplate::new(
                RuleMode::Tutorial,
                "Sum&Product",
                "Sum & Product",
                "Get a brick to 36. Bricks can be added, or multiplied together. Try combining 5,4 into 9. What can you do with that 3 and 6?",
                3,
                3,
            )
            .with_layout(&[0, 0, 5, 0, 0, 4, 3, 6, 9])
            .with_target_cell(36)
            .with_max_moves(8),
            GameTemplate::new(
                RuleMode::Tutorial,
                "AllLinedUp",
                "All Lined Up",
                "Get a brick to 512. Can you combine them all into one?",
                4,
                4,
            )
            .with_layout(&[4, 1, 1, 4, 2, 16, 8, 4, 8, 32, 4, 4, 2, 8, 8, 1])
            .with_target_cell(512),
        ]
    })
}

pub fn challenge_games() -> &'static [GameTemplate] {
    CHALLENGES.get_or_init(|| {
        vec![GameTemplate::new(
            RuleMode::Challenge,
            "Ch:NotTheObviousPath",
            "Not the obvious path",
            "Get a brick to 512 within 10 moves",
            5,
            5,
        )
        .with_layout(&[0, 2, 1, 0, 1, 64, 4, 4, 1, 2, 64, 8, 4, 1, 0, 12, 3, 1, 0, 0, 16, 0, 0, 0, 0])
        .with_target_cell(512)
        .with_max_moves(10)]
    })
}

/// Look up a built-in template by id.
pub fn template_by_id(id: &str) -> Option<&'static GameTemplate> {
    tutorial_games().iter().chain(challenge_games()).find(|t| t.id == id)
}
