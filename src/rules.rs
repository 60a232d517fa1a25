use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::board::EvaluateOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleMode {
    Tutorial,
    Challenge,
    RandomChallenge,
    InfiniteEasy,
    InfiniteNormal,
    InfiniteHard,
}

impl RuleMode {
    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, RuleMode::InfiniteEasy | RuleMode::InfiniteNormal | RuleMode::InfiniteHard)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleMode::Tutorial => "tutorial",
            RuleMode::Challenge => "challenge",
            RuleMode::RandomChallenge => "random-challenge",
            RuleMode::InfiniteEasy => "infinite-easy",
            RuleMode::InfiniteNormal => "infinite-normal",
            RuleMode::InfiniteHard => "infinite-hard",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for RuleMode {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RuleMode::Tutorial,
            RuleMode::Challenge,
            RuleMode::RandomChallenge,
            RuleMode::InfiniteEasy,
            RuleMode::InfiniteNormal,
            RuleMode::InfiniteHard,
        ]
        .into_iter()
        .find(|m| m.as_str() == s)
        .ok_or_else(|| RulesError::UnknownMode(s.to_string()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("starting_cells is required for mode {0}")]
    MissingStartingCells(RuleMode),
    #[error("target_cell_value is required for mode {0}")]
    MissingTargetCell(RuleMode),
    #[error("board dimensions {rows}x{columns} are invalid")]
    InvalidDimensions { rows: u8, columns: u8 },
    #[error("both addition and multiplication are disabled")]
    NoCombineForm,
    #[error("unknown rule mode {0:?}")]
    UnknownMode(String),
}

/// Rules a game is played under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    /// Store-assigned id. Not part of the content hash.
    pub id: String,
    pub description: String,
    pub mode: RuleMode,
    pub rows: u8,
    pub columns: u8,
    /// Cells generated at game start (infinite modes).
    pub starting_cells: u8,
    /// Generate a new cell after every successful swipe.
    pub recreate_on_swipe: bool,
    /// Reject a swipe equal or opposite to the previous instruction.
    pub no_reswipe: bool,
    pub no_multiply: bool,
    pub no_addition: bool,
    /// 0 means unlimited.
    pub max_moves: u64,
    /// The game is won once a cell reaches this value. 0 disables the goal.
    pub target_cell_value: u64,
    /// The game is won once the score reaches this value. 0 disables the goal.
    pub target_score: u64,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            id: String::new(),
            description: String::new(),
            mode: RuleMode::InfiniteNormal,
            rows: 5,
            columns: 5,
            starting_cells: 5,
            recreate_on_swipe: true,
            no_reswipe: false,
            no_multiply: false,
            no_addition: false,
            max_moves: 0,
            target_cell_value: 0,
            target_score: 0,
        }
    }
}

impl Rules {
    /// Default rules for an infinite mode.
    pub fn infinite(mode: RuleMode) -> Self { Rules { mode, ..Rules::default() } }

    /// Rules for a fixed board with no refills.
    pub fn challenge(mode: RuleMode, rows: u8, columns: u8, target_cell_value: u64, max_moves: u64) -> Self {
        Rules {
            mode,
            rows,
            columns,
            starting_cells: 0,
            recreate_on_swipe: false,
            max_moves,
            target_cell_value,
            ..Rules::default()
        }
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(RulesError::InvalidDimensions { rows: self.rows, columns: self.columns });
        }
        if self.no_addition && self.no_multiply {
            return Err(RulesError::NoCombineForm);
        }
        match self.mode {
            m if m.is_infinite() && self.starting_cells == 0 => Err(RulesError::MissingStartingCells(m)),
            m @ RuleMode::Challenge if self.target_cell_value == 0 => Err(RulesError::MissingTargetCell(m)),
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn evaluate_options(&self) -> EvaluateOptions {
        EvaluateOptions { no_multiply: self.no_multiply, no_addition: self.no_addition }
    }

    /// Content hash over every field but the id, hex encoded.
    pub fn hash(&self) -> String {
        let mut h = Sha256::new();
        if self.description.is_empty() {
            h.update([0x01]);
        } else {
            h.update(self.description.as_bytes());
        }
        h.update(self.mode.as_str().as_bytes());
        h.update([self.rows, self.columns, self.starting_cells]);
        h.update(self.target_cell_value.to_le_bytes());
        h.update(self.target_score.to_le_bytes());
        h.update(self.max_moves.to_le_bytes());
        h.update(pack_flags(&[false, self.recreate_on_swipe, self.no_reswipe, self.no_multiply, self.no_addition]));
        hex::encode(h.finalize())
    }
}

/// Pack booleans MSB first, eight per byte.
fn pack_flags(flags: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; flags.len().div_ceil(8)];
    for (i, _) in flags.iter().enumerate().filter(|(_, f)| **f) {
        out[i / 8] |= 0x80 >> (i % 8);
    }
    out
}

/// Read-mostly map from rule hash to rules, so identical rule sets share one id.
#[derive(Debug, Default)]
pub struct RuleCache {
    by_hash: RwLock<HashMap<String, Rules>>,
}

impl RuleCache {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, hash: &str) -> Option<Rules> {
        self.by_hash.read().unwrap_or_else(PoisonError::into_inner).get(hash).cloned()
    }

    /// Return the cached rules with the same content, inserting `rules` if absent.
    pub fn get_or_insert(&self, rules: Rules) -> Rules {
        let hash = rules.hash();
        if let Some(hit) = self.get(&hash) {
            return hit;
        }
        self.by_hash.write().unwrap_or_else(PoisonError::into_inner).entry(hash).or_insert(rules).clone()
    }

    pub fn len(&self) -> usize { self.by_hash.read().unwrap_or_else(PoisonError::into_inner).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
