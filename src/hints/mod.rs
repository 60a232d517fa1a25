//! Exhaustive hint search over every combine path on the board.
//!
//! ```
//! use tally_engine::board::Board;
//! use tally_engine::hints::get_hints;
//!
//! let board = Board::from_values(3, 3, &[0, 0, 3, 1, 2, 3, 0, 0, 0]).unwrap();
//! let hints = get_hints(&board);
//! assert_eq!(hints.len(), 2);
//! ```

mod combine;

pub use combine::{get_combine_hints, has_any_hint};

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::board::{Board, EvalMethod};

/// A combine the player could make right now.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hint {
    /// Value the target cell will have after combining.
    pub value: i64,
    pub method: EvalMethod,
    pub path: Vec<usize>,
}

impl Hint {
    /// Direction-independent key: the smaller of the path and its reverse.
    pub fn key(&self) -> Vec<usize> { canonical(&self.path) }
}

fn canonical(path: &[usize]) -> Vec<usize> {
    let forward = path.to_vec();
    let backward: Vec<usize> = path.iter().rev().copied().collect();
    forward.min(backward)
}

/// Every distinct combine path, deduplicated by [`Hint::key`] and sorted by it.
///
/// Each starting cell is searched on the rayon pool. A walk is extended only
/// while its running sum or product can still equal some cell on the board.
pub fn get_hints(board: &Board) -> Vec<Hint> {
    let ceiling = board.highest_value().0.value();
    let merged: BTreeMap<Vec<usize>, Hint> = (0..board.len())
        .into_par_iter()
        .filter(|&start| board.get(start).is_some_and(|c| !c.is_empty()))
        .map(|start| {
            let mut found = Vec::new();
            let mut path = vec![start];
            walk(board, ceiling, &mut path, &mut found);
            found
        })
        .flatten_iter()
        .map(|h| (h.key(), h))
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    merged.into_values().collect()
}

fn walk(board: &Board, ceiling: i64, path: &mut Vec<usize>, found: &mut Vec<Hint>) {
    let last = path[path.len() - 1];
    for &next in board.neighbours(last) {
        if path.contains(&next) || board.get(next).map_or(true, |c| c.is_empty()) {
            continue;
        }
        path.push(next);
        if let Ok(e) = board.evaluates_to_unchecked(path) {
            found.push(Hint { value: e.value.saturating_mul(2), method: e.method, path: path.clone() });
        }
        if within_reach(board, path, ceiling) {
            walk(board, ceiling, path, found);
        }
        path.pop();
    }
}

/// Whether some enabled form of `path` as contributors stays at or below `ceiling`.
fn within_reach(board: &Board, path: &[usize], ceiling: i64) -> bool {
    let options = board.options();
    let (mut sum, mut product) = (0i64, 1i64);
    for &i in path {
        let v = board.get(i).map_or(0, |c| c.value());
        sum = sum.saturating_add(v);
        product = product.saturating_mul(v);
    }
    (!options.no_addition && sum <= ceiling) || (!options.no_multiply && product <= ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_finds_hints_on_a_small_board() {
        let b = Board::from_values(3, 3, &[0, 0, 3, 1, 2, 3, 0, 0, 0]).unwrap();
        let hints = get_hints(&b);
        assert_eq!(hints.len(), 2);
        let keys: Vec<Vec<usize>> = hints.iter().map(Hint::key).collect();
        assert!(keys.contains(&vec![2, 5]));
        assert!(keys.contains(&vec![3, 4, 5]));
        let sum = hints.iter().find(|h| h.key() == vec![3, 4, 5]).unwrap();
        assert_eq!(sum.value, 6);
        assert_eq!(sum.method, EvalMethod::Sum);
    }

    #[test]
    fn it_finds_a_long_product_through_a_large_intermediate() {
        let b = Board::from_values(3, 3, &[500, 1, 100, 1, 0, 5, 0, 0, 0]).unwrap();
        let hints = get_hints(&b);
        assert_eq!(hints.len(), 1, "{hints:?}");
        assert_eq!(hints[0].path, vec![5, 2, 1, 0]);
        assert_eq!(hints[0].method, EvalMethod::Product);
        assert_eq!(hints[0].value, 1000);
    }

    #[test]
    fn tutorial_board_has_two_sums() {
        let b = Board::from_values(3, 3, &[0, 0, 5, 0, 0, 4, 3, 6, 9]).unwrap();
        let hints = get_hints(&b);
        let keys: Vec<Vec<usize>> = hints.iter().map(Hint::key).collect();
        assert_eq!(keys, vec![vec![2, 5, 8], vec![6, 7, 8]]);
        assert!(hints.iter().all(|h| h.method == EvalMethod::Sum && h.value == 18));
    }

    #[test]
    fn hints_are_deterministic_and_valid() {
        let b = Board::from_values(5, 5, &[0, 2, 1, 0, 1, 64, 4, 4, 1, 2, 64, 8, 4, 1, 0, 12, 3, 1, 0, 0, 16, 0, 0, 0, 0])
            .unwrap();
        let first = get_hints(&b);
        assert_eq!(first, get_hints(&b));
        assert!(first.iter().any(|h| h.key() == vec![7, 12]));
        assert!(first.iter().any(|h| h.key() == vec![8, 13]));
        for h in &first {
            let e = b.evaluates_to(&h.path).unwrap();
            assert_eq!(e.value * 2, h.value);
        }
    }

    #[test]
    fn canonical_key_ignores_direction() {
        assert_eq!(canonical(&[5, 2, 1]), vec![1, 2, 5]);
        assert_eq!(canonical(&[1, 2, 5]), vec![1, 2, 5]);
        assert_eq!(canonical(&[3, 9, 2]), vec![2, 9, 3]);
    }
}
