//! Ordered enumeration of combine paths without look-ahead.
//!
//! Products are tried first, targeting the highest cells. Sums follow, odd
//! targets before even ones and higher before lower within each parity.
//! Paths are grown backwards from the target, then reversed on emission.

use crate::board::{are_neighbours, Board, EvalMethod};

#[derive(Debug, Clone, Copy)]
struct Indexed {
    value: i64,
    index: usize,
}

struct Walk<'a, F> {
    cells: &'a [Indexed],
    rows: usize,
    columns: usize,
    emit: F,
    chain: Vec<usize>,
}

impl<F: FnMut(&[usize], EvalMethod) -> bool> Walk<'_, F> {
    fn emit(&mut self, target: usize, method: EvalMethod) -> bool {
        let mut path: Vec<usize> = self.chain.iter().rev().copied().collect();
        path.push(target);
        (self.emit)(&path, method)
    }

    fn prev(&self, target: usize) -> usize { self.chain.last().copied().unwrap_or(target) }

    fn candidates(&self, target: usize) -> Vec<Indexed> {
        let prev = self.prev(target);
        self.cells
            .iter()
            .copied()
            .filter(|c| c.index != target && !self.chain.contains(&c.index))
            .filter(|c| are_neighbours(prev, c.index, self.rows, self.columns))
            .collect()
    }

    fn products(&mut self, rest: i64, target: usize) -> bool {
        if rest == 1 {
            return self.emit(target, EvalMethod::Product);
        }
        for c in self.candidates(target) {
            if c.value == 0 || rest % c.value != 0 {
                continue;
            }
            self.chain.push(c.index);
            let stop = self.products(rest / c.value, target);
            self.chain.pop();
            if stop {
                return true;
            }
        }
        false
    }

    fn sums(&mut self, rest: i64, target: usize) -> bool {
        if rest == 0 {
            return self.emit(target, EvalMethod::Sum);
        }
        for c in self.candidates(target) {
            if rest - c.value < 0 {
                continue;
            }
            self.chain.push(c.index);
            let stop = self.sums(rest - c.value, target);
            self.chain.pop();
            if stop {
                return true;
            }
        }
        false
    }
}

/// Feed every combine path to `process` in the preferred order. Returning
/// `true` from `process` stops the enumeration.
///
/// The method passed along is the one [`Board::evaluates_to`] reports, so a
/// path found by the product walk that also sums is reported as a sum.
pub fn get_combine_hints<F>(board: &Board, mut process: F)
where
    F: FnMut(&[usize], EvalMethod) -> bool,
{
    let process = move |path: &[usize], found: EvalMethod| {
        let method = board.evaluates_to_unchecked(path).map_or(found, |e| e.method);
        process(path, method)
    };
    let mut by_value: Vec<Indexed> = board
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_empty())
        .map(|(index, c)| Indexed { value: c.value(), index })
        .collect();
    by_value.sort_by(|a, b| b.value.cmp(&a.value));
    let mut by_parity = by_value.clone();
    by_parity.sort_by(|a, b| (a.value % 2 == 0).cmp(&(b.value % 2 == 0)).then(b.value.cmp(&a.value)));

    let options = board.options();
    let mut walk = Walk { cells: &by_value, rows: board.rows(), columns: board.columns(), emit: process, chain: Vec::new() };
    if !options.no_multiply {
        for t in by_value.iter().filter(|t| t.value != 1) {
            if walk.products(t.value, t.index) {
                return;
            }
        }
    }
    if !options.no_addition {
        walk.cells = &by_parity;
        for t in by_parity.iter() {
            if walk.sums(t.value, t.index) {
                return;
            }
        }
    }
}

/// Whether any combine path exists.
pub fn has_any_hint(board: &Board) -> bool {
    let mut found = false;
    get_combine_hints(board, |_, _| {
        found = true;
        true
    });
    found
}
