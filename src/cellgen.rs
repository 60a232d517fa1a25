//! Produces new cells for refills and random boards.

use crate::board::Board;
use crate::cell::Cell;
use crate::randomizer::Randomizer;
use crate::weightmap::{easy_cell_weights, WeightMap};

/// How a new cell's value is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Weighted pick from the cell-value table.
    Random,
    /// A lower power of one of the board's highest cells.
    Helpful,
}

/// Cell producer with weighted strategies.
#[derive(Debug, Clone)]
pub struct CellGenerator {
    cells: WeightMap<i64>,
    strategies: WeightMap<Strategy>,
}

impl Default for CellGenerator {
    fn default() -> Self {
        CellGenerator {
            cells: easy_cell_weights().clone(),
            strategies: WeightMap::new().add(100, Strategy::Random).add(4, Strategy::Helpful),
        }
    }
}

impl CellGenerator {
    pub fn new(cells: WeightMap<i64>, strategies: WeightMap<Strategy>) -> Self { CellGenerator { cells, strategies } }

    pub fn pick_strategy<R: Randomizer + ?Sized>(&self, rng: &R) -> Strategy {
        self.strategies.sample(rng).unwrap_or(Strategy::Random)
    }

    /// Pick a strategy and an empty index, then produce a cell for it.
    /// `None` when the board has no empty cell.
    pub fn generate<R: Randomizer + ?Sized>(&self, board: &Board, rng: &R) -> Option<(usize, Cell)> {
        let strategy = self.pick_strategy(rng);
        let index = pick_random_empty_cell(board, rng)?;
        Some((index, self.generate_with(strategy, board, rng)))
    }

    /// A cell from the value table alone.
    pub fn generate_pure<R: Randomizer + ?Sized>(&self, rng: &R) -> Cell {
        Cell::from_value(self.cells.sample(rng).unwrap_or(1))
    }

    pub fn generate_with<R: Randomizer + ?Sized>(&self, strategy: Strategy, board: &Board, rng: &R) -> Cell {
        match strategy {
            Strategy::Random => self.generate_pure(rng),
            Strategy::Helpful => self.helpful(board, rng).unwrap_or_else(|| self.generate_pure(rng)),
        }
    }

    fn helpful<R: Randomizer + ?Sized>(&self, board: &Board, rng: &R) -> Option<Cell> {
        let mut filled: Vec<Cell> = board.cells().iter().copied().filter(|c| !c.is_empty()).collect();
        if filled.is_empty() {
            return None;
        }
        filled.sort_by(|a, b| b.value().cmp(&a.value()));
        let picked = filled[rng.intn(filled.len().min(3))];
        if picked.power() == 0 {
            return Some(Cell::new(2, 0));
        }
        let power = rng.int63n(picked.power() as i64) as u32;
        Some(Cell::new(picked.base(), power))
    }
}

pub fn pick_random_empty_cell<R: Randomizer + ?Sized>(board: &Board, rng: &R) -> Option<usize> {
    let empty = board.list_empty();
    if empty.is_empty() {
        return None;
    }
    Some(empty[rng.intn(empty.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomizer::SeededRandomizer;

    #[test]
    fn generated_cells_land_on_empty_slots() {
        let gen = CellGenerator::default();
        let rng = SeededRandomizer::new(5);
        let mut board = Board::from_values(2, 2, &[1, 0, 0, 3]).unwrap();
        for _ in 0..2 {
            let (i, c) = gen.generate(&board, &rng).unwrap();
            assert!(board.get(i).unwrap().is_empty());
            assert!(!c.is_empty());
            board.add_cell(i, c, false).unwrap();
        }
        assert_eq!(gen.generate(&board, &rng), None);
    }

    #[test]
    fn pure_cells_come_from_the_table() {
        let gen = CellGenerator::default();
        let rng = SeededRandomizer::new(11);
        for _ in 0..500 {
            let v = gen.generate_pure(&rng).value();
            assert!((1..=12).contains(&v), "value {v}");
        }
    }

    #[test]
    fn helpful_cells_are_lower_powers_of_top_cells() {
        let gen = CellGenerator::default();
        let rng = SeededRandomizer::new(9);
        let mut board = Board::new(2, 2);
        board.add_cell(0, Cell::new(3, 4), true).unwrap();
        for _ in 0..100 {
            let c = gen.generate_with(Strategy::Helpful, &board, &rng);
            assert_eq!(c.base(), 3);
            assert!(c.power() < 4);
        }
        let flat = Board::from_values(1, 2, &[7, 0]).unwrap();
        assert_eq!(gen.generate_with(Strategy::Helpful, &flat, &rng), Cell::new(2, 0));
    }

    #[test]
    fn helpful_on_empty_board_falls_back_to_random() {
        let gen = CellGenerator::default();
        let rng = SeededRandomizer::new(9);
        let c = gen.generate_with(Strategy::Helpful, &Board::new(2, 2), &rng);
        assert!((1..=12).contains(&c.value()));
    }
}
