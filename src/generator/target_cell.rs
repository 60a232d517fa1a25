use std::time::Duration;

use crate::factors::Factors;
use crate::game::{Game, GameOptions};
use crate::randomizer::{Randomizer, SeededRandomizer};
use crate::rules::RuleMode;
use crate::solver::{BreadthFirstSolver, SolveOptions, Solver, SolverError};
use crate::template::GameTemplate;

use super::{GeneratorError, SolvableGame};

/// Cells needed to reach `target` by doubling, in their highest form.
///
/// Halves `target` until it fits under `max`, then repeats the smallest half
/// so the chain has a starting pair. A target that already fits is returned
/// alone. Every halving step must be exact.
pub fn required_cells_highest_form(min: u64, max: u64, target: u64) -> Result<Vec<u64>, GeneratorError> {
    let mut needed = Vec::new();
    halving_chain(min, max, target, |x| needed.push(x))?;
    Ok(needed)
}

/// Length of [`required_cells_highest_form`], computed without building it.
pub fn required_cell_count(min: u64, max: u64, target: u64) -> Result<u64, GeneratorError> {
    let mut count = 0;
    halving_chain(min, max, target, |_| count += 1)?;
    Ok(count)
}

fn halving_chain(min: u64, max: u64, target: u64, mut push: impl FnMut(u64)) -> Result<(), GeneratorError> {
    if target < min {
        return Err(GeneratorError::TargetBelowMin { target, min });
    }
    if target <= max {
        push(target);
        return Ok(());
    }
    let mut x = target;
    while x > max {
        if x % 2 != 0 {
            return Err(GeneratorError::TargetNotEven { target, max });
        }
        x /= 2;
        push(x);
    }
    push(x);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCellOptions {
    pub target_cell: u64,
    pub min_cell_value: u64,
    pub max_cell_value: u64,
    /// Out of 120: chance that an extra step inserts a random cell instead of
    /// splitting one. Negative disables random cells.
    pub random_cell_chance: i32,
    /// 0 means the board size.
    pub max_cells: usize,
    /// Upper bound on cells added by splitting or random inserts. `None`
    /// keeps the board at the required cells, `Some(0)` allows as many as fit.
    pub max_additional_cells: Option<usize>,
    pub rows: usize,
    pub columns: usize,
    pub max_moves: u64,
    pub min_moves: u64,
    pub seed: u64,
    /// Time budget for the solvability check of each candidate.
    pub solve_time: Duration,
}

impl Default for TargetCellOptions {
    fn default() -> Self {
        TargetCellOptions {
            target_cell: 0,
            min_cell_value: 1,
            max_cell_value: 12,
            random_cell_chance: 12,
            max_cells: 0,
            max_additional_cells: Some(0),
            rows: 5,
            columns: 5,
            max_moves: 0,
            min_moves: 0,
            seed: 0,
            solve_time: Duration::from_millis(100),
        }
    }
}

/// Builds boards around the halving chain of one target cell.
///
/// Candidates are made achievable by construction: extra cells come from
/// splitting an existing cell into two factors with the same product.
pub struct TargetCellGenerator {
    options: TargetCellOptions,
    needed: Vec<u64>,
    randomizer: SeededRandomizer,
}

const MAX_RETRIES: usize = 1_000;

impl TargetCellGenerator {
    pub fn new(options: TargetCellOptions) -> Result<Self, GeneratorError> {
        if options.rows == 0 || options.columns == 0 {
            return Err(GeneratorError::InvalidOptions("rows and columns must be positive".into()));
        }
        if options.max_moves == 0 {
            return Err(GeneratorError::InvalidOptions("max_moves must be positive".into()));
        }
        if options.target_cell == 0 {
            return Err(GeneratorError::InvalidOptions("target_cell must be positive".into()));
        }
        if options.max_cells > options.rows * options.columns {
            return Err(GeneratorError::InvalidOptions("max_cells cannot exceed the board size".into()));
        }
        if options.max_cell_value <= options.min_cell_value {
            return Err(GeneratorError::InvalidOptions("max_cell_value must exceed min_cell_value".into()));
        }
        let needed = required_cells_highest_form(options.min_cell_value, options.max_cell_value, options.target_cell)?;
        let randomizer = SeededRandomizer::new(options.seed);
        Ok(TargetCellGenerator { options, needed, randomizer })
    }

    pub fn options(&self) -> &TargetCellOptions { &self.options }

    /// Cells every candidate starts from.
    pub fn required_cells(&self) -> &[u64] { &self.needed }

    /// A candidate board, not yet checked for solvability.
    pub fn generate_candidate(&self) -> Result<Game, GeneratorError> {
        let o = &self.options;
        let board_cells = o.rows * o.columns;
        let limit = if o.max_cells == 0 { board_cells } else { o.max_cells };
        if self.needed.len() > limit {
            return Err(GeneratorError::TooManyCells { needed: self.needed.len(), available: limit });
        }
        let mut cells = self.needed.clone();
        if let Some(max_additional) = o.max_additional_cells {
            let room = limit - cells.len();
            let cap = if max_additional == 0 { room } else { room.min(max_additional) };
            let additional = if cap > 0 { self.randomizer.intn(cap) } else { 0 };
            self.add_cells(&mut cells, additional);
        }

        let mut values = vec![0i64; board_cells];
        for v in cells {
            loop {
                let i = self.randomizer.intn(board_cells);
                if values[i] == 0 {
                    values[i] = v as i64;
                    break;
                }
            }
        }
        let template = GameTemplate::new(RuleMode::RandomChallenge, "gen", "generated", "", o.rows as u8, o.columns as u8)
            .with_layout(&values)
            .with_max_moves(o.max_moves)
            .with_target_cell(o.target_cell);
        Ok(Game::from_template(&template, GameOptions::seeded(self.randomizer.int63() as u64))?)
    }

    /// Grow `cells` by `count`, by random inserts or by splitting a cell into
    /// one of its prime factors and the remaining quotient.
    fn add_cells(&self, cells: &mut Vec<u64>, count: usize) {
        let o = &self.options;
        let mut added = 0;
        let mut attempts = 0;
        while added < count && attempts < count * 16 {
            attempts += 1;
            if o.random_cell_chance > 0 && self.randomizer.intn(120) < o.random_cell_chance as usize {
                let span = (o.max_cell_value - o.min_cell_value) as i64;
                let v = self.randomizer.int63n(span) as u64 + o.min_cell_value;
                if v != 0 {
                    cells.push(v);
                    added += 1;
                }
                continue;
            }
            let at = self.randomizer.intn(cells.len());
            let n = cells[at];
            if n <= 1 {
                continue;
            }
            let unique = Factors::of(n).unique_factors();
            let factor = unique[self.randomizer.intn(unique.len())];
            cells[at] = factor;
            cells.push(n / factor);
            added += 1;
        }
    }

    /// Retry candidates until one is solvable within the move bounds.
    pub fn generate_game(&self) -> Result<SolvableGame, GeneratorError> {
        let options = SolveOptions {
            max_moves: self.options.max_moves,
            max_solutions: 1,
            max_time: self.options.solve_time,
            ..SolveOptions::default()
        };
        for attempt in 0..MAX_RETRIES {
            let game = self.generate_candidate()?;
            let solutions = match BreadthFirstSolver::with_options(options).solve(&game) {
                Ok(s) => s,
                Err(SolverError::Deadline(_) | SolverError::VisitsOverflow(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            match solutions.first() {
                Some(s) if s.game.moves() >= self.options.min_moves => {
                    log::debug!("target-cell candidate {attempt} solvable in {} moves", s.moves());
                    return Ok(SolvableGame { game, solutions });
                }
                _ => continue,
            }
        }
        Err(GeneratorError::Exhausted { attempts: MAX_RETRIES as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_form_halves_the_target() {
        assert_eq!(required_cells_highest_form(0, 12, 768).unwrap(), vec![384, 192, 96, 48, 24, 12, 12]);
        assert_eq!(required_cells_highest_form(1, 12, 10).unwrap(), vec![10]);
        assert!(matches!(required_cells_highest_form(4, 12, 3), Err(GeneratorError::TargetBelowMin { .. })));
        assert!(matches!(required_cells_highest_form(4, 12, 303), Err(GeneratorError::TargetNotEven { .. })));
    }

    #[test]
    fn cell_count_matches_the_chain() {
        assert_eq!(required_cell_count(1, 12, 768).unwrap(), 7);
        assert_eq!(required_cell_count(1, 12, 48).unwrap(), 3);
        assert_eq!(required_cell_count(1, 12, 12).unwrap(), 1);
        assert!(required_cell_count(1, 12, 13).is_err());
        for target in [1, 5, 12, 24, 36, 48, 96, 768, 1536] {
            let chain = required_cells_highest_form(1, 12, target).unwrap();
            assert_eq!(required_cell_count(1, 12, target).unwrap(), chain.len() as u64, "target {target}");
            assert_eq!(chain.iter().rev().skip(1).fold(chain[chain.len() - 1], |acc, _| acc * 2), target);
        }
    }

    #[test]
    fn odd_halves_are_rejected() {
        assert!(matches!(required_cells_highest_form(1, 12, 26), Err(GeneratorError::TargetNotEven { .. })));
        assert!(matches!(required_cell_count(1, 12, 26), Err(GeneratorError::TargetNotEven { .. })));
    }

    #[test]
    fn it_rejects_bad_options() {
        assert!(TargetCellGenerator::new(TargetCellOptions { target_cell: 48, ..Default::default() }).is_err());
        assert!(TargetCellGenerator::new(TargetCellOptions { max_moves: 5, ..Default::default() }).is_err());
        let o = TargetCellOptions { target_cell: 48, max_moves: 5, max_cells: 26, ..Default::default() };
        assert!(TargetCellGenerator::new(o).is_err());
    }

    #[test]
    fn candidates_keep_the_product_of_the_chain() {
        let gen = TargetCellGenerator::new(TargetCellOptions {
            target_cell: 768,
            max_moves: 20,
            random_cell_chance: -1,
            seed: 7,
            ..Default::default()
        })
        .unwrap();
        let product: u64 = gen.required_cells().iter().product();
        for _ in 0..20 {
            let g = gen.generate_candidate().unwrap();
            let values: Vec<u64> = g.cells().iter().filter(|c| !c.is_empty()).map(|c| c.value() as u64).collect();
            assert!(values.len() >= 7);
            assert_eq!(values.iter().product::<u64>(), product);
            assert_eq!(g.rules().target_cell_value, 768);
            assert_eq!(g.rules().mode, RuleMode::RandomChallenge);
        }
    }

    #[test]
    fn it_generates_a_solvable_game() {
        let gen = TargetCellGenerator::new(TargetCellOptions {
            target_cell: 48,
            rows: 3,
            columns: 3,
            max_moves: 10,
            max_additional_cells: None,
            seed: 3,
            solve_time: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        let solvable = gen.generate_game().unwrap();
        assert_eq!(solvable.solutions.len(), 1);
        let mut g = solvable.game.clone();
        for i in &solvable.solutions[0].instructions {
            g.instruct(i).unwrap();
        }
        assert!(g.is_won());
        assert!(g.moves() <= 10);
    }
}
