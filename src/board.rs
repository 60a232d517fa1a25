use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cell::Cell;

/// A direction to swipe cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// All directions in the order solvers expand them.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// One-letter tag used in history descriptions.
    #[inline]
    pub fn letter(self) -> char {
        match self {
            Direction::Up => 'U',
            Direction::Right => 'R',
            Direction::Down => 'D',
            Direction::Left => 'L',
        }
    }

    pub fn from_letter(c: char) -> Option<Direction> {
        match c {
            'U' => Some(Direction::Up),
            'R' => Some(Direction::Right),
            'D' => Some(Direction::Down),
            'L' => Some(Direction::Left),
            _ => None,
        }
    }
}

/// How a combine path reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvalMethod {
    Sum,
    Product,
}

impl fmt::Display for EvalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvalMethod::Sum => "+",
            EvalMethod::Product => "*",
        })
    }
}

/// Outcome of a successful path evaluation: the target value and which form matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub value: i64,
    pub method: EvalMethod,
}

/// Switches that disable one of the two combine forms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluateOptions {
    pub no_multiply: bool,
    pub no_addition: bool,
}

/// Errors from path validation and evaluation. Each carries the offending
/// position within the path where one applies.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path of {len} cells is too short")]
    PathTooShort { len: usize },
    #[error("path of {len} cells is longer than the board")]
    PathTooLong { len: usize },
    #[error("index {index} appears twice (position {position})")]
    DuplicateIndex { position: usize, index: usize },
    #[error("index {index} is outside the board (position {position})")]
    IndexOutOfBounds { position: usize, index: usize },
    #[error("cell {index} is empty (position {position})")]
    CellEmpty { position: usize, index: usize },
    #[error("cell {index} is not a neighbour of the previous cell (position {position})")]
    NotNeighbor { position: usize, index: usize },
    #[error("path overshoots the target {target} (position {position})")]
    ResultOvershot { position: usize, target: i64 },
    #[error("path does not evaluate to {target}")]
    ResultNoCell { target: i64 },
}

impl PathError {
    /// Position inside the path that triggered the error, if any.
    pub fn position(&self) -> Option<usize> {
        match *self {
            PathError::EmptyPath | PathError::ResultNoCell { .. } => None,
            PathError::PathTooShort { .. } | PathError::PathTooLong { .. } => Some(0),
            PathError::DuplicateIndex { position, .. }
            | PathError::IndexOutOfBounds { position, .. }
            | PathError::CellEmpty { position, .. }
            | PathError::NotNeighbor { position, .. }
            | PathError::ResultOvershot { position, .. } => Some(position),
        }
    }

    /// True for validation failures, false when a valid path simply does not evaluate.
    pub fn is_invalid_path(&self) -> bool {
        !matches!(self, PathError::ResultOvershot { .. } | PathError::ResultNoCell { .. })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("expected {expected} cells, got {got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("board dimensions {rows}x{columns} are invalid")]
    InvalidDimensions { rows: usize, columns: usize },
    #[error("index {0} is outside the board")]
    IndexOutOfBounds(usize),
    #[error("cell {0} is already occupied")]
    CellOccupied(usize),
}

/// Exact, order-stable key for a board position. Two boards share a key iff
/// they have the same dimensions and the same cell values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardHash(Vec<i64>);

impl BoardHash {
    /// Hex-encoded SHA-256 of the key, for logs and file names.
    pub fn digest(&self) -> String {
        let mut h = Sha256::new();
        for v in &self.0 {
            h.update(v.to_le_bytes());
        }
        hex::encode(h.finalize())
    }
}

impl fmt::Display for BoardHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.digest()) }
}

impl fmt::Debug for BoardHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoardHash({})", &self.digest()[..12])
    }
}

/// Rectangular grid of cells stored in row-major order.
///
/// Neighbour lists are computed once per shape and shared between copies, in
/// the order up, left, right, down.
#[derive(Clone)]
pub struct Board {
    rows: usize,
    columns: usize,
    cells: Vec<Cell>,
    options: EvaluateOptions,
    neighbours: Arc<[Vec<usize>]>,
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns && self.cells == other.cells
    }
}

impl Eq for Board {}

impl Board {
    /// An empty board of the given shape.
    pub fn new(rows: usize, columns: usize) -> Self {
        Board {
            rows,
            columns,
            cells: vec![Cell::EMPTY; rows * columns],
            options: EvaluateOptions::default(),
            neighbours: neighbour_table(rows, columns),
        }
    }

    pub fn from_cells(rows: usize, columns: usize, cells: Vec<Cell>) -> Result<Self, BoardError> {
        if rows == 0 || columns == 0 {
            return Err(BoardError::InvalidDimensions { rows, columns });
        }
        if cells.len() != rows * columns {
            return Err(BoardError::SizeMismatch { expected: rows * columns, got: cells.len() });
        }
        Ok(Board { cells, ..Board::new(rows, columns) })
    }

    pub fn from_values(rows: usize, columns: usize, values: &[i64]) -> Result<Self, BoardError> {
        Self::from_cells(rows, columns, crate::cell::cells_from_values(values))
    }

    #[inline]
    pub fn with_options(mut self, options: EvaluateOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn rows(&self) -> usize { self.rows }
    #[inline]
    pub fn columns(&self) -> usize { self.columns }
    #[inline]
    pub fn len(&self) -> usize { self.cells.len() }
    #[inline]
    pub fn is_empty(&self) -> bool { self.cells.iter().all(|c| c.is_empty()) }
    #[inline]
    pub fn cells(&self) -> &[Cell] { &self.cells }
    #[inline]
    pub fn options(&self) -> EvaluateOptions { self.options }
    #[inline]
    pub fn get(&self, index: usize) -> Option<Cell> { self.cells.get(index).copied() }

    /// Plain values of every cell, row-major.
    pub fn values(&self) -> Vec<i64> { self.cells.iter().map(|c| c.value()).collect() }

    /// Precomputed neighbours of `index` (up, left, right, down).
    #[inline]
    pub fn neighbours(&self, index: usize) -> &[usize] {
        self.neighbours.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn are_neighbours(&self, a: usize, b: usize) -> bool { are_neighbours(a, b, self.rows, self.columns) }

    /// `(x, y)` coordinates of an index.
    #[inline]
    pub fn index_to_coord(&self, index: usize) -> (usize, usize) { (index % self.columns, index / self.columns) }

    pub fn coord_to_index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.columns && y < self.rows).then(|| y * self.columns + x)
    }

    /// Highest-valued cell and its index. The first one wins on ties.
    pub fn highest_value(&self) -> (Cell, usize) {
        let mut best = (Cell::EMPTY, 0);
        for (i, c) in self.cells.iter().enumerate() {
            if c.value() > best.0.value() {
                best = (*c, i);
            }
        }
        best
    }

    pub fn list_empty(&self) -> Vec<usize> {
        self.cells.iter().enumerate().filter(|(_, c)| c.is_empty()).map(|(i, _)| i).collect()
    }

    pub fn add_cell(&mut self, index: usize, cell: Cell, overwrite: bool) -> Result<(), BoardError> {
        let slot = self.cells.get_mut(index).ok_or(BoardError::IndexOutOfBounds(index))?;
        if !overwrite && !slot.is_empty() {
            return Err(BoardError::CellOccupied(index));
        }
        *slot = cell;
        Ok(())
    }

    /// Cells as they would be after swiping, without touching the board.
    pub fn swipe_preview(&self, dir: Direction) -> Vec<Cell> {
        let mut out = self.cells.clone();
        let merge = !self.options.no_addition;
        let (lines, len) = match dir {
            Direction::Left | Direction::Right => (self.rows, self.columns),
            Direction::Up | Direction::Down => (self.columns, self.rows),
        };
        for l in 0..lines {
            let idx: Vec<usize> = (0..len)
                .map(|k| match dir {
                    Direction::Left | Direction::Right => l * self.columns + k,
                    Direction::Up | Direction::Down => k * self.columns + l,
                })
                .collect();
            let line: Vec<Cell> = idx.iter().map(|&i| self.cells[i]).collect();
            let shifted = match dir {
                Direction::Left | Direction::Up => shift_line_start(line, merge),
                Direction::Right | Direction::Down => shift_line_end(line, merge),
            };
            for (&i, c) in idx.iter().zip(shifted) {
                out[i] = c;
            }
        }
        out
    }

    /// Swipe every line towards `dir`. Returns whether any cell changed.
    pub fn swipe(&mut self, dir: Direction) -> bool {
        let next = self.swipe_preview(dir);
        let changed = next != self.cells;
        self.cells = next;
        changed
    }

    #[inline]
    pub fn swipe_changes(&self, dir: Direction) -> bool { self.swipe_preview(dir) != self.cells }

    /// Check that `path` is a walk of distinct, non-empty, adjacent cells.
    pub fn validate_path(&self, path: &[usize]) -> Result<(), PathError> {
        match path.len() {
            0 => return Err(PathError::EmptyPath),
            1 => return Err(PathError::PathTooShort { len: 1 }),
            _ => {}
        }
        if path.len() > self.cells.len() {
            return Err(PathError::PathTooLong { len: path.len() });
        }
        let mut seen = vec![false; self.cells.len()];
        for (position, &index) in path.iter().enumerate() {
            let Some(cell) = self.cells.get(index) else {
                return Err(PathError::IndexOutOfBounds { position, index });
            };
            if seen[index] {
                return Err(PathError::DuplicateIndex { position, index });
            }
            seen[index] = true;
            if cell.is_empty() {
                return Err(PathError::CellEmpty { position, index });
            }
            if position > 0 && !self.are_neighbours(path[position - 1], index) {
                return Err(PathError::NotNeighbor { position, index });
            }
        }
        Ok(())
    }

    /// Fold the cells of `indexes` into a running sum and product and compare
    /// them to `target`. A sum match is preferred over a product match.
    pub fn soft_evaluates_to(&self, indexes: &[usize], target: i64) -> Result<Evaluation, PathError> {
        if indexes.is_empty() {
            return Err(PathError::EmptyPath);
        }
        if indexes.len() > self.cells.len() {
            return Err(PathError::PathTooLong { len: indexes.len() });
        }
        let allow_sum = !self.options.no_addition;
        let allow_product = !self.options.no_multiply;
        let mut sum = 0i64;
        let mut product = 1i64;
        for (position, &index) in indexes.iter().enumerate() {
            let cell = self.cells.get(index).ok_or(PathError::IndexOutOfBounds { position, index })?;
            if cell.is_empty() {
                return Err(PathError::CellEmpty { position, index });
            }
            let v = cell.value();
            sum = sum.saturating_add(v);
            product = product.saturating_mul(v);
            let sum_over = !allow_sum || sum > target;
            let product_over = !allow_product || product > target;
            if sum_over && product_over {
                return Err(PathError::ResultOvershot { position, target });
            }
        }
        if allow_sum && sum == target {
            return Ok(Evaluation { value: target, method: EvalMethod::Sum });
        }
        if allow_product && product == target {
            return Ok(Evaluation { value: target, method: EvalMethod::Product });
        }
        Err(PathError::ResultNoCell { target })
    }

    /// Evaluate a full path: the last cell is the target, the others contribute.
    pub fn evaluates_to(&self, path: &[usize]) -> Result<Evaluation, PathError> {
        self.validate_path(path)?;
        self.evaluates_to_unchecked(path)
    }

    /// As [`Board::evaluates_to`] without the path validation step.
    pub fn evaluates_to_unchecked(&self, path: &[usize]) -> Result<Evaluation, PathError> {
        let (&last, contributors) = path.split_last().ok_or(PathError::EmptyPath)?;
        let target = self
            .cells
            .get(last)
            .ok_or(PathError::IndexOutOfBounds { position: path.len() - 1, index: last })?;
        self.soft_evaluates_to(contributors, target.value())
    }

    /// Validate, evaluate and commit a combine. Contributors are emptied and
    /// the target doubled.
    pub fn combine(&mut self, path: &[usize]) -> Result<Evaluation, PathError> {
        let eval = self.evaluates_to(path)?;
        if let Some((&last, contributors)) = path.split_last() {
            for &i in contributors {
                self.cells[i] = Cell::EMPTY;
            }
            self.cells[last] = self.cells[last].doubled();
        }
        Ok(eval)
    }

    /// Exact position key. Cells compare by value.
    pub fn hash(&self) -> BoardHash {
        let mut key = Vec::with_capacity(self.cells.len() + 2);
        key.push(self.rows as i64);
        key.push(self.columns as i64);
        key.extend(self.cells.iter().map(|c| c.value()));
        BoardHash(key)
    }

    /// Render a path as an equation, e.g. `"5 + 4 = 9"`.
    pub fn describe_path(&self, path: &[usize]) -> String {
        let Some((&last, contributors)) = path.split_last() else { return String::new() };
        let method = self.evaluates_to(path).map(|e| e.method).unwrap_or(EvalMethod::Sum);
        let values: Vec<String> =
            contributors.iter().filter_map(|&i| self.get(i)).map(|c| c.value().to_string()).collect();
        let target = self.get(last).map(|c| c.value()).unwrap_or_default();
        format!("{} = {}", values.join(&format!(" {method} ")), target)
    }
}

/// Grid adjacency test: left/right on the same row or directly above/below.
#[inline]
pub fn are_neighbours(a: usize, b: usize, rows: usize, columns: usize) -> bool {
    if a >= rows * columns || b >= rows * columns || columns == 0 {
        return false;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    (hi - lo == 1 && lo / columns == hi / columns) || hi - lo == columns
}

fn neighbour_table(rows: usize, columns: usize) -> Arc<[Vec<usize>]> {
    (0..rows * columns)
        .map(|i| {
            let (x, y) = (i % columns, i / columns);
            let mut n = Vec::with_capacity(4);
            if y > 0 {
                n.push(i - columns);
            }
            if x > 0 {
                n.push(i - 1);
            }
            if x + 1 < columns {
                n.push(i + 1);
            }
            if y + 1 < rows {
                n.push(i + columns);
            }
            n
        })
        .collect()
}

fn shift_line_end(line: Vec<Cell>, merge: bool) -> Vec<Cell> {
    let rev: Vec<Cell> = line.into_iter().rev().collect();
    shift_line_start(rev, merge).into_iter().rev().collect()
}

/// Compact non-empty cells to the front of the line, then merge adjacent
/// equal-valued pairs front-first. A merged cell is the first cell doubled.
fn shift_line_start(line: Vec<Cell>, merge: bool) -> Vec<Cell> {
    let len = line.len();
    let mut out = Vec::with_capacity(len);
    let mut pending: Option<Cell> = None;
    for c in line.into_iter().filter(|c| !c.is_empty()) {
        match pending.take() {
            Some(p) if merge && p.value() == c.value() => out.push(p.doubled()),
            Some(p) => {
                out.push(p);
                pending = Some(c);
            }
            None => pending = Some(c),
        }
    }
    out.extend(pending);
    out.resize(len, Cell::EMPTY);
    out
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({}x{}, {:?})", self.rows, self.columns, self.values())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.cells.iter().map(|c| c.value().to_string().len()).max().unwrap_or(1).max(2);
        for row in self.cells.chunks(self.columns) {
            let line: Vec<String> = row
                .iter()
                .map(|c| if c.is_empty() { format!("{:>width$}", ".") } else { format!("{:>width$}", c.value()) })
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
