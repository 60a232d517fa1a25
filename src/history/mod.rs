//! Compact, lossless record of every instruction played in a game.
//!
//! Each instruction starts with a mode triplet:
//!
//! | mode | meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | combine path, start index in `b` triplets            |
//! | 1    | helper, followed by one kind triplet                 |
//! | 2..5 | swipe up, right, down, left                          |
//! | 6    | combine path whose start index fits in one triplet   |
//!
//! A path continues with one relative direction per step (0 up, 1 right,
//! 2 down, 3 left); the final step has 4 added to it.

pub mod triplets;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::Direction;
use triplets::{triplet_at, triplet_count, write_triplets, TripletError};

const MODE_PATH: u8 = 0;
const MODE_HELPER: u8 = 1;
const MODE_SWIPE_UP: u8 = 2;
const MODE_PATH_ALT: u8 = 6;

/// Non-move actions recorded in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Helper {
    Void,
    Hint,
    Undo,
    Swap,
}

impl Helper {
    fn code(self) -> u8 {
        match self {
            Helper::Void => 0,
            Helper::Hint => 1,
            Helper::Undo => 2,
            Helper::Swap => 3,
        }
    }

    fn from_code(code: u8) -> Option<Helper> {
        match code {
            0 => Some(Helper::Void),
            1 => Some(Helper::Hint),
            2 => Some(Helper::Undo),
            3 => Some(Helper::Swap),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Helper::Void => 'V',
            Helper::Hint => 'H',
            Helper::Undo => 'Z',
            Helper::Swap => 'S',
        }
    }
}

/// A single decoded history entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Swipe(Direction),
    Combine(Vec<usize>),
    Helper(Helper),
}

impl Instruction {
    /// Swipes and combines count as moves; helpers do not.
    #[inline]
    pub fn is_move(&self) -> bool { !matches!(self, Instruction::Helper(_)) }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Swipe(d) => write!(f, "{};", d.letter()),
            Instruction::Helper(h) => write!(f, "{};", h.letter()),
            Instruction::Combine(path) => {
                let parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
                write!(f, "{};", parts.join(","))
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("board of {cells} cells is too large for the history codec")]
    UnsupportedBoardSize { cells: usize },
    #[error("path must contain at least two cells")]
    PathTooShort,
    #[error("index {index} is outside the board")]
    IndexOutOfBounds { index: usize },
    #[error("{from} and {to} are not neighbours")]
    NotNeighbour { from: usize, to: usize },
    #[error("unknown triplet {triplet} at {at}")]
    UnknownTriplet { at: usize, triplet: u8 },
    #[error("history ends inside a path")]
    TruncatedPath,
    #[error("path walks off the board at {at}")]
    PathOffBoard { at: usize },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("cannot parse instruction {0:?}")]
    Parse(String),
    #[error(transparent)]
    Triplets(#[from] TripletError),
}

/// Triplet-packed history for a board of a fixed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactHistory {
    bytes: Vec<u8>,
    len: usize,
    rows: usize,
    columns: usize,
    index_triplets: usize,
}

impl CompactHistory {
    /// Boards with up to 512 cells are supported.
    pub fn new(rows: usize, columns: usize) -> Result<Self, HistoryError> {
        let cells = rows * columns;
        let bits = usize::BITS - cells.saturating_sub(1).leading_zeros();
        let index_triplets = (bits as usize).div_ceil(3).max(1);
        if cells == 0 || index_triplets > 3 {
            return Err(HistoryError::UnsupportedBoardSize { cells });
        }
        Ok(CompactHistory { bytes: Vec::new(), len: 0, rows, columns, index_triplets })
    }

    /// Restore from stored bytes. A trailing helper without its kind triplet
    /// is read as [`Helper::Void`].
    pub fn from_bytes(rows: usize, columns: usize, bytes: Vec<u8>) -> Result<Self, HistoryError> {
        let mut h = Self::new(rows, columns)?;
        triplets::byte_slice_to_triplets(&bytes)?;
        h.len = triplet_count(&bytes);
        h.bytes = bytes;
        let mut dangling = false;
        let mut reader = Reader { history: &h, at: 0 };
        while reader.at < h.len {
            let start = reader.at;
            reader.next_instruction()?;
            dangling = triplet_at(&h.bytes, start) == MODE_HELPER && start + 1 >= h.len;
        }
        if dangling {
            h.len += 1;
            if h.bytes.len() < triplets::bytes_for(h.len) {
                h.bytes.push(0);
            }
        }
        Ok(h)
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] { &self.bytes }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }

    /// Number of triplets written.
    #[inline]
    pub fn triplet_len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    fn push(&mut self, triplets: &[u8]) { self.len = write_triplets(&mut self.bytes, self.len, triplets); }

    pub fn add_swipe(&mut self, dir: Direction) {
        let mode = MODE_SWIPE_UP
            + match dir {
                Direction::Up => 0,
                Direction::Right => 1,
                Direction::Down => 2,
                Direction::Left => 3,
            };
        self.push(&[mode]);
    }

    pub fn add_helper(&mut self, helper: Helper) { self.push(&[MODE_HELPER, helper.code()]); }

    #[inline]
    pub fn add_hint(&mut self) { self.add_helper(Helper::Hint) }
    #[inline]
    pub fn add_undo(&mut self) { self.add_helper(Helper::Undo) }
    #[inline]
    pub fn add_swap(&mut self) { self.add_helper(Helper::Swap) }
    #[inline]
    pub fn add_void(&mut self) { self.add_helper(Helper::Void) }

    pub fn add_path(&mut self, path: &[usize]) -> Result<(), HistoryError> {
        let cells = self.rows * self.columns;
        if path.len() < 2 {
            return Err(HistoryError::PathTooShort);
        }
        if let Some(&index) = path.iter().find(|&&i| i >= cells) {
            return Err(HistoryError::IndexOutOfBounds { index });
        }
        let mut out = Vec::with_capacity(path.len() + self.index_triplets + 1);
        let first = path[0];
        if self.index_triplets == 2 && first < 8 {
            out.extend([MODE_PATH_ALT, first as u8]);
        } else {
            out.push(MODE_PATH);
            for k in (0..self.index_triplets).rev() {
                out.push(((first >> (3 * k)) & 0b111) as u8);
            }
        }
        for (step, pair) in path.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            if !crate::board::are_neighbours(from, to, self.rows, self.columns) {
                return Err(HistoryError::NotNeighbour { from, to });
            }
            let rel = relative_direction(from, to);
            out.push(if step + 2 == path.len() { rel + 4 } else { rel });
        }
        self.push(&out);
        Ok(())
    }

    pub fn add(&mut self, instruction: &Instruction) -> Result<(), HistoryError> {
        match instruction {
            Instruction::Swipe(d) => self.add_swipe(*d),
            Instruction::Combine(path) => self.add_path(path)?,
            Instruction::Helper(h) => self.add_helper(*h),
        }
        Ok(())
    }

    pub fn iter(&self) -> HistoryIter<'_> { HistoryIter { reader: Reader { history: self, at: 0 }, failed: false } }

    /// Visit every instruction in order. The first callback error stops the walk.
    pub fn iterate<E>(
        &self,
        mut on_swipe: impl FnMut(Direction) -> Result<(), E>,
        mut on_combine: impl FnMut(&[usize]) -> Result<(), E>,
        mut on_helper: impl FnMut(Helper) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<HistoryError>,
    {
        for instruction in self.iter() {
            match instruction? {
                Instruction::Swipe(d) => on_swipe(d)?,
                Instruction::Combine(path) => on_combine(&path)?,
                Instruction::Helper(h) => on_helper(h)?,
            }
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Instruction>, HistoryError> { self.iter().collect() }

    pub fn last(&self) -> Option<Instruction> { self.iter().map_while(Result::ok).last() }

    /// Number of decoded instructions.
    pub fn len(&self) -> usize { self.iter().map_while(Result::ok).count() }

    /// Instructions to replay after undoing one more step. Every undo cancels
    /// itself and the instruction before it.
    pub fn filter_for_undo(&self) -> Result<Vec<Instruction>, HistoryError> {
        let mut list = self.all()?;
        let undos = list.iter().filter(|i| **i == Instruction::Helper(Helper::Undo)).count();
        if undos >= list.len() - undos {
            return Err(HistoryError::NothingToUndo);
        }
        list.push(Instruction::Helper(Helper::Undo));
        while let Some(pos) = list.iter().position(|i| *i == Instruction::Helper(Helper::Undo)) {
            let from = pos.saturating_sub(1);
            list.drain(from..=pos);
        }
        Ok(list)
    }

    pub fn can_undo(&self) -> bool { self.filter_for_undo().is_ok() }

    /// Human-readable form, e.g. `"U;R;6,1,2,7;H;"`.
    pub fn describe(&self) -> Result<String, HistoryError> {
        Ok(self.iter().collect::<Result<Vec<_>, _>>()?.iter().map(|i| i.to_string()).collect())
    }

    /// As [`CompactHistory::describe`] with every path written as `C`.
    pub fn describe_without_params(&self) -> Result<String, HistoryError> {
        let all = self.all()?;
        Ok(all
            .iter()
            .map(|i| match i {
                Instruction::Combine(_) => "C;".to_string(),
                other => other.to_string(),
            })
            .collect())
    }
}

/// Parse the output of [`CompactHistory::describe`].
pub fn parse_describe(s: &str) -> Result<Vec<Instruction>, HistoryError> {
    s.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if let Some(d) = Direction::from_letter(c) {
                    return Ok(Instruction::Swipe(d));
                }
                let helper = match c {
                    'V' => Some(Helper::Void),
                    'H' => Some(Helper::Hint),
                    'Z' => Some(Helper::Undo),
                    'S' => Some(Helper::Swap),
                    _ => None,
                };
                if let Some(h) = helper {
                    return Ok(Instruction::Helper(h));
                }
            }
            part.split(',')
                .map(|n| n.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map(Instruction::Combine)
                .map_err(|_| HistoryError::Parse(part.to_string()))
        })
        .collect()
}

#[inline]
fn relative_direction(from: usize, to: usize) -> u8 {
    if to == from + 1 {
        1
    } else if to + 1 == from {
        3
    } else if to < from {
        0
    } else {
        2
    }
}

struct Reader<'a> {
    history: &'a CompactHistory,
    at: usize,
}

impl Reader<'_> {
    #[inline]
    fn take(&mut self) -> Option<u8> {
        if self.at >= self.history.len {
            return None;
        }
        let t = triplet_at(&self.history.bytes, self.at);
        self.at += 1;
        Some(t)
    }

    fn next_instruction(&mut self) -> Result<Instruction, HistoryError> {
        let at = self.at;
        let mode = self.take().ok_or(HistoryError::TruncatedPath)?;
        match mode {
            MODE_PATH | MODE_PATH_ALT => self.read_path(mode == MODE_PATH_ALT).map(Instruction::Combine),
            MODE_HELPER => match self.take() {
                None => Ok(Instruction::Helper(Helper::Void)),
                Some(code) => Helper::from_code(code)
                    .map(Instruction::Helper)
                    .ok_or(HistoryError::UnknownTriplet { at: at + 1, triplet: code }),
            },
            2..=5 => Ok(Instruction::Swipe(Direction::ALL[(mode - MODE_SWIPE_UP) as usize])),
            triplet => Err(HistoryError::UnknownTriplet { at, triplet }),
        }
    }

    fn read_path(&mut self, alt: bool) -> Result<Vec<usize>, HistoryError> {
        let columns = self.history.columns;
        let cells = self.history.rows * columns;
        let digits = if alt { 1 } else { self.history.index_triplets };
        let mut index = 0usize;
        for _ in 0..digits {
            index = index << 3 | self.take().ok_or(HistoryError::TruncatedPath)? as usize;
        }
        if index >= cells {
            return Err(HistoryError::PathOffBoard { at: self.at });
        }
        let mut path = vec![index];
        loop {
            let t = self.take().ok_or(HistoryError::TruncatedPath)?;
            let prev = index;
            index = match t & 0b11 {
                0 => prev.checked_sub(columns),
                1 => (prev % columns + 1 < columns).then_some(prev + 1),
                2 => Some(prev + columns).filter(|&i| i < cells),
                _ => (prev % columns > 0).then(|| prev - 1),
            }
            .ok_or(HistoryError::PathOffBoard { at: self.at })?;
            path.push(index);
            if t >= 4 {
                return Ok(path);
            }
        }
    }
}

/// Decoding iterator. Stops after the first error.
pub struct HistoryIter<'a> {
    reader: Reader<'a>,
    failed: bool,
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<Instruction, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.at >= self.reader.history.len {
            return None;
        }
        let item = self.reader.next_instruction();
        self.failed = item.is_err();
        Some(item)
    }
}
