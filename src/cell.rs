use std::fmt;

use serde::{Deserialize, Serialize};

use crate::factors::Factors;

/// A single board cell holding `base * 2^power`.
///
/// A zero base marks an empty cell. Doubling a cell raises its power and keeps
/// the base, so a cell that started as `3` reads `3 * 2^n` after `n` merges.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    base: i64,
    power: u32,
}

impl Cell {
    /// The empty cell.
    pub const EMPTY: Cell = Cell { base: 0, power: 0 };

    #[inline]
    pub const fn new(base: i64, power: u32) -> Self { Cell { base, power } }

    /// A cell with the given value and no power.
    #[inline]
    pub const fn from_value(value: i64) -> Self { Cell { base: value, power: 0 } }

    #[inline]
    pub fn base(self) -> i64 { self.base }

    #[inline]
    pub fn power(self) -> u32 { self.power }

    /// `(base, power)` widened to the 64-bit pair used on the wire.
    #[inline]
    pub fn raw(self) -> (i64, i64) { (self.base, self.power as i64) }

    #[inline]
    pub fn is_empty(self) -> bool { self.base == 0 }

    /// The numeric value `base * 2^power`, saturating at the `i64` bounds.
    #[inline]
    pub fn value(self) -> i64 {
        if self.power == 0 || self.base == 0 {
            return self.base;
        }
        match 1i64.checked_shl(self.power).filter(|m| *m > 0) {
            Some(multiplier) => self.base.saturating_mul(multiplier),
            None if self.base > 0 => i64::MAX,
            None => i64::MIN,
        }
    }

    /// This cell with its power raised by one.
    #[inline]
    pub fn doubled(self) -> Cell { Cell { base: self.base, power: self.power + 1 } }

    /// Prime factors of the cell value. Empty cells have none.
    pub fn factors(self) -> Factors {
        if self.is_empty() || self.value() < 0 {
            return Factors::default();
        }
        Factors::of(self.value() as u64)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({}*2^{})", self.base, self.power)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self { Cell::from_value(value) }
}

/// Build a row-major cell list from plain values.
pub fn cells_from_values(values: &[i64]) -> Vec<Cell> {
    values.iter().copied().map(Cell::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_base_times_power_of_two() {
        assert_eq!(Cell::new(3, 0).value(), 3);
        assert_eq!(Cell::new(3, 2).value(), 12);
        assert_eq!(Cell::new(1, 10).value(), 1024);
        assert_eq!(Cell::EMPTY.value(), 0);
    }

    #[test]
    fn doubling_raises_power_and_keeps_base() {
        let c = Cell::from_value(5).doubled().doubled();
        assert_eq!(c.base(), 5);
        assert_eq!(c.power(), 2);
        assert_eq!(c.value(), 20);
    }

    #[test]
    fn empty_iff_base_is_zero() {
        assert!(Cell::EMPTY.is_empty());
        assert!(Cell::new(0, 4).is_empty());
        assert!(!Cell::from_value(1).is_empty());
    }

    #[test]
    fn equality_compares_both_components() {
        assert_ne!(Cell::new(4, 0), Cell::new(2, 1));
        assert_eq!(Cell::new(4, 0).value(), Cell::new(2, 1).value());
    }

    #[test]
    fn huge_powers_saturate() {
        assert_eq!(Cell::new(3, 63).value(), i64::MAX);
        assert_eq!(Cell::new(1, 62).value(), 1 << 62);
    }

    #[test]
    fn factors_of_cell_value() {
        assert_eq!(Cell::new(3, 2).factors().factors(), &[2, 2, 3]);
        assert!(Cell::EMPTY.factors().factors().is_empty());
    }
}
