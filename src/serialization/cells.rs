use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;

use super::SerializationError;

/// A board's cells plus the randomizer position they were stored at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedCells {
    /// `[base_0 .. base_n, power_0 .. power_n]`
    pub cells: Vec<i64>,
    pub seed: u64,
    pub state: u64,
}

/// Bases first, then powers.
pub fn pack_cells(cells: &[Cell]) -> Vec<i64> {
    let mut out = Vec::with_capacity(cells.len() * 2);
    out.extend(cells.iter().map(|c| c.raw().0));
    out.extend(cells.iter().map(|c| c.raw().1));
    out
}

pub fn unpack_cells(packed: &[i64]) -> Result<Vec<Cell>, SerializationError> {
    if packed.len() % 2 != 0 {
        return Err(SerializationError::OddCellCount(packed.len()));
    }
    let (bases, powers) = packed.split_at(packed.len() / 2);
    bases
        .iter()
        .zip(powers)
        .map(|(&base, &power)| {
            let power = u32::try_from(power).map_err(|_| SerializationError::InvalidPower(power))?;
            Ok(Cell::new(base, power))
        })
        .collect()
}

pub fn marshal_cells(cells: &[Cell], seed: u64, state: u64) -> Result<Vec<u8>, SerializationError> {
    let body = postcard::to_allocvec(&PackedCells { cells: pack_cells(cells), seed, state })?;
    let mut z = ZlibEncoder::new(Vec::with_capacity(body.len()), Compression::default());
    z.write_all(&body)?;
    Ok(z.finish()?)
}

/// Inverse of [`marshal_cells`]: `(cells, seed, state)`.
pub fn unmarshal_cells(bytes: &[u8]) -> Result<(Vec<Cell>, u64, u64), SerializationError> {
    let mut body = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut body)?;
    let packed: PackedCells = postcard::from_bytes(&body)?;
    Ok((unpack_cells(&packed.cells)?, packed.seed, packed.state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::cells_from_values;

    #[test]
    fn packing_puts_bases_before_powers() {
        let cells = vec![Cell::new(3, 2), Cell::EMPTY, Cell::new(5, 0)];
        assert_eq!(pack_cells(&cells), vec![3, 0, 5, 2, 0, 0]);
        assert_eq!(unpack_cells(&[3, 0, 5, 2, 0, 0]).unwrap(), cells);
    }

    #[test]
    fn unpack_rejects_bad_input() {
        assert!(matches!(unpack_cells(&[1, 2, 3]), Err(SerializationError::OddCellCount(3))));
        assert!(matches!(unpack_cells(&[1, -1]), Err(SerializationError::InvalidPower(-1))));
        assert!(unpack_cells(&[]).unwrap().is_empty());
    }

    #[test]
    fn marshalled_board_comes_back_with_its_seed() {
        let mut cells = cells_from_values(&[0, 2, 1, 0, 1, 64, 4, 4, 1, 2, 64, 8, 4, 1, 0, 12, 3, 1, 0, 0, 16, 0, 0, 0, 0]);
        cells[6] = Cell::new(1, 2);
        let bytes = marshal_cells(&cells, 42, 7).unwrap();
        let (back, seed, state) = unmarshal_cells(&bytes).unwrap();
        assert_eq!(back, cells);
        assert_eq!((seed, state), (42, 7));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(unmarshal_cells(b"not zlib at all").is_err());
    }
}
