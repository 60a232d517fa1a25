//! Persistence formats.
//!
//! Two surfaces live here:
//!
//! - the cells-on-wire codec: a board packed as `2N` 64-bit integers (bases
//!   first, then powers) together with the randomizer position, postcard
//!   framed and zlib compressed;
//! - the `.tally` snapshot file: a checksummed container around a postcard
//!   encoded [`GameSnapshot`](crate::game::GameSnapshot).

mod cells;
mod snapshot;

use std::io;

pub use cells::{marshal_cells, pack_cells, unmarshal_cells, unpack_cells, PackedCells};
pub use snapshot::{
    decode_snapshot, encode_snapshot, read_snapshot_from_path, write_snapshot_to_path, SNAPSHOT_EXTENSION,
};

#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("packed cells must have an even length, got {0}")]
    OddCellCount(usize),
    #[error("packed cell has a negative or oversized power: {0}")]
    InvalidPower(i64),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("file too short or malformed")]
    Malformed,
    #[error("checksum mismatch")]
    Checksum,
}
