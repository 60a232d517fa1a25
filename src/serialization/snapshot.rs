use std::fs;
use std::io::Write;
use std::path::Path;

use crate::game::GameSnapshot;

use super::SerializationError;

const MAGIC: &[u8; 4] = b"TLY1";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4;
const TRAILER_LEN: usize = 4;

pub const SNAPSHOT_EXTENSION: &str = "tally";

/// Layout: magic, version, LE u32 body length, postcard body, LE crc32c of
/// everything before the trailer.
pub fn encode_snapshot(snapshot: &GameSnapshot) -> Result<Vec<u8>, SerializationError> {
    let body = postcard::to_allocvec(snapshot)?;
    let body_len: u32 = body.len().try_into().map_err(|_| SerializationError::Malformed)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.extend_from_slice(&body_len.to_le_bytes());
    buf.extend_from_slice(&body);
    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<GameSnapshot, SerializationError> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(SerializationError::Malformed);
    }
    let (content, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let file_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if file_crc != crc32c::crc32c(content) {
        return Err(SerializationError::Checksum);
    }
    if &content[..4] != MAGIC || content[4] != VERSION {
        return Err(SerializationError::MagicOrVersion);
    }
    let body_len = u32::from_le_bytes([content[5], content[6], content[7], content[8]]) as usize;
    if content.len() != HEADER_LEN + body_len {
        return Err(SerializationError::Malformed);
    }
    Ok(postcard::from_bytes(&content[HEADER_LEN..])?)
}

pub fn write_snapshot_to_path<P: AsRef<Path>>(path: P, snapshot: &GameSnapshot) -> Result<(), SerializationError> {
    let data = encode_snapshot(snapshot)?;
    let mut f = fs::File::create(path)?;
    f.write_all(&data)?;
    Ok(())
}

pub fn read_snapshot_from_path<P: AsRef<Path>>(path: P) -> Result<GameSnapshot, SerializationError> {
    let data = fs::read(path)?;
    decode_snapshot(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Direction;
    use crate::game::{Game, GameOptions};
    use crate::rules::RuleMode;
    use crate::template::tutorial_games;
    use tempfile::NamedTempFile;

    fn played() -> Game {
        let mut g = Game::new_infinite(RuleMode::InfiniteNormal, GameOptions::seeded(99)).unwrap();
        for dir in [Direction::Up, Direction::Left, Direction::Down, Direction::Right] {
            g.swipe(dir);
        }
        g
    }

    #[test]
    fn snapshot_file_restores_the_game() {
        let g = played();
        let tmp = NamedTempFile::new().unwrap();
        write_snapshot_to_path(tmp.path(), &g.snapshot()).unwrap();
        let snap = read_snapshot_from_path(tmp.path()).unwrap();
        assert_eq!(snap, g.snapshot());

        let restored = Game::restore(&snap).unwrap();
        assert_eq!(restored.cells(), g.cells());
        assert_eq!(restored.moves(), g.moves());
        assert_eq!(restored.seed(), g.seed());
        assert_eq!(restored.history().describe().unwrap(), g.history().describe().unwrap());
    }

    #[test]
    fn checksum_mismatch() {
        let g = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
        let mut bytes = encode_snapshot(&g.snapshot()).unwrap();
        bytes[HEADER_LEN + 2] ^= 0xFF;
        assert!(matches!(decode_snapshot(&bytes), Err(SerializationError::Checksum)));
    }

    #[test]
    fn wrong_magic_and_truncation() {
        let g = Game::from_template(&tutorial_games()[0], GameOptions::seeded(1)).unwrap();
        let mut bytes = encode_snapshot(&g.snapshot()).unwrap();
        bytes[0] = b'X';
        let n = bytes.len() - TRAILER_LEN;
        let crc = crc32c::crc32c(&bytes[..n]);
        bytes[n..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(decode_snapshot(&bytes), Err(SerializationError::MagicOrVersion)));

        assert!(matches!(decode_snapshot(&bytes[..6]), Err(SerializationError::Malformed)));
    }
}
