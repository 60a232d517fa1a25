//! Packed 3-bit values ("triplets"), most significant bits first.
//!
//! Eight triplets occupy three bytes:
//!
//! ```text
//! triplets: 000 001 010 011 100 101 110 111
//! bytes:    00000101 00111001 01110111
//! ```

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TripletError {
    #[error("leftover bits at the end of the byte stream are not zero")]
    InvalidEnd,
}

#[inline]
fn locate(index: usize) -> (usize, u32) {
    let bit = index * 3;
    (bit / 8, 13 - (bit % 8) as u32)
}

/// Triplet at `index`. Reading past the end yields zero.
#[inline]
pub fn triplet_at(bytes: &[u8], index: usize) -> u8 {
    let (byte, shift) = locate(index);
    let hi = bytes.get(byte).copied().unwrap_or(0) as u16;
    let lo = bytes.get(byte + 1).copied().unwrap_or(0) as u16;
    (((hi << 8 | lo) >> shift) & 0b111) as u8
}

/// Overwrite the triplet at `index`. `bytes` must already cover it.
#[inline]
pub fn write_triplet_at(bytes: &mut [u8], index: usize, triplet: u8) {
    let (byte, shift) = locate(index);
    let mask: u16 = 0b111 << shift;
    let val: u16 = ((triplet & 0b111) as u16) << shift;
    let (hi_mask, lo_mask) = ((mask >> 8) as u8, mask as u8);
    bytes[byte] ^= (bytes[byte] ^ (val >> 8) as u8) & hi_mask;
    if lo_mask != 0 {
        bytes[byte + 1] ^= (bytes[byte + 1] ^ val as u8) & lo_mask;
    }
}

/// Bytes needed to hold `count` triplets.
#[inline]
pub fn bytes_for(count: usize) -> usize { (count * 3).div_ceil(8) }

/// Triplet slots available in `byte_count` bytes.
#[inline]
pub fn max_triplet_count(byte_count: usize) -> usize { byte_count * 8 / 3 }

/// Logical length: slot count minus trailing zero triplets.
pub fn triplet_count(bytes: &[u8]) -> usize {
    let mut n = max_triplet_count(bytes.len());
    while n > 0 && triplet_at(bytes, n - 1) == 0 {
        n -= 1;
    }
    n
}

/// Write `triplets` starting at slot `at`, growing `bytes` as needed.
/// Returns the new logical length.
pub fn write_triplets(bytes: &mut Vec<u8>, at: usize, triplets: &[u8]) -> usize {
    let end = at + triplets.len();
    let need = bytes_for(end);
    if bytes.len() < need {
        bytes.resize(need, 0);
    }
    for (i, &t) in triplets.iter().enumerate() {
        write_triplet_at(bytes, at + i, t);
    }
    end
}

/// Append after the logical end of `bytes` (trailing zeros are overwritten).
pub fn append_triplets(bytes: &mut Vec<u8>, triplets: &[u8]) -> usize {
    let at = triplet_count(bytes);
    write_triplets(bytes, at, triplets)
}

/// Unpack every slot. Leftover bits that do not form a full triplet must be zero.
pub fn byte_slice_to_triplets(bytes: &[u8]) -> Result<Vec<u8>, TripletError> {
    let count = max_triplet_count(bytes.len());
    let leftover = (bytes.len() * 8) % 3;
    if leftover > 0 {
        let last = bytes[bytes.len() - 1];
        if last & ((1u8 << leftover) - 1) != 0 {
            return Err(TripletError::InvalidEnd);
        }
    }
    Ok((0..count).map(|i| triplet_at(bytes, i)).collect())
}

pub fn triplets_to_byte_slice(triplets: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; bytes_for(triplets.len())];
    for (i, &t) in triplets.iter().enumerate() {
        write_triplet_at(&mut out, i, t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
    const PACKED: [u8; 3] = [0b0000_0101, 0b0011_1001, 0b0111_0111];

    #[test]
    fn it_packs_the_reference_group() {
        assert_eq!(triplets_to_byte_slice(&SEQ), PACKED.to_vec());
        for (i, &t) in SEQ.iter().enumerate() {
            assert_eq!(triplet_at(&PACKED, i), t);
        }
    }

    #[test]
    fn it_overwrites_only_the_target_bits() {
        let mut bytes = vec![0xff; 3];
        for i in 0..8 {
            write_triplet_at(&mut bytes, i, 0);
            for j in 0..8 {
                assert_eq!(triplet_at(&bytes, j), if j <= i { 0 } else { 7 }, "i={i} j={j}");
            }
        }
    }

    #[test]
    fn append_grows_by_the_needed_bytes() {
        let mut bytes = Vec::new();
        assert_eq!(append_triplets(&mut bytes, &[1, 2]), 2);
        assert_eq!(bytes.len(), 1);
        assert_eq!(append_triplets(&mut bytes, &[3]), 3);
        assert_eq!(bytes.len(), 2);
        assert_eq!(append_triplets(&mut bytes, &[4, 5, 6, 7, 1]), 8);
        assert_eq!(bytes.len(), 3);
        assert_eq!(byte_slice_to_triplets(&bytes).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 1]);
    }

    #[test]
    fn count_ignores_trailing_zeros() {
        assert_eq!(triplet_count(&[]), 0);
        assert_eq!(triplet_count(&PACKED), 8);
        assert_eq!(triplet_count(&triplets_to_byte_slice(&[3, 0, 0])), 1);
        assert_eq!(triplet_count(&triplets_to_byte_slice(&[0, 0, 5])), 3);
    }

    #[test]
    fn leftover_bits_must_be_zero() {
        assert_eq!(byte_slice_to_triplets(&[0b0000_0001]), Err(TripletError::InvalidEnd));
        assert_eq!(byte_slice_to_triplets(&[0b0010_0000]), Ok(vec![1, 0]));
        assert_eq!(byte_slice_to_triplets(&[0, 0b0000_0001]), Err(TripletError::InvalidEnd));
        assert_eq!(byte_slice_to_triplets(&PACKED).unwrap(), SEQ.to_vec());
    }
}
