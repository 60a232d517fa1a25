//! Weighted choice over a small set of values, driven by an integer nonce.

use std::sync::OnceLock;

use crate::randomizer::Randomizer;

/// Ordered `(weight, value)` buckets. `get(nonce)` mixes the nonce and maps it
/// into the cumulative weight range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightMap<T> {
    entries: Vec<(u32, T)>,
    total: u64,
}

impl<T> Default for WeightMap<T> {
    fn default() -> Self { WeightMap { entries: Vec::new(), total: 0 } }
}

impl<T: Copy> WeightMap<T> {
    pub fn new() -> Self { Self::default() }

    /// Append a bucket. Zero weights are kept but never chosen.
    pub fn add(mut self, weight: u32, value: T) -> Self {
        self.entries.push((weight, value));
        self.total += weight as u64;
        self
    }

    #[inline]
    pub fn total_weight(&self) -> u64 { self.total }

    #[inline]
    pub fn len(&self) -> usize { self.entries.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.total == 0 }

    pub fn get(&self, nonce: u64) -> Option<T> {
        if self.total == 0 {
            return None;
        }
        let mut r = mix(nonce) % self.total;
        for &(w, v) in &self.entries {
            let w = w as u64;
            if r < w {
                return Some(v);
            }
            r -= w;
        }
        None
    }

    pub fn sample<R: Randomizer + ?Sized>(&self, rng: &R) -> Option<T> { self.get(rng.int63() as u64) }

    /// Share of the total weight held by each bucket.
    pub fn distribution(&self) -> Vec<(T, f64)> {
        self.entries
            .iter()
            .map(|&(w, v)| (v, if self.total == 0 { 0.0 } else { w as f64 / self.total as f64 }))
            .collect()
    }
}

/// Integer avalanche so that consecutive nonces land in unrelated buckets.
#[inline]
fn mix(x: u64) -> u64 {
    let mut x = x;
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    (x >> 16) ^ x
}

static EASY_CELLS: OnceLock<WeightMap<i64>> = OnceLock::new();

/// Cell values used when filling boards in easy mode.
pub fn easy_cell_weights() -> &'static WeightMap<i64> {
    EASY_CELLS.get_or_init(|| {
        [(80, 1), (100, 2), (80, 3), (50, 4), (25, 5), (20, 6), (10, 7), (50, 8), (20, 9), (20, 10), (10, 11), (50, 12)]
            .into_iter()
            .fold(WeightMap::new(), |m, (w, v)| m.add(w, v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomizer::SeededRandomizer;

    #[test]
    fn it_samples_uniform_buckets_evenly() {
        let wm = WeightMap::new().add(100, 'a').add(100, 'b').add(100, 'c').add(100, 'd');
        let rng = SeededRandomizer::new(2024);
        let mut counts = [0usize; 4];
        let n = 10_000;
        for _ in 0..n {
            let v = wm.sample(&rng).unwrap();
            counts[(v as u8 - b'a') as usize] += 1;
        }
        for c in counts {
            let freq = c as f64 / n as f64;
            assert!((0.20..=0.30).contains(&freq), "freq {freq}");
        }
    }

    #[test]
    fn empty_map_yields_nothing() {
        let wm: WeightMap<i64> = WeightMap::new();
        assert_eq!(wm.get(123), None);
        let wm = WeightMap::new().add(0, 1i64);
        assert_eq!(wm.get(123), None);
    }

    #[test]
    fn single_bucket_always_wins() {
        let wm = WeightMap::new().add(0, 1).add(5, 2).add(0, 3);
        for nonce in 0..100 {
            assert_eq!(wm.get(nonce), Some(2));
        }
    }

    #[test]
    fn easy_weights_cover_one_to_twelve() {
        let wm = easy_cell_weights();
        assert_eq!(wm.len(), 12);
        assert_eq!(wm.total_weight(), 515);
        let dist = wm.distribution();
        assert!((dist.iter().map(|(_, p)| p).sum::<f64>() - 1.0).abs() < 1e-9);
    }
}
