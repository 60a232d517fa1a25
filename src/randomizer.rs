//! Seedable pseudo-random source whose position can be captured and restored.

use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Random source consumed by the game, the cell generator and the board generator.
///
/// `seed()` returns the `(seed, state)` pair that reproduces the upcoming
/// sequence when passed back to `set_seed`.
pub trait Randomizer: Send + Sync {
    /// Uniform value in `[0, n)`. Returns 0 when `n == 0`.
    fn intn(&self, n: usize) -> usize;
    /// Uniform value in `[0, n)`. Returns 0 when `n <= 0`.
    fn int63n(&self, n: i64) -> i64;
    /// Uniform non-negative value.
    fn int63(&self) -> i64;
    fn seed(&self) -> (u64, u64);
    fn set_seed(&self, seed: u64, state: u64);
}

struct Inner {
    seed: u64,
    rng: ChaCha8Rng,
}

/// ChaCha8-backed [`Randomizer`]. The state is the stream word position, so
/// a `(seed, state)` pair restores the exact next draw on any platform.
pub struct SeededRandomizer {
    inner: Mutex<Inner>,
}

impl SeededRandomizer {
    pub fn new(seed: u64) -> Self { Self::with_state(seed, 0) }

    pub fn with_state(seed: u64, state: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_word_pos(state as u128);
        SeededRandomizer { inner: Mutex::new(Inner { seed, rng }) }
    }

    /// Seed from the thread-local entropy source.
    pub fn from_entropy() -> Self { Self::new(rand::thread_rng().gen()) }

    #[inline]
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Randomizer for SeededRandomizer {
    fn intn(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.with(|i| i.rng.gen_range(0..n))
    }

    fn int63n(&self, n: i64) -> i64 {
        if n <= 0 {
            return 0;
        }
        self.with(|i| i.rng.gen_range(0..n))
    }

    fn int63(&self) -> i64 { self.with(|i| (i.rng.gen::<u64>() >> 1) as i64) }

    fn seed(&self) -> (u64, u64) { self.with(|i| (i.seed, i.rng.get_word_pos() as u64)) }

    fn set_seed(&self, seed: u64, state: u64) {
        self.with(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_word_pos(state as u128);
            *i = Inner { seed, rng };
        })
    }
}

impl Clone for SeededRandomizer {
    /// A fresh source positioned at the same `(seed, state)`.
    fn clone(&self) -> Self {
        let (seed, state) = self.seed();
        SeededRandomizer::with_state(seed, state)
    }
}

impl std::fmt::Debug for SeededRandomizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (seed, state) = self.seed();
        f.debug_struct("SeededRandomizer").field("seed", &seed).field("state", &state).finish()
    }
}
