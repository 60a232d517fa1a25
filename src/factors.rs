//! Prime factorisation backed by a shared, monotonically growing prime list.

use std::sync::{Mutex, OnceLock, PoisonError};

static PRIMES: OnceLock<Mutex<Vec<u64>>> = OnceLock::new();

#[inline]
fn primes() -> &'static Mutex<Vec<u64>> { PRIMES.get_or_init(|| Mutex::new(vec![2, 3])) }

/// Extend the shared prime list until it covers `limit`.
fn ensure_primes_up_to(limit: u64) {
    let mut list = primes().lock().unwrap_or_else(PoisonError::into_inner);
    let mut candidate = match list.last() {
        Some(&last) if last >= limit => return,
        Some(&last) => last + 2,
        None => 2,
    };
    while list.last().map_or(true, |&last| last < limit) {
        let is_prime = list
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0);
        if is_prime {
            list.push(candidate);
        }
        candidate += 2;
    }
}

/// Prime factors of `n` in ascending order, with multiplicity.
///
/// `0` and `1` have no prime factors.
///
/// ```
/// use tally_engine::factors::prime_factors;
/// assert_eq!(prime_factors(96), vec![2, 2, 2, 2, 2, 3]);
/// assert_eq!(prime_factors(2041), vec![13, 157]);
/// ```
pub fn prime_factors(n: u64) -> Vec<u64> {
    match n {
        0 | 1 => return Vec::new(),
        _ => {}
    }
    let root = (n as f64).sqrt() as u64 + 1;
    ensure_primes_up_to(root);
    let list = primes().lock().unwrap_or_else(PoisonError::into_inner);
    let mut out = Vec::new();
    let mut rest = n;
    for &p in list.iter() {
        if p * p > rest {
            break;
        }
        while rest % p == 0 {
            out.push(p);
            rest /= p;
        }
    }
    if rest > 1 {
        out.push(rest);
    }
    out
}

/// Factor list of a value, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Factors(Vec<u64>);

impl Factors {
    pub fn of(n: u64) -> Self { Factors(prime_factors(n)) }

    #[inline]
    pub fn factors(&self) -> &[u64] { &self.0 }

    /// Distinct factors, sorted ascending.
    pub fn unique_factors(&self) -> Vec<u64> {
        let mut out = self.0.clone();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Insert a factor keeping the list sorted.
    pub fn add_factor(&mut self, factor: u64) {
        let at = self.0.partition_point(|&f| f <= factor);
        self.0.insert(at, factor);
    }

    /// Product of all factors.
    pub fn product(&self) -> u64 { self.0.iter().fold(1u64, |acc, &f| acc.saturating_mul(f)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_factors_known_values() {
        assert_eq!(prime_factors(0), Vec::<u64>::new());
        assert_eq!(prime_factors(1), Vec::<u64>::new());
        assert_eq!(Factors::of(1).product(), 1);
        assert_eq!(prime_factors(2039), vec![2039]);
        assert_eq!(prime_factors(2041), vec![13, 157]);
        assert_eq!(prime_factors(256), vec![2; 8]);
        assert_eq!(prime_factors(2038), vec![2, 1019]);
        assert_eq!(prime_factors(96), vec![2, 2, 2, 2, 2, 3]);
        assert_eq!(prime_factors(12), vec![2, 2, 3]);
    }

    #[test]
    fn factorisation_multiplies_back() {
        for n in 2..2000u64 {
            assert_eq!(Factors::of(n).product(), n, "n={n}");
        }
    }

    #[test]
    fn shared_list_is_safe_across_threads() {
        let handles: Vec<_> = (0..8u64)
            .map(|t| std::thread::spawn(move || prime_factors(1_000_003 + t * 2)))
            .collect();
        for h in handles {
            let fs = h.join().unwrap();
            assert!(!fs.is_empty());
        }
        assert_eq!(prime_factors(1_000_003), vec![1_000_003]);
    }

    #[test]
    fn unique_and_add() {
        let mut f = Factors::of(12);
        assert_eq!(f.unique_factors(), vec![2, 3]);
        f.add_factor(2);
        assert_eq!(f.factors(), &[2, 2, 2, 3]);
        assert_eq!(f.product(), 24);
    }
}
