// src/rng.rs
//! Shared, seedable randomness for jitter delays and random post selection.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Cheap-to-clone handle around one `StdRng`.
/// Pass a seed to get reproducible picks and delays in tests.
#[derive(Clone, Debug)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn seeded(seed: u64) -> Self {
        Self::wrap(StdRng::seed_from_u64(seed))
    }

    pub fn from_os() -> Self {
        Self::wrap(StdRng::from_os_rng())
    }

    /// `Some(seed)` → deterministic, `None` → OS entropy.
    pub fn from_seed_opt(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::seeded(s),
            None => Self::from_os(),
        }
    }

    fn wrap(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Uniform index in `0..len`. Returns `None` for an empty range.
    pub fn pick_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Some(g.random_range(0..len))
    }

    /// Uniform delay inside `range`, with millisecond resolution.
    pub fn jitter(&self, range: &RangeInclusive<Duration>) -> Duration {
        let lo = range.start().as_millis() as u64;
        let hi = range.end().as_millis() as u64;
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Duration::from_millis(g.random_range(lo..=hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_picks() {
        let a = SharedRng::seeded(7);
        let b = SharedRng::seeded(7);
        let pa: Vec<_> = (0..16).map(|_| a.pick_index(10)).collect();
        let pb: Vec<_> = (0..16).map(|_| b.pick_index(10)).collect();
        assert_eq!(pa, pb);
    }

    #[test]
    fn pick_index_empty_is_none() {
        assert_eq!(SharedRng::seeded(1).pick_index(0), None);
    }

    #[test]
    fn jitter_stays_in_range() {
        let rng = SharedRng::seeded(42);
        let range = Duration::from_secs(2)..=Duration::from_secs(5);
        for _ in 0..100 {
            let d = rng.jitter(&range);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        let rng = SharedRng::seeded(3);
        let zero = Duration::ZERO..=Duration::ZERO;
        assert_eq!(rng.jitter(&zero), Duration::ZERO);
    }
}
