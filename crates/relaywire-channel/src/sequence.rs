//! Sequence id generator.
//!
//! Constructed eagerly inside [`crate::Channel::new`] rather than
//! lazy-on-first-use — Rust's ownership model already gives `Channel::new`
//! a single obvious place to do it once.

use std::sync::{Mutex, PoisonError};

/// Produces sequence ids in `[min, max]`, wrapping back to `min` after
/// `max`, starting from a random point in the range so that two
/// reconnecting channels don't immediately collide on ids still
/// in-flight from a previous connection.
pub struct SequenceGenerator {
    state: Mutex<i64>,
    min: i64,
    max: i64,
}

impl SequenceGenerator {
    /// # Panics
    /// If `min > max`.
    #[must_use]
    pub fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "sequence range must be non-empty");
        let start = min + rand::random::<u64>().wrapping_rem((max - min + 1) as u64) as i64;
        Self { state: Mutex::new(start), min, max }
    }

    /// Produce the next sequence id, wrapping around to `min` after `max`.
    #[must_use]
    pub fn next(&self) -> i64 {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *guard;
        *guard = if current >= self.max { self.min } else { current + 1 };
        current
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn stays_within_range_and_wraps() {
        let gen = SequenceGenerator::new(10, 12);
        let mut seen = HashSet::new();
        for _ in 0..3 {
            let v = gen.next();
            assert!((10..=12).contains(&v));
            seen.insert(v);
        }
        assert_eq!(seen.len(), 3, "a full cycle visits every value exactly once");
    }

    #[test]
    fn does_not_repeat_before_a_full_wrap() {
        let gen = SequenceGenerator::new(0, 999);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(gen.next()), "repeated before a full wrap");
        }
    }
}
