//! Optional jitter applied to retry delays.
//!
//! The reference retry behavior is jitter-free, so [`Jitter::None`] is the
//! default. Under high concurrency, identical backoff schedules synchronize
//! retry storms across callers; opting into `Full` or `Equal` jitter spreads
//! them out.

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact backoff delay. This is the default.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay/2, delay]`, keeping a floor under the wait.
    Equal,
}

impl Jitter {
    /// Apply this strategy to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rand::rng().random_range(0..=millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::rng().random_range(0..=(millis - half)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(123);
        assert_eq!(Jitter::None.apply(d), d);
    }

    #[test]
    fn full_stays_within_bounds() {
        let d = Duration::from_millis(100);
        for _ in 0..200 {
            assert!(Jitter::Full.apply(d) <= d);
        }
    }

    #[test]
    fn equal_keeps_a_floor() {
        let d = Duration::from_millis(100);
        for _ in 0..200 {
            let out = Jitter::Equal.apply(d);
            assert!(out >= Duration::from_millis(50));
            assert!(out <= d);
        }
    }

    #[test]
    fn zero_delay_is_stable() {
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(Jitter::Equal.apply(Duration::ZERO), Duration::ZERO);
    }
}
