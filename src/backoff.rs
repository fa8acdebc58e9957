//! Backoff strategies for the retry executor.
//!
//! Attempt semantics: attempt `0` is the initial call and carries no delay;
//! retries start at attempt `1`. Exponential delays follow
//! `initial * multiplier^(attempt - 1)`, optionally capped. Computations that
//! would overflow saturate at [`MAX_DELAY`] instead of panicking.
//!
//! ```rust
//! use std::time::Duration;
//! use breakwater::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(10))
//!     .with_max(Duration::from_millis(100))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay(4), Duration::from_millis(80));
//! assert_eq!(backoff.delay(5), Duration::from_millis(100)); // capped
//! ```

use std::time::Duration;
use thiserror::Error;

/// Ceiling applied when a delay computation overflows (1 day).
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("multiplier must be >= 1.0 (got {0})")]
    MultiplierTooSmall(f64),
    #[error("constant backoff takes neither a multiplier nor a cap")]
    NotExponential,
    #[error("max must be greater than zero")]
    ZeroMax,
    #[error("max ({max:?}) must be >= initial ({initial:?})")]
    MaxBelowInitial { initial: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Constant(Duration),
    Exponential { initial: Duration, multiplier: f64, max: Option<Duration> },
}

/// Pure delay computation for retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: Kind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: Kind::Constant(delay) }
    }

    /// Exponential growth from `initial`, doubling by default and uncapped
    /// until [`MAX_DELAY`]. Adjust with [`with_multiplier`](Self::with_multiplier)
    /// and [`with_max`](Self::with_max).
    pub fn exponential(initial: Duration) -> Self {
        Self { kind: Kind::Exponential { initial, multiplier: 2.0, max: None } }
    }

    /// Set the growth factor for an exponential backoff; must be >= 1.0.
    pub fn with_multiplier(mut self, factor: f64) -> Result<Self, BackoffError> {
        if factor < 1.0 || factor.is_nan() {
            return Err(BackoffError::MultiplierTooSmall(factor));
        }
        match &mut self.kind {
            Kind::Exponential { multiplier, .. } => {
                *multiplier = factor;
                Ok(self)
            }
            Kind::Constant(_) => Err(BackoffError::NotExponential),
        }
    }

    /// Cap every computed delay at `max`; only valid for exponential backoff.
    pub fn with_max(mut self, cap: Duration) -> Result<Self, BackoffError> {
        if cap.is_zero() {
            return Err(BackoffError::ZeroMax);
        }
        match &mut self.kind {
            Kind::Exponential { initial, max, .. } => {
                if cap < *initial {
                    return Err(BackoffError::MaxBelowInitial { initial: *initial, max: cap });
                }
                *max = Some(cap);
                Ok(self)
            }
            Kind::Constant(_) => Err(BackoffError::NotExponential),
        }
    }

    /// Delay before the retry following `attempt` completed attempts.
    /// Attempt `0` (the initial call) has no delay.
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            Kind::Constant(d) => *d,
            Kind::Exponential { initial, multiplier, max } => {
                let exponent = attempt.saturating_sub(1) as f64;
                let nanos = (initial.as_nanos() as f64) * multiplier.powf(exponent);
                let uncapped = if nanos.is_finite() {
                    Duration::from_nanos(nanos.min(MAX_DELAY.as_nanos() as f64) as u64)
                } else {
                    MAX_DELAY
                };
                let capped = max.map(|m| uncapped.min(m)).unwrap_or(uncapped);
                capped.min(MAX_DELAY)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_is_flat() {
        let backoff = Backoff::constant(Duration::from_millis(50));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(50));
        assert_eq!(backoff.delay(40), Duration::from_millis(50));
    }

    #[test]
    fn exponential_doubles_by_default() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn multiplier_is_configurable() {
        let backoff = Backoff::exponential(Duration::from_millis(100))
            .with_multiplier(1.5)
            .unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(150));
        assert_eq!(backoff.delay(3), Duration::from_millis(225));
    }

    #[test]
    fn wait_sequence_is_monotonic_and_bounded() {
        let backoff = Backoff::exponential(Duration::from_millis(10))
            .with_max(Duration::from_millis(100))
            .unwrap();
        let waits: Vec<u64> = (1..=7).map(|a| backoff.delay(a).as_millis() as u64).collect();
        assert_eq!(waits, vec![10, 20, 40, 80, 100, 100, 100]);
        for pair in waits.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn overflow_saturates() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(1_000_000), MAX_DELAY);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert_eq!(
            Backoff::constant(Duration::from_millis(1)).with_max(Duration::from_secs(1)),
            Err(BackoffError::NotExponential)
        );
        assert_eq!(
            Backoff::exponential(Duration::from_millis(1)).with_multiplier(0.5),
            Err(BackoffError::MultiplierTooSmall(0.5))
        );
        assert!(matches!(
            Backoff::exponential(Duration::from_secs(2)).with_max(Duration::from_secs(1)),
            Err(BackoffError::MaxBelowInitial { .. })
        ));
        assert_eq!(
            Backoff::exponential(Duration::from_secs(1)).with_max(Duration::ZERO),
            Err(BackoffError::ZeroMax)
        );
    }

    #[test]
    fn nan_multiplier_is_rejected() {
        assert!(Backoff::exponential(Duration::from_millis(1))
            .with_multiplier(f64::NAN)
            .is_err());
    }
}
