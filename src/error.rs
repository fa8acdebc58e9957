//! Unified error type returned by every resilience policy.

use std::fmt;

/// Error surface shared by the circuit breaker, retry executor, and the
/// orchestration stack.
///
/// `E` is the caller's operation error. Admission denials (`CircuitOpen`,
/// `TooManyRequests`) mean the operation was never invoked; `RetryExhausted`
/// and `Inner` mean it ran and failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError<E> {
    /// The circuit breaker is open; the call was rejected without running.
    CircuitOpen {
        /// Name of the breaker that rejected the call.
        breaker: String,
    },
    /// The breaker is half-open and its trial budget is spent.
    TooManyRequests {
        /// Name of the breaker that rejected the call.
        breaker: String,
    },
    /// Every retry attempt failed (or the elapsed-time budget ran out).
    RetryExhausted {
        /// Total attempts made, including the initial call.
        attempts: usize,
        /// The error from the final attempt.
        last: E,
    },
    /// The wrapped operation's own error, unmodified.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { breaker } => {
                write!(f, "circuit breaker '{}' is open", breaker)
            }
            Self::TooManyRequests { breaker } => {
                write!(f, "circuit breaker '{}' is half-open and at its trial limit", breaker)
            }
            Self::RetryExhausted { attempts, last } => {
                write!(f, "retries exhausted after {} attempts; last error: {}", attempts, last)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// True if the breaker rejected the call while open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// True if the breaker rejected the call while half-open at capacity.
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, Self::TooManyRequests { .. })
    }

    /// True if the call was rejected without the operation running at all.
    pub fn is_rejection(&self) -> bool {
        self.is_circuit_open() || self.is_too_many_requests()
    }

    /// True if every retry attempt failed.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Consume the error, yielding the underlying operation error if one exists.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Borrow the underlying operation error if one exists.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn display_names_the_breaker() {
        let err: ResilienceError<TestError> =
            ResilienceError::CircuitOpen { breaker: "orders-db".into() };
        assert!(err.to_string().contains("orders-db"));
        assert!(err.is_rejection());
    }

    #[test]
    fn exhaustion_exposes_the_last_error() {
        let err = ResilienceError::RetryExhausted { attempts: 3, last: TestError("timeout") };
        assert!(err.is_retry_exhausted());
        assert_eq!(err.as_inner(), Some(&TestError("timeout")));

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "timeout");
    }

    #[test]
    fn inner_passes_through() {
        let err = ResilienceError::Inner(TestError("bad input"));
        assert!(!err.is_rejection());
        assert_eq!(err.into_inner(), Some(TestError("bad input")));
    }
}
