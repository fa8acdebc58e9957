//! Generation-tagged circuit breaker.
//!
//! State and counters live behind a single mutex per breaker; the critical
//! section never performs I/O. Admission (`before_request`) hands out the
//! current generation, the wrapped operation runs outside the lock, and the
//! completion (`after_request`) is applied only if the generation still
//! matches. A completion that lands after the breaker has moved on is
//! silently discarded, so stale calls can never corrupt a fresh window.
//!
//! Open→HalfOpen is a lazy, access-triggered timeout: the logical state is
//! recomputed from the stored expiry whenever the breaker is touched, never
//! by a background timer.

use crate::clock::{Clock, MonotonicClock};
use crate::ResilienceError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through; failures are counted against the current window.
    Closed,
    /// Calls are rejected immediately until the cool-down elapses.
    Open,
    /// A bounded number of trial calls probe whether the dependency recovered.
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-generation request tally.
///
/// Counts reset to zero whenever the breaker's generation advances, so a
/// trip predicate always sees the current window only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Failures as a fraction of admitted requests in the current window;
    /// zero when no requests have been seen.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    #[error("max_requests must be > 0 (got {provided})")]
    InvalidMaxRequests { provided: u32 },
    #[error("timeout must be > 0")]
    InvalidTimeout,
}

type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
type StateChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;

struct Shared {
    state: State,
    generation: u64,
    counts: Counts,
    /// Clock millis at which the current state/generation is reconsidered:
    /// end of the rolling window in Closed, end of the cool-down in Open,
    /// absent in HalfOpen.
    expiry: Option<u64>,
}

struct Inner {
    name: String,
    max_requests: u32,
    interval: Option<Duration>,
    timeout: Duration,
    ready_to_trip: TripPredicate,
    on_state_change: Option<StateChangeHook>,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
}

/// Circuit breaker guarding calls to one unreliable dependency.
///
/// Clones share the same underlying state, so every handle observes and
/// affects the same circuit lifecycle.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("max_requests", &self.inner.max_requests)
            .field("interval", &self.inner.interval)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

enum Denial {
    Open,
    TrialBudgetSpent,
}

impl CircuitBreaker {
    /// Builder with defaults: `max_requests` 1, no rolling interval, 60s
    /// cool-down, trip after more than 5 consecutive failures.
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new(name)
    }

    /// Execute `operation` under breaker protection.
    ///
    /// While Open the call is rejected with `CircuitOpen`; while HalfOpen with
    /// the trial budget spent it is rejected with `TooManyRequests`. In both
    /// cases the operation is never invoked. If the operation panics or the
    /// future is dropped mid-flight, the admission is still recorded as a
    /// failure so the window's statistics stay consistent.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(Denial::Open) => {
                return Err(ResilienceError::CircuitOpen { breaker: self.inner.name.clone() })
            }
            Err(Denial::TrialBudgetSpent) => {
                return Err(ResilienceError::TooManyRequests { breaker: self.inner.name.clone() })
            }
        };

        // Records the admission as a failure if the operation aborts without
        // producing a result (panic or cancellation).
        struct CompletionGuard<'a> {
            breaker: &'a CircuitBreaker,
            generation: u64,
            armed: bool,
        }
        impl Drop for CompletionGuard<'_> {
            fn drop(&mut self) {
                if self.armed {
                    self.breaker.after_request(self.generation, false);
                }
            }
        }

        let mut guard = CompletionGuard { breaker: self, generation, armed: true };
        let result = operation().await;
        guard.armed = false;

        self.after_request(generation, result.is_ok());
        result
    }

    /// Breaker name, as given at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current logical state, with lazy expiries applied.
    pub fn state(&self) -> State {
        let mut shared = self.lock_shared();
        let now = self.inner.clock.now_millis();
        self.current_state(&mut shared, now)
    }

    /// Snapshot of the current generation's counts.
    pub fn counts(&self) -> Counts {
        let mut shared = self.lock_shared();
        let now = self.inner.clock.now_millis();
        self.current_state(&mut shared, now);
        shared.counts
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        // A poisoned mutex means a panic while holding the lock; state updates
        // never panic, so propagating the poison would only hide the original.
        match self.inner.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admission check. On success the counts gain a request and the admitting
    /// generation is returned for the matching `after_request`.
    fn before_request(&self) -> Result<u64, Denial> {
        let mut shared = self.lock_shared();
        let now = self.inner.clock.now_millis();
        let state = self.current_state(&mut shared, now);

        match state {
            State::Open => Err(Denial::Open),
            State::HalfOpen if shared.counts.requests >= self.inner.max_requests => {
                Err(Denial::TrialBudgetSpent)
            }
            _ => {
                shared.counts.on_request();
                Ok(shared.generation)
            }
        }
    }

    /// Apply a completion, gated by generation match: a completion admitted
    /// under an older generation is a no-op.
    fn after_request(&self, admitted_generation: u64, success: bool) {
        let mut shared = self.lock_shared();
        let now = self.inner.clock.now_millis();
        let state = self.current_state(&mut shared, now);

        if shared.generation != admitted_generation {
            return;
        }
        if success {
            self.on_success(&mut shared, state, now);
        } else {
            self.on_failure(&mut shared, state, now);
        }
    }

    /// Compute the logical state, applying any elapsed expiry: a Closed
    /// rolling window resets counts in place (new generation, same state);
    /// an elapsed Open cool-down moves to HalfOpen.
    fn current_state(&self, shared: &mut Shared, now: u64) -> State {
        match shared.state {
            State::Closed => {
                if let Some(expiry) = shared.expiry {
                    if now >= expiry {
                        self.advance_generation(shared, now);
                    }
                }
            }
            State::Open => {
                if let Some(expiry) = shared.expiry {
                    if now >= expiry {
                        self.transition(shared, State::HalfOpen, now);
                    }
                }
            }
            State::HalfOpen => {}
        }
        shared.state
    }

    fn on_success(&self, shared: &mut Shared, state: State, now: u64) {
        match state {
            State::Closed => shared.counts.on_success(),
            State::HalfOpen => {
                shared.counts.on_success();
                if shared.counts.consecutive_successes >= self.inner.max_requests {
                    self.transition(shared, State::Closed, now);
                }
            }
            // Stale completions were already discarded by the generation gate.
            State::Open => {}
        }
    }

    fn on_failure(&self, shared: &mut Shared, state: State, now: u64) {
        match state {
            State::Closed => {
                shared.counts.on_failure();
                if (self.inner.ready_to_trip)(&shared.counts) {
                    self.transition(shared, State::Open, now);
                }
            }
            State::HalfOpen => self.transition(shared, State::Open, now),
            State::Open => {}
        }
    }

    fn transition(&self, shared: &mut Shared, to: State, now: u64) {
        let from = shared.state;
        if from == to {
            return;
        }
        shared.state = to;
        self.advance_generation(shared, now);

        match to {
            State::Open => tracing::warn!(
                breaker = %self.inner.name, %from, %to, "circuit breaker opened"
            ),
            _ => tracing::info!(
                breaker = %self.inner.name, %from, %to, "circuit breaker state change"
            ),
        }
        if let Some(hook) = &self.inner.on_state_change {
            // Observer only; runs under the breaker lock and must not call
            // back into this breaker.
            hook(&self.inner.name, from, to);
        }
    }

    /// Start a fresh window: bump the generation, zero the counts, and arm
    /// the expiry appropriate to the current state.
    fn advance_generation(&self, shared: &mut Shared, now: u64) {
        shared.generation += 1;
        shared.counts.clear();
        shared.expiry = match shared.state {
            State::Closed => self.inner.interval.map(|i| now + duration_millis(i)),
            State::Open => Some(now + duration_millis(self.inner.timeout)),
            State::HalfOpen => None,
        };
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder {
    name: String,
    max_requests: u32,
    interval: Option<Duration>,
    timeout: Duration,
    ready_to_trip: Option<TripPredicate>,
    on_state_change: Option<StateChangeHook>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: 1,
            interval: None,
            timeout: Duration::from_secs(60),
            ready_to_trip: None,
            on_state_change: None,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Half-open trial budget; also the consecutive successes required to
    /// close. Must be > 0.
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Rolling statistics window while Closed. When it elapses, counts reset
    /// silently (new generation) without a state change, bounding how long
    /// old failures influence tripping. Unset means counts accumulate until
    /// a transition.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Cool-down spent Open before the next access moves to HalfOpen.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Predicate consulted on every Closed-state failure; returning true
    /// trips the breaker. Default: more than 5 consecutive failures.
    pub fn ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(predicate));
        self
    }

    /// Observer invoked on every transition with `(name, from, to)`. For
    /// logging/alerting only; it cannot affect control flow.
    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<CircuitBreaker, CircuitBreakerError> {
        if self.max_requests == 0 {
            return Err(CircuitBreakerError::InvalidMaxRequests { provided: 0 });
        }
        if self.timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidTimeout);
        }

        let expiry = self.interval.map(|i| self.clock.now_millis() + duration_millis(i));
        Ok(CircuitBreaker {
            inner: Arc::new(Inner {
                name: self.name,
                max_requests: self.max_requests,
                interval: self.interval,
                timeout: self.timeout,
                ready_to_trip: self
                    .ready_to_trip
                    .unwrap_or_else(|| Arc::new(|counts| counts.consecutive_failures > 5)),
                on_state_change: self.on_state_change,
                clock: self.clock,
                shared: Mutex::new(Shared {
                    state: State::Closed,
                    generation: 0,
                    counts: Counts::default(),
                    expiry,
                }),
            }),
        })
    }
}
