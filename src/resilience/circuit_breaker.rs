use crate::resilience::keyed::KeyedRegistry;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Open { remaining: Duration },
    HalfOpenSaturated,
}

impl Rejection {
    pub fn state(&self) -> CircuitState {
        match self {
            Rejection::Open { .. } => CircuitState::Open,
            Rejection::HalfOpenSaturated => CircuitState::HalfOpen,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Open { remaining } => {
                write!(f, "circuit open, retry in {}ms", remaining.as_millis())
            }
            Rejection::HalfOpenSaturated => write!(f, "circuit half-open, probe limit reached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub half_open_attempts: u32,
    /// Time since the last recorded failure, if any.
    pub since_last_failure_ms: Option<u64>,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    /// Half-open successes needed to close again.
    pub reset_successes: u32,
    /// Probe calls admitted per half-open cycle.
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            reset_successes: 2,
            half_open_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_reset_successes(mut self, successes: u32) -> Self {
        self.reset_successes = successes;
        self
    }

    pub fn with_half_open_requests(mut self, requests: u32) -> Self {
        self.half_open_requests = requests;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    successes: u32,
    half_open_attempts: u32,
    last_failure: Option<Instant>,
}

impl State {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            successes: 0,
            half_open_attempts: 0,
            last_failure: None,
        }
    }
}

/// Three-state circuit breaker.
///
/// - Closed: counts consecutive failures, opens at the threshold
/// - Open: rejects until `open_timeout` has passed since the last failure
/// - HalfOpen: admits a bounded number of probes; enough successes close the
///   circuit, any failure reopens it
///
/// The Open→HalfOpen move happens inside [`CircuitBreaker::allow`], and the
/// call that triggers it is the first probe.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: RwLock<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: RwLock::new(State::closed()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn allow(&self) -> std::result::Result<(), Rejection> {
        let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
        match st.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.cfg.open_timeout {
                    st.state = CircuitState::HalfOpen;
                    st.successes = 0;
                    st.half_open_attempts = 1;
                    tracing::debug!("circuit breaker half-open, admitting probe");
                    Ok(())
                } else {
                    Err(Rejection::Open {
                        remaining: self.cfg.open_timeout.saturating_sub(elapsed),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if st.half_open_attempts < self.cfg.half_open_requests {
                    st.half_open_attempts += 1;
                    Ok(())
                } else {
                    Err(Rejection::HalfOpenSaturated)
                }
            }
        }
    }

    pub fn allow_request(&self) -> bool {
        self.allow().is_ok()
    }

    pub fn record_success(&self) {
        let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
        match st.state {
            CircuitState::Closed => st.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                st.successes += 1;
                if st.successes >= self.cfg.reset_successes {
                    tracing::debug!(successes = st.successes, "circuit breaker closed");
                    *st = State {
                        last_failure: st.last_failure,
                        ..State::closed()
                    };
                }
            }
            // Late result from a call admitted before the trip.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
        st.last_failure = Some(Instant::now());
        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                if st.consecutive_failures >= self.cfg.failure_threshold {
                    st.state = CircuitState::Open;
                    tracing::warn!(
                        failures = st.consecutive_failures,
                        open_timeout_ms = self.cfg.open_timeout.as_millis() as u64,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                st.state = CircuitState::Open;
                st.successes = 0;
                st.half_open_attempts = 0;
                tracing::warn!("circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state without triggering the lazy Open→HalfOpen move.
    pub fn state(&self) -> CircuitState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.state.read().unwrap_or_else(|e| e.into_inner());
        let since = st.last_failure.map(|t| t.elapsed());
        let open_remaining_ms = match (st.state, since) {
            (CircuitState::Open, Some(elapsed)) if elapsed < self.cfg.open_timeout => {
                Some((self.cfg.open_timeout - elapsed).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            open_timeout_ms: self.cfg.open_timeout.as_millis() as u64,
            consecutive_failures: st.consecutive_failures,
            half_open_successes: st.successes,
            half_open_attempts: st.half_open_attempts,
            since_last_failure_ms: since.map(|d| d.as_millis() as u64),
            open_remaining_ms,
        }
    }

    /// Force the breaker back to Closed with cleared counters.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = State::closed();
    }
}

/// One breaker per model name, created on first use.
pub struct PerModelCircuitBreaker {
    cfg: CircuitBreakerConfig,
    breakers: KeyedRegistry<CircuitBreaker>,
}

impl PerModelCircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        let template = cfg.clone();
        Self {
            cfg,
            breakers: KeyedRegistry::new(move |_model| {
                Arc::new(CircuitBreaker::new(template.clone()))
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn breaker(&self, model: &str) -> Arc<CircuitBreaker> {
        self.breakers.get(model)
    }

    pub fn allow(&self, model: &str) -> std::result::Result<(), Rejection> {
        self.breaker(model).allow()
    }

    pub fn record_success(&self, model: &str) {
        self.breaker(model).record_success();
    }

    pub fn record_failure(&self, model: &str) {
        self.breaker(model).record_failure();
    }

    /// Stats for a model that has already been seen.
    pub fn snapshot(&self, model: &str) -> Option<CircuitBreakerSnapshot> {
        self.breakers.peek(model).map(|b| b.snapshot())
    }

    pub fn models(&self) -> Vec<String> {
        self.breakers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fast(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_open_timeout(Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.open_timeout, Duration::from_secs(30));
        assert_eq!(config.reset_successes, 2);
        assert_eq!(config.half_open_requests, 3);
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert!(cb.allow().is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.open_remaining_ms.is_none());
        assert!(snapshot.since_last_failure_ms.is_none());
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let cb = fast(5);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.snapshot().consecutive_failures, 2);

        cb.record_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_opens_at_threshold() {
        let cb = fast(3);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow().is_ok());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        let rejection = cb.allow().unwrap_err();
        assert_eq!(rejection.state(), CircuitState::Open);
        assert!(cb.snapshot().open_remaining_ms.is_some());
    }

    #[test]
    fn test_half_open_after_timeout_then_closes() {
        let cb = fast(2);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow().is_err());

        thread::sleep(Duration::from_millis(60));
        // Still reported open until someone asks to be admitted.
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = fast(1);
        cb.record_failure();
        thread::sleep(Duration::from_millis(60));
        assert!(cb.allow().is_ok());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.allow(), Err(Rejection::Open { .. })));
    }

    #[test]
    fn test_half_open_probe_budget() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_open_timeout(Duration::from_millis(20))
                .with_half_open_requests(2)
                .with_reset_successes(2),
        );
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));

        assert!(cb.allow().is_ok());
        assert!(cb.allow().is_ok());
        assert_eq!(cb.allow(), Err(Rejection::HalfOpenSaturated));
        assert_eq!(cb.snapshot().half_open_attempts, 2);
    }

    #[test]
    fn test_circuit_breaker_thread_safe() {
        let cb = Arc::new(fast(100));

        let mut handles = vec![];
        for _ in 0..10 {
            let cb_clone = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                for _ in 0..5 {
                    cb_clone.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.snapshot().consecutive_failures, 50);
    }

    #[test]
    fn test_per_model_isolation() {
        let breakers = PerModelCircuitBreaker::new(CircuitBreakerConfig::new().with_failure_threshold(1));
        breakers.record_failure("gpt-4o");
        assert!(breakers.allow("gpt-4o").is_err());
        assert!(breakers.allow("claude-3-haiku").is_ok());
        assert!(Arc::ptr_eq(&breakers.breaker("gpt-4o"), &breakers.breaker("gpt-4o")));
        assert_eq!(
            breakers.snapshot("gpt-4o").map(|s| s.state),
            Some(CircuitState::Open)
        );
        assert!(breakers.snapshot("unknown").is_none());
    }
}
