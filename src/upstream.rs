//! Guard for outbound calls: bounded retries with exponential backoff and a
//! per-service circuit breaker.
//!
//! Only transient failures are retried: timeouts, connection errors, HTTP 429
//! and 5xx. Anything else (bad request, auth, decode errors) fails on the
//! first attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::UpstreamConfig;

/// Error from a single attempt, tagged with whether a retry could help.
#[derive(Debug)]
pub struct CallError {
    pub transient: bool,
    pub source: anyhow::Error,
}

impl CallError {
    pub fn fatal(source: impl Into<anyhow::Error>) -> Self {
        Self {
            transient: false,
            source: source.into(),
        }
    }

    pub fn transient(source: impl Into<anyhow::Error>) -> Self {
        Self {
            transient: true,
            source: source.into(),
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_reqwest(err: reqwest::Error, what: &str) -> Self {
        let transient = err.is_timeout() || err.is_connect();
        Self {
            transient,
            source: anyhow::Error::new(err).context(format!("Failed to call {what}")),
        }
    }

    /// Classify a non-success HTTP status. The body is echoed in the message.
    pub fn from_status(status: reqwest::StatusCode, body: &str, what: &str) -> Self {
        let transient = status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
        Self {
            transient,
            source: anyhow::anyhow!("{what} returned {status}: {}", body.trim()),
        }
    }
}

/// Context attached to every error leaving [`guarded`], naming the service
/// that failed. Survives further `.context(...)` layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub service: &'static str,
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} request failed", self.service)
    }
}

/// Name of the upstream service behind `err`, if any.
pub fn failed_service(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<UpstreamFailure>().map(|f| f.service)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Delay before retry number `retry` (1-based).
    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
}

/// Consecutive-failure circuit breaker for one external service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    pub fn from_config(name: &'static str, config: &UpstreamConfig) -> Self {
        Self::new(
            name,
            config.breaker_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a call may proceed now. An expired open breaker lets a trial
    /// call through (half-open) and closes again on success.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if now >= until => {
                *state = BreakerState::Closed {
                    failures: self.threshold - 1,
                };
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.state.lock();
        let failures = match *state {
            BreakerState::Closed { failures } => failures + 1,
            BreakerState::Open { .. } => self.threshold,
        };
        if failures >= self.threshold {
            tracing::warn!(
                "Circuit breaker '{}' opened for {:?} after {failures} failures",
                self.name,
                self.cooldown
            );
            *state = BreakerState::Open {
                until: now + self.cooldown,
            };
        } else {
            *state = BreakerState::Closed { failures };
        }
    }
}

/// Run `op` under `policy` and `breaker`.
pub async fn guarded<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let failure = UpstreamFailure {
        service: breaker.name(),
    };
    if !breaker.allow_at(Instant::now()) {
        return Err(anyhow::anyhow!(
            "{} is temporarily unavailable (circuit open after repeated failures)",
            breaker.name()
        )
        .context(failure));
    }

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) => {
                if !err.transient {
                    return Err(err.source.context(failure));
                }
                breaker.record_failure_at(Instant::now());
                if attempt >= policy.max_attempts {
                    return Err(err
                        .source
                        .context(format!("gave up after {attempt} attempt(s)"))
                        .context(failure));
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} attempt {attempt} failed, retrying in {delay:?}: {:#}",
                    breaker.name(),
                    err.source
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
