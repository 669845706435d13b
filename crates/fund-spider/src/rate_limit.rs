use crate::error::ConfigError;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Enforces a minimum spacing between the *starts* of successive calls.
///
/// One instance is one budget: every holder of a reference (usually an `Arc<RateLimiter>`)
/// draws from the same `last_call` timestamp. Callers invoke [`RateLimiter::guard`] right
/// before each outbound attempt, retries included.
///
/// There is no queue. Callers that contend concurrently all read the same timestamp, wait
/// the same remainder, and proceed together, so under concurrent use the effective rate can
/// exceed `calls_per_second`. Sequential callers are spaced exactly.
///
/// ```rust
/// use fund_spider::RateLimiter;
/// use std::time::Duration;
///
/// let limiter = RateLimiter::new(2.0).unwrap();
/// assert_eq!(limiter.min_interval(), Duration::from_millis(500));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter allowing at most `calls_per_second` call starts per second.
    pub fn new(calls_per_second: f64) -> Result<Self, ConfigError> {
        if !(calls_per_second > 0.0 && calls_per_second.is_finite()) {
            return Err(ConfigError::NotPositive {
                name: "calls_per_second",
            });
        }
        let min_interval =
            Duration::try_from_secs_f64(1.0 / calls_per_second).map_err(|_| {
                ConfigError::Invalid {
                    name: "calls_per_second",
                    value: calls_per_second.to_string(),
                    expected: "large enough to give a representable interval",
                }
            })?;
        Ok(Self::with_interval(min_interval))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspend the calling task until the interval since the last permitted call has passed.
    pub async fn guard(&self) {
        let wait = self.wait_time();
        if !wait.is_zero() {
            trace!("rate limited; sleeping for {wait:?}");
            tokio::time::sleep(wait).await;
        }
        self.stamp();
    }

    /// Blocking flavour of [`RateLimiter::guard`], for synchronous callers.
    pub fn guard_blocking(&self) {
        let wait = self.wait_time();
        if !wait.is_zero() {
            trace!("rate limited; blocking for {wait:?}");
            std::thread::sleep(wait);
        }
        self.stamp();
    }

    fn wait_time(&self) -> Duration {
        match *self.last_call() {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    // the timestamp is taken just before the caller delegates, not after its call returns
    fn stamp(&self) {
        *self.last_call() = Some(Instant::now());
    }

    fn last_call(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
