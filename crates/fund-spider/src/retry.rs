use crate::error::{ConfigError, FetchError, RetryKind};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Which failures are eligible for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOn {
    /// Every failure except an already exhausted retry budget.
    Any,

    /// Only failures whose [`FetchError::retry_kind`] is listed.
    Kinds(Vec<RetryKind>),
}

impl RetryOn {
    pub fn matches(&self, err: &FetchError) -> bool {
        match self {
            RetryOn::Any => !matches!(err, FetchError::RetriesExhausted { .. }),
            RetryOn::Kinds(kinds) => err.retry_kind().is_some_and(|kind| kinds.contains(&kind)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub max_retries: u32,
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            jitter: true,
            max_retries: 10,
            retry_on: RetryOn::Kinds(vec![RetryKind::RateLimited, RetryKind::Throttled]),
        }
    }
}

impl RetryConfig {
    /// Delays must never shrink: `exponential_base` has to be finite and at least 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.exponential_base.is_finite() && self.exponential_base >= 1.0) {
            return Err(ConfigError::Invalid {
                name: "exponential_base",
                value: self.exponential_base.to_string(),
                expected: "a finite number no smaller than 1",
            });
        }
        Ok(())
    }
}

/// The backoff state machine for one logical call.
///
/// Each retryable failure bumps `num_retries`; once it passes `max_retries` the budget is
/// exhausted. Otherwise the delay grows by `exponential_base * (1 + jitter * U)`, with `U`
/// drawn uniformly from `[0, 1)`.
///
/// ```rust
/// use fund_spider::{Backoff, RetryConfig};
/// use std::time::Duration;
///
/// let config = RetryConfig { jitter: false, max_retries: 2, ..RetryConfig::default() };
/// let mut backoff = Backoff::new(&config).unwrap();
/// assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(2));
/// assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(4));
/// assert!(backoff.next_delay().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    num_retries: u32,
    delay: f64,
    exponential_base: f64,
    jitter: bool,
    max_retries: u32,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::checked(config))
    }

    // `config` has already been validated
    fn checked(config: &RetryConfig) -> Self {
        Self {
            num_retries: 0,
            delay: config.initial_delay.as_secs_f64(),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
            max_retries: config.max_retries,
        }
    }

    pub fn retries(&self) -> u32 {
        self.num_retries
    }

    /// Register a retryable failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Result<Duration, FetchError> {
        self.next_delay_with(rand::random::<f64>())
    }

    /// [`Backoff::next_delay`] with the uniform sample supplied by the caller.
    pub fn next_delay_with(&mut self, uniform: f64) -> Result<Duration, FetchError> {
        self.num_retries += 1;
        if self.num_retries > self.max_retries {
            return Err(FetchError::RetriesExhausted {
                max_retries: self.max_retries,
            });
        }

        let jitter = if self.jitter { 1.0 } else { 0.0 };
        self.delay *= self.exponential_base * (1.0 + jitter * uniform);
        Ok(Duration::try_from_secs_f64(self.delay).unwrap_or(Duration::MAX))
    }
}

/// Owns the retry policy and drives [`Backoff`] around an operation.
///
/// The operation is re-invoked from scratch on every attempt, so anything that must happen
/// per attempt (a [`RateLimiter::guard`](crate::RateLimiter::guard), a semaphore permit)
/// belongs inside it.
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or exhausts the budget.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut backoff = Backoff::checked(&self.config);
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.config.retry_on.matches(&err) => {
                    let delay = self.backoff(&mut backoff, &err)?;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Blocking flavour of [`Retrier::run`]; the same state machine, with thread sleeps.
    pub fn run_blocking<T, F>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        let mut backoff = Backoff::checked(&self.config);
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if self.config.retry_on.matches(&err) => {
                    let delay = self.backoff(&mut backoff, &err)?;
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff(&self, backoff: &mut Backoff, err: &FetchError) -> Result<Duration, FetchError> {
        let delay = backoff.next_delay().map_err(|exhausted| {
            error!("giving up after {} retries, error({err})", self.config.max_retries);
            exhausted
        })?;
        warn!(
            "attempt failed, error({err}); retry {}/{} in {delay:?}",
            backoff.retries(),
            self.config.max_retries
        );
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_retries,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn delays_grow_without_jitter() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config).unwrap();
        let delays: Vec<Duration> = (0..4).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16)
            ]
        );
    }

    #[test]
    fn jitter_scales_by_the_uniform_sample() {
        let mut backoff = Backoff::new(&RetryConfig::default()).unwrap();
        // 1s * 2 * (1 + 0.5)
        assert_eq!(backoff.next_delay_with(0.5).unwrap(), Duration::from_secs(3));
        // 3s * 2 * (1 + 0)
        assert_eq!(backoff.next_delay_with(0.0).unwrap(), Duration::from_secs(6));
    }

    #[test]
    fn delays_never_decrease() {
        let mut backoff = Backoff::new(&RetryConfig::default()).unwrap();
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= previous);
            previous = delay;
        }
        assert!(matches!(
            backoff.next_delay(),
            Err(FetchError::RetriesExhausted { max_retries: 10 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries() {
        let retrier = Retrier::new(RetryConfig::default()).unwrap();
        let attempts = &AtomicU32::new(0);

        let result: Result<(), FetchError> = retrier
            .run(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::RateLimited("429".into()))
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { max_retries: 10 })
        ));
        // the first attempt plus exactly `max_retries` retries
        assert_eq!(attempts.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let retrier = Retrier::new(RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        })
        .unwrap();
        let attempts = &AtomicU32::new(0);

        let time = Instant::now();
        let result = retrier
            .run(|| async move {
                match attempts.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(FetchError::RateLimited("429".into())),
                    1 => Err(FetchError::Throttled("503".into())),
                    _ => Ok("AAPL"),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "AAPL");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // slept 2s then 4s
        assert!(time.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_propagate_immediately() {
        let retrier = Retrier::new(quick(5)).unwrap();
        let attempts = &AtomicU32::new(0);

        let result: Result<(), FetchError> = retrier
            .run(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Other(anyhow::anyhow!("no executives table")))
            })
            .await;

        assert!(matches!(result, Err(FetchError::Other(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_any_covers_every_error() {
        let retrier = Retrier::new(RetryConfig {
            retry_on: RetryOn::Any,
            ..quick(2)
        })
        .unwrap();
        let attempts = &AtomicU32::new(0);

        let result: Result<(), FetchError> = retrier
            .run(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Status {
                    status: 500,
                    url: "https://example.com".into(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { max_retries: 2 })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_on_only_listed_kinds() {
        let only_429 = RetryOn::Kinds(vec![RetryKind::RateLimited]);
        assert!(only_429.matches(&FetchError::RateLimited("429".into())));
        assert!(!only_429.matches(&FetchError::Throttled("503".into())));
        assert!(!RetryOn::Any.matches(&FetchError::RetriesExhausted { max_retries: 1 }));
    }

    #[test]
    fn shrinking_or_unbounded_bases_are_rejected() {
        for base in [0.5, -2.0, f64::NAN, f64::INFINITY] {
            let config = RetryConfig {
                exponential_base: base,
                ..RetryConfig::default()
            };
            assert!(matches!(
                Retrier::new(config.clone()),
                Err(ConfigError::Invalid {
                    name: "exponential_base",
                    ..
                })
            ));
            assert!(Backoff::new(&config).is_err());
        }

        // a flat base keeps the initial delay
        let flat = RetryConfig {
            exponential_base: 1.0,
            jitter: false,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&flat).unwrap();
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn blocking_variant_follows_the_same_state_machine() {
        let retrier = Retrier::new(quick(3)).unwrap();
        let mut attempts = 0;

        let result: Result<(), FetchError> = retrier.run_blocking(|| {
            attempts += 1;
            Err(FetchError::RateLimited("429".into()))
        });

        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { max_retries: 3 })
        ));
        assert_eq!(attempts, 4);
    }
}
