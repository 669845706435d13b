use crate::error::ConfigError;
use crate::fetch::FetchConfig;
use crate::rate_limit::RateLimiter;
use crate::retry::{Retrier, RetryConfig, RetryOn};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// One call every 2.5 seconds.
const DEFAULT_CALLS_PER_SECOND: f64 = 0.4;
const DEFAULT_SAVE_EVERY: usize = 5;
const DEFAULT_STORE_DIR: &str = "./buffer/results";

/// Runtime settings for a spider run, read from the environment (and `.env`).
///
/// | variable              | default            |
/// |-----------------------|--------------------|
/// | `CALLS_PER_SECOND`    | `0.4`              |
/// | `SAVE_EVERY`          | `5`                |
/// | `CONCURRENT_REQUESTS` | number of CPUs     |
/// | `STORE_DIR`           | `./buffer/results` |
/// | `MAX_RETRIES`         | `10`               |
/// | `INITIAL_DELAY`       | `1` (seconds)      |
/// | `BACKOFF_JITTER`      | `true`             |
/// | `RETRY_ANY`           | `false`            |
#[derive(Debug, Clone)]
pub struct SpiderConfig {
    pub calls_per_second: f64,
    pub save_every: usize,
    pub concurrent_requests: usize,
    pub store_dir: PathBuf,
    pub retry: RetryConfig,
}

impl SpiderConfig {
    /// Load the `.env` file (if any) and read the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let calls_per_second = parse(
            &lookup,
            "CALLS_PER_SECOND",
            DEFAULT_CALLS_PER_SECOND,
            "a number",
        )?;
        if !(calls_per_second > 0.0 && calls_per_second.is_finite()) {
            return Err(ConfigError::NotPositive {
                name: "CALLS_PER_SECOND",
            });
        }

        let save_every = parse(&lookup, "SAVE_EVERY", DEFAULT_SAVE_EVERY, "an integer")?;
        if save_every == 0 {
            return Err(ConfigError::NotPositive { name: "SAVE_EVERY" });
        }

        let concurrent_requests = parse(
            &lookup,
            "CONCURRENT_REQUESTS",
            num_cpus::get(),
            "an integer",
        )?;
        if concurrent_requests == 0 {
            return Err(ConfigError::NotPositive {
                name: "CONCURRENT_REQUESTS",
            });
        }

        let defaults = RetryConfig::default();
        let initial_delay: f64 = parse(
            &lookup,
            "INITIAL_DELAY",
            defaults.initial_delay.as_secs_f64(),
            "a number of seconds",
        )?;
        let initial_delay = Duration::try_from_secs_f64(initial_delay).map_err(|_| {
            ConfigError::Invalid {
                name: "INITIAL_DELAY",
                value: initial_delay.to_string(),
                expected: "a non-negative number of seconds",
            }
        })?;
        let retry_any: bool = parse(&lookup, "RETRY_ANY", false, "true or false")?;
        let retry = RetryConfig {
            initial_delay,
            max_retries: parse(&lookup, "MAX_RETRIES", defaults.max_retries, "an integer")?,
            jitter: parse(&lookup, "BACKOFF_JITTER", defaults.jitter, "true or false")?,
            retry_on: if retry_any {
                RetryOn::Any
            } else {
                defaults.retry_on.clone()
            },
            ..defaults
        };

        let store_dir = lookup("STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));

        let config = Self {
            calls_per_second,
            save_every,
            concurrent_requests,
            store_dir,
            retry,
        };
        debug!("spider configuration read: {config:?}");
        Ok(config)
    }

    /// A fresh limiter for this configuration's budget.
    pub fn rate_limiter(&self) -> Result<RateLimiter, ConfigError> {
        RateLimiter::new(self.calls_per_second)
    }

    pub fn retrier(&self) -> Result<Retrier, ConfigError> {
        Retrier::new(self.retry.clone())
    }

    pub fn fetch_config(&self, tui: bool) -> FetchConfig {
        FetchConfig {
            save_every: self.save_every,
            tui,
        }
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid {
                name,
                value,
                expected,
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = SpiderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.calls_per_second, 0.4);
        assert_eq!(config.save_every, 5);
        assert_eq!(config.store_dir, PathBuf::from("./buffer/results"));
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert!(config.concurrent_requests >= 1);
    }

    #[test]
    fn reads_overrides() {
        let config = SpiderConfig::from_lookup(lookup(&[
            ("CALLS_PER_SECOND", "2"),
            ("SAVE_EVERY", " 10 "),
            ("CONCURRENT_REQUESTS", "4"),
            ("MAX_RETRIES", "3"),
            ("INITIAL_DELAY", "0.5"),
            ("BACKOFF_JITTER", "false"),
            ("RETRY_ANY", "true"),
            ("STORE_DIR", "/tmp/fund"),
        ]))
        .unwrap();
        assert_eq!(config.calls_per_second, 2.0);
        assert_eq!(config.save_every, 10);
        assert_eq!(config.concurrent_requests, 4);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.retry_on, RetryOn::Any);
        assert_eq!(config.rate_limiter().unwrap().min_interval(), Duration::from_millis(500));
        assert_eq!(config.fetch_config(false).save_every, 10);
        assert_eq!(config.retrier().unwrap().config().max_retries, 3);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SpiderConfig::from_lookup(lookup(&[("SAVE_EVERY", "five")])),
            Err(ConfigError::Invalid { name: "SAVE_EVERY", .. })
        ));
        assert!(matches!(
            SpiderConfig::from_lookup(lookup(&[("SAVE_EVERY", "0")])),
            Err(ConfigError::NotPositive { name: "SAVE_EVERY" })
        ));
        assert!(matches!(
            SpiderConfig::from_lookup(lookup(&[("CALLS_PER_SECOND", "0")])),
            Err(ConfigError::NotPositive { name: "CALLS_PER_SECOND" })
        ));
        assert!(matches!(
            SpiderConfig::from_lookup(lookup(&[("INITIAL_DELAY", "-1")])),
            Err(ConfigError::Invalid { name: "INITIAL_DELAY", .. })
        ));
    }
}
