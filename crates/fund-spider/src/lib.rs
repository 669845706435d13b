/// Error types shared by every spider component.
pub mod error;

/// Environment (`.env`) driven configuration.
pub mod config;

/// Durable key -> result stores that fetch runs resume from.
pub mod store;

/// Minimum spacing between successive outbound calls.
pub mod rate_limit;

/// Retry with exponential, jittered backoff.
pub mod retry;

/// The resumable, checkpointed bulk fetcher.
pub mod fetch;

/// Bounded fan-out of outbound calls, for sources that support batched fetching.
pub mod concurrent;

/// GET + JSON helpers for REST sources.
pub mod api;

/// Calendar helpers; historical snapshots are fetched one day at a time.
pub mod dates;

pub mod fs;

mod tui;

pub use config::SpiderConfig;
pub use error::{ConfigError, FetchError, RetryKind, SpiderError, StoreError};
pub use fetch::{BulkFetcher, Company, FetchConfig, FetchReport, Outcome, WorkItem};
pub use rate_limit::RateLimiter;
pub use retry::{Backoff, Retrier, RetryConfig, RetryOn};
pub use store::{Backend, ResultStore};

/// Shortcut for required API elements.
pub(crate) mod http {
    pub(crate) use dotenv::var;
    pub(crate) use reqwest::Client as HttpClient;
}

/// Format the time elapsed since `time`, for log lines.
pub fn time_elapsed(time: std::time::Instant) -> String {
    use colored::Colorize;
    format!("elapsed time: {} ms", time.elapsed().as_millis())
        .truecolor(255, 135, 0)
        .to_string()
}
