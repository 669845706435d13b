use thiserror::Error;

/// The designated "transient" failure kinds; only these are eligible for backoff by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryKind {
    /// The source told us we are over its request budget (e.g. HTTP 429).
    RateLimited,

    /// The source is temporarily refusing work (e.g. HTTP 503).
    Throttled,
}

/// Everything that can go wrong while fetching a single item.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limit exceeded, {0}")]
    RateLimited(String),

    #[error("upstream throttled the request, {0}")]
    Throttled(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("http request failed, error({0})")]
    Http(#[from] reqwest::Error),

    #[error("failed to deserialize response, error({0})")]
    Decode(#[from] serde_json::Error),

    #[error("maximum number of retries ({max_retries}) exceeded")]
    RetriesExhausted { max_retries: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// The transient kind of this failure, if it has one.
    pub fn retry_kind(&self) -> Option<RetryKind> {
        match self {
            FetchError::RateLimited(_) => Some(RetryKind::RateLimited),
            FetchError::Throttled(_) => Some(RetryKind::Throttled),
            _ => None,
        }
    }
}

/// Failures reading or writing a result store. These abort a fetch run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path}, error({source})")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize store as JSON, error({0})")]
    Json(#[from] serde_json::Error),

    #[error("failed to (de)serialize store as bincode, error({0})")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name} format - {value:?} must be {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },
}

/// Errors that end a bulk fetch run.
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("fetch run aborted at [{key}], error({source})")]
    Aborted {
        key: String,
        #[source]
        source: FetchError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_signals_have_a_retry_kind() {
        assert_eq!(
            FetchError::RateLimited("429".into()).retry_kind(),
            Some(RetryKind::RateLimited)
        );
        assert_eq!(
            FetchError::Throttled("503".into()).retry_kind(),
            Some(RetryKind::Throttled)
        );
        assert_eq!(
            FetchError::RetriesExhausted { max_retries: 10 }.retry_kind(),
            None
        );
        assert_eq!(
            FetchError::Other(anyhow::anyhow!("no CEO listed")).retry_kind(),
            None
        );
    }

    #[test]
    fn exhausted_error_names_the_limit() {
        let err = FetchError::RetriesExhausted { max_retries: 7 };
        assert_eq!(err.to_string(), "maximum number of retries (7) exceeded");
    }
}
