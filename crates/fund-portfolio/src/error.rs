use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio has no holdings")]
    Empty,

    #[error("total market cap must be positive, found {0}")]
    NonPositiveTotal(f64),

    #[error("invalid market cap {value} for [{ticker}]")]
    InvalidMarketCap { ticker: String, value: f64 },

    #[error("[{0}] appears more than once in the portfolio")]
    DuplicateTicker(String),

    #[error("max weight must be in (0, 1], found {0}")]
    InvalidMaxWeight(f64),

    #[error("portfolio start value is zero; no return can be computed")]
    ZeroStartValue,

    #[error("unknown strategy {0:?}, expected one of: founder, no-mba, top")]
    UnknownStrategy(String),

    #[error("failed to access plan file {path}, error({source})")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize plan, error({0})")]
    Json(#[from] serde_json::Error),
}
