use anyhow::Context;
use chrono::NaiveDate;
use fund_portfolio::{Strategy, DEFAULT_MAX_WEIGHT};
use fund_spider::{dates::parse_date, SpiderConfig};
use std::str::FromStr;
use tracing::debug;

/// Everything a backtest run reads from the environment (and `.env`).
#[derive(Debug, Clone)]
pub(crate) struct FundConfig {
    pub spider: SpiderConfig,
    pub strategy: Strategy,
    pub max_weight: f64,
    pub fund_size: usize,
    pub top_k: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// Rank on the end date's market caps instead of the start date's.
    pub prospective: bool,

    /// `date -> [ticker info]` snapshots, as the snapshot store writes them.
    pub snapshot_path: String,

    /// Where snapshots are collected from; nothing is collected unless both are set.
    pub source: Option<SourceUrls>,

    pub ceo_path: String,
    pub previous_ceo_path: Option<String>,
    pub plan_path: String,
    pub fund_amount: f64,
    pub whole_shares: Vec<String>,
}

/// Endpoint templates of a snapshot source.
#[derive(Debug, Clone)]
pub(crate) struct SourceUrls {
    /// Every ticker's close on one day, with `{date}` in place of the day.
    pub closes: String,

    /// One ticker's reference data, with `{ticker}` and `{date}` placeholders.
    pub reference: String,
}

impl FundConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let spider = SpiderConfig::from_lookup(&lookup)?;
        let snapshot_path = lookup("SNAPSHOT_PATH").unwrap_or_else(|| {
            spider
                .store_dir
                .join("snapshots.json")
                .display()
                .to_string()
        });

        let source = match (lookup("SNAPSHOT_URL"), lookup("REFERENCE_URL")) {
            (Some(closes), Some(reference)) => Some(SourceUrls { closes, reference }),
            (None, None) => None,
            _ => anyhow::bail!("SNAPSHOT_URL and REFERENCE_URL must be set together"),
        };

        let config = Self {
            strategy: parse(&lookup, "STRATEGY", Strategy::FounderLed)?,
            max_weight: parse(&lookup, "MAX_WEIGHT", DEFAULT_MAX_WEIGHT)?,
            fund_size: parse(&lookup, "FUND_SIZE", 20)?,
            top_k: parse(&lookup, "TOP_K", fund_portfolio::selection::DEFAULT_TOP_K)?,
            start_date: date(&lookup, "START_DATE", "2024-08-27")?,
            end_date: date(&lookup, "END_DATE", "2024-12-05")?,
            prospective: parse(&lookup, "PROSPECTIVE", false)?,
            snapshot_path,
            source,
            ceo_path: lookup("CEO_PATH").unwrap_or_else(|| "./buffer/ceos.json".to_string()),
            previous_ceo_path: lookup("PREVIOUS_CEO_PATH"),
            plan_path: lookup("PLAN_PATH").unwrap_or_else(|| "./portfolio.json".to_string()),
            fund_amount: parse(&lookup, "FUND_AMOUNT", 10_000.0)?,
            whole_shares: lookup("WHOLE_SHARES")
                .map(|tickers| {
                    tickers
                        .split(',')
                        .map(|ticker| ticker.trim().to_string())
                        .filter(|ticker| !ticker.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            spider,
        };

        if config.end_date < config.start_date {
            anyhow::bail!(
                "END_DATE ({}) is before START_DATE ({})",
                config.end_date,
                config.start_date
            );
        }
        debug!("fund configuration read: {config:?}");
        Ok(config)
    }

    /// The date whose market caps rank the fund.
    pub fn ranking_date(&self) -> NaiveDate {
        if self.prospective {
            self.end_date
        } else {
            self.start_date
        }
    }
}

fn parse<T, F>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {name} {value:?}, error({err})")),
        None => Ok(default),
    }
}

fn date<F>(lookup: &F, name: &str, default: &str) -> anyhow::Result<NaiveDate>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    parse_date(&value).with_context(|| format!("invalid {name} {value:?}, expected YYYY-MM-DD"))
}

#[cfg(test)]
pub(crate) fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}
