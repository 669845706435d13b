use crate::config::{FundConfig, SourceUrls};
use chrono::NaiveDate;
use fund_portfolio::{selection::is_listed_common_stock, TickerInfo};
use fund_spider::{
    api, concurrent::fetch_concurrent, dates::date_range, store::JsonFile, BulkFetcher,
    FetchError, RateLimiter, ResultStore, Retrier, WorkItem,
};
use serde::Deserialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

/// Store id of the daily snapshot collection; lands at `{STORE_DIR}/snapshots.json`.
pub(crate) const STORE_ID: &str = "snapshots";

/// Store id of the tickers never looked up again, with the reason they were dropped.
pub(crate) const BLACKLIST_ID: &str = "blacklist";

const NO_REFERENCE: &str = "no reference data";
const NOT_LISTED: &str = "not a listed common stock";

/// Where daily closes and per-ticker reference data come from.
pub(crate) trait SnapshotSource {
    /// Every ticker's close on `day`; empty when the market was shut.
    async fn closes(&self, day: NaiveDate) -> Result<Vec<(String, f64)>, FetchError>;

    /// Reference data for `ticker` as of `day`, or `None` if the source knows nothing of it.
    async fn reference(
        &self,
        ticker: &str,
        close: f64,
        day: NaiveDate,
    ) -> Result<Option<TickerInfo>, FetchError>;
}

/// A REST source answering the grouped daily and ticker reference endpoints.
pub(crate) struct HttpSource {
    client: reqwest::Client,
    urls: SourceUrls,
}

impl HttpSource {
    pub fn new(urls: SourceUrls) -> Result<Self, FetchError> {
        Ok(Self {
            client: api::build_client()?,
            urls,
        })
    }
}

#[derive(Deserialize)]
struct Grouped {
    #[serde(default)]
    results: Vec<Close>,
}

#[derive(Deserialize)]
struct Close {
    #[serde(rename = "T")]
    ticker: String,
    #[serde(rename = "c")]
    close: f64,
}

#[derive(Deserialize)]
struct Reference {
    results: Option<Details>,
}

#[derive(Deserialize)]
struct Details {
    ticker: String,
    primary_exchange: Option<String>,
    cik: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    active: bool,
    market_cap: Option<f64>,
}

impl SnapshotSource for HttpSource {
    async fn closes(&self, day: NaiveDate) -> Result<Vec<(String, f64)>, FetchError> {
        let url = self.urls.closes.replace("{date}", &day.key());
        let grouped: Grouped = api::get_json(&self.client, &url).await?;
        Ok(grouped
            .results
            .into_iter()
            .map(|close| (close.ticker, close.close))
            .collect())
    }

    async fn reference(
        &self,
        ticker: &str,
        close: f64,
        day: NaiveDate,
    ) -> Result<Option<TickerInfo>, FetchError> {
        let url = self
            .urls
            .reference
            .replace("{ticker}", ticker)
            .replace("{date}", &day.key());
        let reference: Reference = match api::get_json(&self.client, &url).await {
            Ok(reference) => reference,
            Err(FetchError::Status { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(reference.results.map(|details| TickerInfo {
            ticker: details.ticker,
            close,
            exchange: details.primary_exchange,
            cik: details.cik,
            kind: details.kind,
            active: details.active,
            market_cap: details.market_cap,
        }))
    }
}

/// What a collection run did.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Collection {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
    pub blacklisted: usize,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "snapshots: {} fetched, {} already stored, {} tickers blacklisted",
            self.fetched, self.skipped, self.blacklisted
        )?;
        if !self.failed.is_empty() {
            write!(f, "\nno snapshot yet for {}", self.failed.join(", "))?;
        }
        Ok(())
    }
}

pub(crate) async fn collect(config: &FundConfig, urls: &SourceUrls, tui: bool) -> anyhow::Result<Collection> {
    let source = HttpSource::new(urls.clone())?;
    collect_from(&source, config, tui).await
}

/// Fetch every daily snapshot from the start to the end date that the store does not
/// already hold.
///
/// Each day takes the day's closes, drops blacklisted tickers, then looks the rest up
/// concurrently. Tickers without reference data, or that are not common stock on a listed
/// exchange, join the blacklist and are never looked up again, on any day or any run. A day
/// with a failed lookup is left out of the store for the next run.
pub(crate) async fn collect_from<S: SnapshotSource>(
    source: &S,
    config: &FundConfig,
    tui: bool,
) -> anyhow::Result<Collection> {
    let time = std::time::Instant::now();
    let days = date_range(&config.start_date.key(), &config.end_date.key())?;

    let backend = &JsonFile::new(config.spider.store_dir.clone());
    let limiter = &config.spider.rate_limiter()?;
    let retrier = &config.spider.retrier()?;
    let concurrency = config.spider.concurrent_requests;
    let blacklist = &Mutex::new(ResultStore::<String>::load(backend, BLACKLIST_ID)?);

    let fetcher = BulkFetcher::new(backend, config.spider.fetch_config(tui))?;
    let report = fetcher
        .run(STORE_ID, days, |day| async move {
            snapshot(source, day, limiter, retrier, concurrency, blacklist, backend).await
        })
        .await?;

    let blacklist = lock(blacklist)?;
    blacklist.flush(backend)?;

    let collection = Collection {
        fetched: report.fetched,
        skipped: report.skipped,
        failed: report.failed.into_iter().map(|(day, _)| day).collect(),
        blacklisted: blacklist.len(),
    };
    if !collection.failed.is_empty() {
        warn!(
            "{} days have no snapshot yet: {:?}",
            collection.failed.len(),
            collection.failed
        );
    }
    info!("{collection}. {}", fund_spider::time_elapsed(time));
    Ok(collection)
}

/// One day's listed common stocks.
async fn snapshot<S: SnapshotSource>(
    source: &S,
    day: NaiveDate,
    limiter: &RateLimiter,
    retrier: &Retrier,
    concurrency: usize,
    blacklist: &Mutex<ResultStore<String>>,
    backend: &JsonFile,
) -> Result<Vec<TickerInfo>, FetchError> {
    let closes = retrier
        .run(|| async move {
            limiter.guard().await;
            source.closes(day).await
        })
        .await?;

    let pending: Vec<(String, f64)> = {
        let blacklist = lock(blacklist)?;
        closes
            .into_iter()
            .filter(|(ticker, _)| !blacklist.contains(ticker))
            .collect()
    };
    debug!("[{}] looking up {} tickers", day.key(), pending.len());

    let results = fetch_concurrent(pending, concurrency, limiter, retrier, |(ticker, close)| async move {
        source.reference(&ticker, close, day).await
    })
    .await;

    let mut listed = Vec::new();
    let mut failure = None;
    {
        let mut blacklist = lock(blacklist)?;
        for ((ticker, _), result) in results {
            match result {
                Ok(Some(info)) if is_listed_common_stock(&info) => listed.push(info),
                Ok(Some(_)) => {
                    trace!("[{ticker}] blacklisted, {NOT_LISTED}");
                    blacklist.insert(ticker, NOT_LISTED.to_string());
                }
                Ok(None) => {
                    trace!("[{ticker}] blacklisted, {NO_REFERENCE}");
                    blacklist.insert(ticker, NO_REFERENCE.to_string());
                }
                Err(err) => {
                    warn!("failed to look up [{ticker}] on {}, error({err})", day.key());
                    failure.get_or_insert(err);
                }
            }
        }
        blacklist
            .flush(backend)
            .map_err(|err| FetchError::Other(err.into()))?;
    }

    if let Some(err) = failure {
        return Err(err);
    }
    listed.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Ok(listed)
}

fn lock(blacklist: &Mutex<ResultStore<String>>) -> Result<MutexGuard<'_, ResultStore<String>>, FetchError> {
    blacklist
        .lock()
        .map_err(|err| FetchError::Other(anyhow::anyhow!("blacklist lock poisoned, error({err})")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lookup;
    use std::collections::{BTreeMap, HashMap};

    /// Four tickers trade every day; only AAPL is a listed common stock.
    #[derive(Default)]
    struct FakeSource {
        lookups: Mutex<HashMap<String, usize>>,
        failing: Option<&'static str>,
    }

    impl FakeSource {
        fn lookups(&self, ticker: &str) -> usize {
            self.lookups.lock().unwrap().get(ticker).copied().unwrap_or(0)
        }
    }

    impl SnapshotSource for FakeSource {
        async fn closes(&self, day: NaiveDate) -> Result<Vec<(String, f64)>, FetchError> {
            let base = day.format("%d").to_string().parse::<f64>().unwrap();
            Ok(["AAPL", "SPY", "GONE", "OTCX"]
                .into_iter()
                .map(|ticker| (ticker.to_string(), base))
                .collect())
        }

        async fn reference(
            &self,
            ticker: &str,
            close: f64,
            _day: NaiveDate,
        ) -> Result<Option<TickerInfo>, FetchError> {
            *self.lookups.lock().unwrap().entry(ticker.to_string()).or_default() += 1;
            if self.failing == Some(ticker) {
                return Err(FetchError::Status {
                    status: 500,
                    url: format!("https://api.example.com/{ticker}"),
                });
            }
            Ok(match ticker {
                "AAPL" => Some(TickerInfo::new("AAPL", close, Some(3.4e12))),
                "SPY" => Some(TickerInfo {
                    kind: Some("ETF".to_string()),
                    ..TickerInfo::new("SPY", close, None)
                }),
                "OTCX" => Some(TickerInfo::new("OTCX", close, Some(1e6)).on_exchange("OTC")),
                _ => None,
            })
        }
    }

    fn config(dir: &std::path::Path, start: &str, end: &str) -> FundConfig {
        let dir = dir.display().to_string();
        FundConfig::from_lookup(lookup(&[
            ("STORE_DIR", dir.as_str()),
            ("CALLS_PER_SECOND", "1000"),
            ("START_DATE", start),
            ("END_DATE", end),
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn blacklist_carries_across_days_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::default();

        let collection = collect_from(&source, &config(dir.path(), "2024-10-07", "2024-10-08"), false)
            .await
            .unwrap();
        assert_eq!(collection.fetched, 2);
        assert_eq!(collection.blacklisted, 3);
        assert_eq!(source.lookups("AAPL"), 2);
        for ticker in ["SPY", "GONE", "OTCX"] {
            assert_eq!(source.lookups(ticker), 1, "{ticker} looked up again");
        }

        // a later run skips stored days and still honours the blacklist
        let collection = collect_from(&source, &config(dir.path(), "2024-10-07", "2024-10-09"), false)
            .await
            .unwrap();
        assert_eq!(collection.fetched, 1);
        assert_eq!(collection.skipped, 2);
        assert_eq!(source.lookups("AAPL"), 3);
        assert_eq!(source.lookups("GONE"), 1);

        let backend = JsonFile::new(dir.path());
        let blacklist = ResultStore::<String>::load(&backend, BLACKLIST_ID).unwrap();
        assert_eq!(blacklist.get("GONE").map(String::as_str), Some(NO_REFERENCE));
        assert_eq!(blacklist.get("SPY").map(String::as_str), Some(NOT_LISTED));
        assert_eq!(blacklist.get("OTCX").map(String::as_str), Some(NOT_LISTED));

        let snapshots: BTreeMap<String, Vec<TickerInfo>> =
            serde_json::from_slice(&std::fs::read(backend.path(STORE_ID)).unwrap()).unwrap();
        assert_eq!(snapshots.len(), 3);
        let tickers: Vec<&str> = snapshots
            .values()
            .flatten()
            .map(|info| info.ticker.as_str())
            .collect();
        assert_eq!(tickers, ["AAPL", "AAPL", "AAPL"]);
        assert_eq!(snapshots["2024-10-09"][0].close, 9.0);
    }

    #[tokio::test]
    async fn failed_lookup_leaves_the_day_for_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            failing: Some("AAPL"),
            ..FakeSource::default()
        };

        let collection = collect_from(&source, &config(dir.path(), "2024-10-07", "2024-10-07"), false)
            .await
            .unwrap();
        assert_eq!(collection.fetched, 0);
        assert_eq!(collection.failed, ["2024-10-07"]);
        // the rest of the day's verdicts are kept
        assert_eq!(collection.blacklisted, 3);
        assert!(collection.to_string().ends_with("no snapshot yet for 2024-10-07"));
    }
}
