use crate::error::{ConfigError, FetchError, SpiderError};
use crate::store::{Backend, ResultStore};
use crate::tui::Progress;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error, info, trace};

/// One unit of fetch work, identified by a key that is unique within a run.
pub trait WorkItem {
    fn key(&self) -> String;
}

impl WorkItem for String {
    fn key(&self) -> String {
        self.clone()
    }
}

impl WorkItem for &str {
    fn key(&self) -> String {
        self.to_string()
    }
}

/// Daily snapshots are keyed by ISO date, e.g. `2024-08-27`.
impl WorkItem for NaiveDate {
    fn key(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

/// A listed company; the most common work item, keyed by ticker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub ticker: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cik: Option<String>,
}

impl Company {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            title: None,
            cik: None,
        }
    }
}

impl WorkItem for Company {
    fn key(&self) -> String {
        self.ticker.clone()
    }
}

/// The tagged result of one `fetch_one` call, as the fetcher sees it.
#[derive(Debug)]
pub enum Outcome<V> {
    Success(V),
    Failure(FetchError),
}

impl<V> From<Result<V, FetchError>> for Outcome<V> {
    fn from(result: Result<V, FetchError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Flush the store after this many new results.
    pub save_every: usize,

    /// Draw progress bars instead of relying on the trace output.
    pub tui: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            save_every: 5,
            tui: false,
        }
    }
}

/// What a finished run did.
#[derive(Debug)]
pub struct FetchReport<V> {
    pub store: ResultStore<V>,

    /// Keys fetched and recorded by this run.
    pub fetched: usize,

    /// Keys already in the store when the run reached them.
    pub skipped: usize,

    /// Keys whose fetch failed, with the error message; absent from the store.
    pub failed: Vec<(String, String)>,

    /// Number of times the store was written.
    pub flushes: usize,
}

/// Drives a caller-supplied `fetch_one` over a list of work items, checkpointing into a
/// [`ResultStore`] so an interrupted or partially failed job can simply be run again.
///
/// - items are visited in input order; keys already in the store are skipped;
/// - every success is recorded, and the store is flushed after each `save_every` of them;
/// - a failed key is logged and left out of the store, so the next run retries it;
/// - the store is flushed once more when the items run out.
///
/// A run killed mid-way loses at most `save_every - 1` results. Store failures end the run,
/// as does [`FetchError::RetriesExhausted`]: the upstream has stopped accepting calls, so the
/// store is flushed and the error returned instead of burning through the remaining keys.
pub struct BulkFetcher<B> {
    backend: B,
    config: FetchConfig,
}

impl<B: Backend> BulkFetcher<B> {
    pub fn new(backend: B, config: FetchConfig) -> Result<Self, ConfigError> {
        if config.save_every == 0 {
            return Err(ConfigError::NotPositive { name: "save_every" });
        }
        Ok(Self { backend, config })
    }

    pub async fn run<I, V, F, Fut>(
        &self,
        store_id: &str,
        items: Vec<I>,
        mut fetch_one: F,
    ) -> Result<FetchReport<V>, SpiderError>
    where
        I: WorkItem,
        V: Serialize + DeserializeOwned,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let time = std::time::Instant::now();
        let mut store: ResultStore<V> = ResultStore::load(&self.backend, store_id)?;
        info!(
            "running {store_id} over {} items, {} already stored",
            items.len(),
            store.len()
        );

        let progress = Progress::new(items.len(), self.config.tui);
        let mut report = FetchReport {
            store: ResultStore::new(store_id),
            fetched: 0,
            skipped: 0,
            failed: Vec::new(),
            flushes: 0,
        };

        let mut count = 0;
        for item in items {
            let key = item.key();
            progress.step();

            if store.contains(&key) {
                trace!("[{key}] already stored; skipping");
                report.skipped += 1;
                continue;
            }

            match Outcome::from(fetch_one(item).await) {
                Outcome::Success(value) => {
                    store.insert(key.clone(), value);
                    progress.succeed();
                    trace!("[{key}] fetched");
                    report.fetched += 1;

                    count += 1;
                    if count == self.config.save_every {
                        store.flush(&self.backend)?;
                        report.flushes += 1;
                        count = 0;
                    }
                }
                Outcome::Failure(err @ FetchError::RetriesExhausted { .. }) => {
                    error!("[{key}] retries exhausted; aborting {store_id}, error({err})");
                    progress.fail();
                    progress.finish();
                    store.flush(&self.backend)?;
                    return Err(SpiderError::Aborted { key, source: err });
                }
                Outcome::Failure(err) => {
                    error!("failed to fetch [{key}], error({err:?})");
                    progress.fail();
                    report.failed.push((key, err.to_string()));
                }
            }
        }

        store.flush(&self.backend)?;
        report.flushes += 1;
        progress.finish();

        debug!(
            "{store_id} finished; {} fetched, {} skipped, {} failed. {}",
            report.fetched,
            report.skipped,
            report.failed.len(),
            crate::time_elapsed(time)
        );
        report.store = store;
        Ok(report)
    }
}
