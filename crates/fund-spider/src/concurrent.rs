use crate::error::FetchError;
use crate::rate_limit::RateLimiter;
use crate::retry::Retrier;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Fetch every key with at most `max_in_flight` outbound calls running at once.
///
/// Each attempt (retries included) takes a semaphore permit, then passes the shared
/// `limiter`, then calls `fetch`; the `retrier` wraps the whole attempt, so backoff sleeps
/// hold no permit. Results are returned keyed, in completion order.
pub async fn fetch_concurrent<K, V, F, Fut>(
    keys: Vec<K>,
    max_in_flight: usize,
    limiter: &RateLimiter,
    retrier: &Retrier,
    fetch: F,
) -> Vec<(K, Result<V, FetchError>)>
where
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, FetchError>>,
{
    let time = std::time::Instant::now();
    let total = keys.len();
    let semaphore = &Semaphore::new(max_in_flight.max(1));
    let fetch = &fetch;

    let results: Vec<(K, Result<V, FetchError>)> = keys
        .into_iter()
        .map(|key| async move {
            let result = retrier
                .run(|| {
                    let key = key.clone();
                    async move {
                        let _permit = semaphore
                            .acquire()
                            .await
                            .map_err(|err| FetchError::Other(err.into()))?;
                        limiter.guard().await;
                        fetch(key).await
                    }
                })
                .await;
            (key, result)
        })
        .collect::<FuturesUnordered<_>>()
        .collect()
        .await;

    let failures = results.iter().filter(|(_, result)| result.is_err()).count();
    trace!("{failures} of {total} concurrent fetches failed");
    debug!(
        "{total} keys fetched concurrently. {}",
        crate::time_elapsed(time)
    );
    results
}
