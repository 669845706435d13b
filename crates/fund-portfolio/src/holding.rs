use crate::selection::TickerInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One position of a fund: its weight basis and the closes bracketing the period.
///
/// A missing close means the ticker was absent from that day's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub market_cap: f64,
    pub start_close: Option<f64>,
    pub end_close: Option<f64>,
}

impl Holding {
    pub fn new(ticker: impl Into<String>, market_cap: f64) -> Self {
        Self {
            ticker: ticker.into(),
            market_cap,
            start_close: None,
            end_close: None,
        }
    }

    pub fn with_closes(mut self, start_close: Option<f64>, end_close: Option<f64>) -> Self {
        self.start_close = start_close;
        self.end_close = end_close;
        self
    }

    /// `(end - start) / start`, if both closes are known and the start is positive.
    pub fn period_return(&self) -> Option<f64> {
        match (self.start_close, self.end_close) {
            (Some(start), Some(end)) if start > 0.0 => Some((end - start) / start),
            _ => None,
        }
    }
}

/// Closing prices for one trading day, `ticker -> close`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(HashMap<String, f64>);

impl Snapshot {
    pub fn close(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Price `selected` companies over the period from `start` to `end`.
    ///
    /// Companies without a market cap cannot be weighted and are left out, with a warning.
    pub fn holdings(selected: &[TickerInfo], start: &Snapshot, end: &Snapshot) -> Vec<Holding> {
        selected
            .iter()
            .filter_map(|info| match info.market_cap {
                Some(market_cap) => Some(
                    Holding::new(&info.ticker, market_cap)
                        .with_closes(start.close(&info.ticker), end.close(&info.ticker)),
                ),
                None => {
                    warn!("[{}] has no market cap; leaving it out of the fund", info.ticker);
                    None
                }
            })
            .collect()
    }
}

impl From<HashMap<String, f64>> for Snapshot {
    fn from(closes: HashMap<String, f64>) -> Self {
        Self(closes)
    }
}

impl<'a> FromIterator<&'a TickerInfo> for Snapshot {
    fn from_iter<T: IntoIterator<Item = &'a TickerInfo>>(infos: T) -> Self {
        Self(
            infos
                .into_iter()
                .map(|info| (info.ticker.clone(), info.close))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(closes: T) -> Self {
        Self(
            closes
                .into_iter()
                .map(|(ticker, close)| (ticker.into(), close))
                .collect(),
        )
    }
}
