use crate::error::PortfolioError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Largest weight any single holding may be given.
pub const DEFAULT_MAX_WEIGHT: f64 = 0.24;

/// How far the weights may drift from summing to 1 before they are rescaled.
pub const TOLERANCE: f64 = 0.001;

/// Final fund weights, `ticker -> fraction`. Serializes as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CappedWeights(BTreeMap<String, f64>);

impl CappedWeights {
    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(ticker, weight)| (ticker.as_str(), *weight))
    }
}

impl From<BTreeMap<String, f64>> for CappedWeights {
    fn from(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }
}

/// Market-cap weights, with every weight above `max_weight` pinned to it.
///
/// 1. raw weight = market cap / total market cap;
/// 2. raw weights above `max_weight` are set to `max_weight`, the excess pooled;
/// 3. the pool is shared among the uncapped holdings in proportion to their raw weight
///    (`w = raw + raw / uncapped_total * excess`). When nothing uncapped carries weight,
///    the capped weights are instead normalised to sum to 1;
/// 4. if the sum is then more than [`TOLERANCE`] from 1, every weight is rescaled.
///
/// Capping is a single pass: an uncapped holding pushed over `max_weight` by the
/// redistribution is not capped again.
///
/// ```rust
/// use fund_portfolio::cap_weights;
///
/// let weights = cap_weights([("A", 60.0), ("B", 20.0), ("C", 20.0)], 0.24).unwrap();
/// assert!((weights.get("A").unwrap() - 0.24).abs() < 1e-9);
/// assert!((weights.get("B").unwrap() - 0.38).abs() < 1e-9);
/// assert!((weights.total() - 1.0).abs() < 1e-9);
/// ```
pub fn cap_weights<'a, I>(basis: I, max_weight: f64) -> Result<CappedWeights, PortfolioError>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    if !(max_weight > 0.0 && max_weight <= 1.0) {
        return Err(PortfolioError::InvalidMaxWeight(max_weight));
    }

    let mut seen = HashSet::new();
    let mut caps: Vec<(&str, f64)> = Vec::new();
    for (ticker, market_cap) in basis {
        if !market_cap.is_finite() || market_cap < 0.0 {
            return Err(PortfolioError::InvalidMarketCap {
                ticker: ticker.to_string(),
                value: market_cap,
            });
        }
        if !seen.insert(ticker) {
            return Err(PortfolioError::DuplicateTicker(ticker.to_string()));
        }
        caps.push((ticker, market_cap));
    }
    if caps.is_empty() {
        return Err(PortfolioError::Empty);
    }

    let total: f64 = caps.iter().map(|(_, cap)| cap).sum();
    if !(total > 0.0) {
        return Err(PortfolioError::NonPositiveTotal(total));
    }

    // cap
    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    let mut uncapped: Vec<(&str, f64)> = Vec::new();
    let mut excess = 0.0;
    for (ticker, cap) in &caps {
        let raw = cap / total;
        if raw > max_weight {
            trace!("[{ticker}] raw weight {raw:.4} capped at {max_weight}");
            excess += raw - max_weight;
            weights.insert(ticker.to_string(), max_weight);
        } else {
            uncapped.push((ticker, raw));
            weights.insert(ticker.to_string(), raw);
        }
    }

    // redistribute
    let uncapped_total: f64 = uncapped.iter().map(|(_, raw)| raw).sum();
    if uncapped_total > 0.0 {
        for (ticker, raw) in &uncapped {
            weights.insert(ticker.to_string(), raw + raw / uncapped_total * excess);
        }
    } else {
        debug!("no uncapped weight to redistribute to; normalising the capped weights");
        rescale(&mut weights);
    }

    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > TOLERANCE {
        debug!("weights sum to {sum:.6}; rescaling");
        rescale(&mut weights);
    }

    Ok(CappedWeights(weights))
}

fn rescale(weights: &mut BTreeMap<String, f64>) {
    let sum: f64 = weights.values().sum();
    if sum > 0.0 {
        weights.values_mut().for_each(|weight| *weight /= sum);
    }
}
