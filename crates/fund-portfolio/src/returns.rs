use crate::error::PortfolioError;
use crate::holding::{Holding, Snapshot};
use crate::weights::{cap_weights, CappedWeights};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The outcome of pricing a capped-weight fund over one period.
#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    /// Fractional return, e.g. `0.125` for +12.5%.
    pub total_return: f64,

    pub weights: CappedWeights,

    /// Tickers left out of the return because a snapshot had no close for them. Their
    /// weight is dropped, not redistributed.
    pub skipped: Vec<String>,
}

impl Performance {
    pub fn percent(&self) -> f64 {
        self.total_return * 100.0
    }
}

/// Weight `holdings` by capped market cap and compute the fund's return over the period.
///
/// ```rust
/// use fund_portfolio::{compute_return, Holding};
///
/// let holdings = vec![
///     Holding::new("X", 1.0).with_closes(Some(100.0), Some(110.0)),
///     Holding::new("Y", 1.0).with_closes(Some(50.0), Some(45.0)),
/// ];
/// let performance = compute_return(&holdings, 0.5).unwrap();
/// assert!(performance.total_return.abs() < 1e-12);
/// ```
pub fn compute_return(holdings: &[Holding], max_weight: f64) -> Result<Performance, PortfolioError> {
    let weights = cap_weights(
        holdings
            .iter()
            .map(|holding| (holding.ticker.as_str(), holding.market_cap)),
        max_weight,
    )?;

    let mut total_return = 0.0;
    let mut skipped = Vec::new();
    for holding in holdings {
        match holding.period_return() {
            Some(period_return) => {
                let weight = weights.get(&holding.ticker).unwrap_or(0.0);
                total_return += weight * period_return;
            }
            None => {
                warn!("[{}] not found in both snapshots; skipping", holding.ticker);
                skipped.push(holding.ticker.clone());
            }
        }
    }

    debug!(
        "fund of {} returned {:.2}% ({} skipped)",
        holdings.len(),
        total_return * 100.0,
        skipped.len()
    );
    Ok(Performance {
        total_return,
        weights,
        skipped,
    })
}

/// Return of a fixed-quantity portfolio, and the tickers that could not be priced.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityReturn {
    pub total_return: f64,
    pub skipped: Vec<String>,
}

/// `(end_value - start_value) / start_value` for `ticker -> quantity` positions.
///
/// Positions missing from either snapshot are skipped and reported.
pub fn quantity_return(
    positions: &BTreeMap<String, f64>,
    start: &Snapshot,
    end: &Snapshot,
) -> Result<QuantityReturn, PortfolioError> {
    let mut start_value = 0.0;
    let mut end_value = 0.0;
    let mut skipped = Vec::new();

    for (ticker, qty) in positions {
        match (start.close(ticker), end.close(ticker)) {
            (Some(start_close), Some(end_close)) => {
                start_value += qty * start_close;
                end_value += qty * end_close;
            }
            _ => {
                warn!("[{ticker}] not found in both snapshots; skipping");
                skipped.push(ticker.clone());
            }
        }
    }

    if start_value == 0.0 {
        return Err(PortfolioError::ZeroStartValue);
    }

    Ok(QuantityReturn {
        total_return: (end_value - start_value) / start_value,
        skipped,
    })
}
