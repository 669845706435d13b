use crate::holding::Snapshot;
use crate::weights::CappedWeights;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// A buy order for `qty` shares of `ticker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub ticker: String,
    pub qty: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPlan {
    pub orders: Vec<Order>,

    /// Tickers with no close to size against.
    pub skipped: Vec<String>,
}

impl OrderPlan {
    /// Cost of the plan at the closes it was sized against.
    pub fn cost(&self, closes: &Snapshot) -> f64 {
        self.orders
            .iter()
            .filter_map(|order| closes.close(&order.ticker).map(|close| close * order.qty))
            .sum()
    }
}

/// Split `amount` across `weights` at the given closes: `qty = amount * weight / close`.
///
/// Tickers in `whole_shares` cannot be bought fractionally and are truncated to whole
/// shares. Orders with no quantity left are dropped.
pub fn size_orders(
    weights: &CappedWeights,
    closes: &Snapshot,
    amount: f64,
    whole_shares: &[&str],
) -> OrderPlan {
    let mut plan = OrderPlan::default();

    for (ticker, weight) in weights.iter() {
        let close = match closes.close(ticker) {
            Some(close) if close > 0.0 => close,
            _ => {
                warn!("[{ticker}] has no close to size an order against; skipping");
                plan.skipped.push(ticker.to_string());
                continue;
            }
        };

        let mut qty = amount * weight / close;
        if whole_shares.contains(&ticker) {
            qty = qty.trunc();
        }
        if qty > 0.0 {
            trace!("[{ticker}] {qty:.4} shares at {close}");
            plan.orders.push(Order {
                ticker: ticker.to_string(),
                qty,
            });
        }
    }

    plan
}
