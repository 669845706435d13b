pub mod error;

/// Holdings and the daily close snapshots they are priced against.
pub mod holding;

/// Market-cap weights with a per-holding cap.
pub mod weights;

/// Period returns of weighted and quantity-based portfolios.
pub mod returns;

/// Ranking the market and picking a fund by CEO traits.
pub mod selection;

/// Turning weights into share quantities.
pub mod orders;

/// The `{ticker: weight}` execution plan file.
pub mod plan;

pub use error::PortfolioError;
pub use holding::{Holding, Snapshot};
pub use orders::{size_orders, Order, OrderPlan};
pub use plan::{read_plan, write_plan};
pub use returns::{compute_return, quantity_return, Performance, QuantityReturn};
pub use selection::{Ceo, Strategy, TickerInfo};
pub use weights::{cap_weights, CappedWeights, DEFAULT_MAX_WEIGHT};
