use crate::error::PortfolioError;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
};
use tracing::{debug, info};

/// Security type code of a common stock.
pub const COMMON_STOCK: &str = "CS";

/// Number of companies kept by [`top_by_market_cap`] in a backtest.
pub const DEFAULT_TOP_K: usize = 600;

lazy_static::lazy_static! {
    /// Primary exchanges a fund may hold: NASDAQ and NYSE.
    pub static ref LISTED_EXCHANGES: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("XNAS");
        set.insert("XNYS");
        set
    };

    /// Tickers whose reported market cap is unreliable; they always rank last.
    pub static ref MARKET_CAP_BLACKLIST: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("CSGP");
        set
    };
}

/// One company on one trading day, as stored in a daily snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerInfo {
    pub ticker: String,
    pub close: f64,
    pub exchange: Option<String>,
    pub cik: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub active: bool,
    pub market_cap: Option<f64>,
}

impl TickerInfo {
    /// An active common stock on NASDAQ.
    pub fn new(ticker: impl Into<String>, close: f64, market_cap: Option<f64>) -> Self {
        Self {
            ticker: ticker.into(),
            close,
            exchange: Some("XNAS".to_string()),
            cik: None,
            kind: Some(COMMON_STOCK.to_string()),
            active: true,
            market_cap,
        }
    }

    pub fn on_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }
}

/// The current CEO of a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ceo {
    pub name: String,
    pub is_founder: bool,
    #[serde(default)]
    pub has_mba: Option<bool>,
}

/// Which companies make it into a fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// CEO founded the company.
    FounderLed,
    /// CEO is known not to hold an MBA.
    NoMba,
    /// Largest companies, regardless of CEO.
    TopMarketCap,
}

impl Strategy {
    pub fn admits(&self, ceo: Option<&Ceo>) -> bool {
        match self {
            Strategy::FounderLed => ceo.is_some_and(|ceo| ceo.is_founder),
            Strategy::NoMba => ceo.is_some_and(|ceo| ceo.has_mba == Some(false)),
            Strategy::TopMarketCap => true,
        }
    }
}

impl FromStr for Strategy {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "founder" | "founder-led" => Ok(Strategy::FounderLed),
            "no-mba" => Ok(Strategy::NoMba),
            "top" | "top-market-cap" => Ok(Strategy::TopMarketCap),
            _ => Err(PortfolioError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::FounderLed => "founder",
            Strategy::NoMba => "no-mba",
            Strategy::TopMarketCap => "top",
        };
        f.write_str(name)
    }
}

/// Listed on NASDAQ or NYSE, and a common stock.
pub fn is_listed_common_stock(info: &TickerInfo) -> bool {
    info.exchange
        .as_deref()
        .is_some_and(|exchange| LISTED_EXCHANGES.contains(exchange))
        && info.kind.as_deref() == Some(COMMON_STOCK)
}

/// The `top_k` largest companies on `exchanges`, largest first.
///
/// A missing market cap, or a ticker in `blacklist`, ranks as a cap of zero. Ties keep
/// their input order.
pub fn top_by_market_cap<'a>(
    infos: &'a [TickerInfo],
    exchanges: &HashSet<&str>,
    blacklist: &HashSet<&str>,
    top_k: usize,
) -> Vec<&'a TickerInfo> {
    let mut ranked: Vec<&TickerInfo> = infos
        .iter()
        .filter(|info| {
            info.exchange
                .as_deref()
                .is_some_and(|exchange| exchanges.contains(exchange))
        })
        .collect();

    ranked.sort_by_key(|info| {
        let cap = match info.market_cap {
            Some(cap) if !blacklist.contains(info.ticker.as_str()) => cap,
            _ => 0.0,
        };
        Reverse(OrderedFloat(cap))
    });
    ranked.truncate(top_k);

    debug!("ranked {} of {} companies by market cap", ranked.len(), infos.len());
    ranked
}

/// Walk `ranked` in order, keeping companies `strategy` admits, until `fund_size` are chosen.
pub fn select(
    ranked: &[&TickerInfo],
    ceos: &HashMap<String, Ceo>,
    strategy: Strategy,
    fund_size: usize,
) -> Vec<TickerInfo> {
    let chosen: Vec<TickerInfo> = ranked
        .iter()
        .filter(|info| strategy.admits(ceos.get(&info.ticker)))
        .take(fund_size)
        .map(|info| (*info).clone())
        .collect();

    info!(
        "selected {} of {} ranked companies with the {strategy} strategy",
        chosen.len(),
        ranked.len()
    );
    chosen
}

/// Tickers whose CEO's founder status differs between two CEO snapshots.
///
/// Tickers missing from either snapshot are ignored.
pub fn founder_flips<'a, I>(
    current: &HashMap<String, Ceo>,
    previous: &HashMap<String, Ceo>,
    tickers: I,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    tickers
        .into_iter()
        .filter_map(|ticker| {
            let now = current.get(ticker)?;
            let then = previous.get(ticker)?;
            if now.is_founder != then.is_founder {
                info!(
                    "[{ticker}] founder status changed: {} -> {} (founder: {})",
                    then.name, now.name, now.is_founder
                );
                Some(ticker.to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ceo(name: &str, is_founder: bool, has_mba: Option<bool>) -> Ceo {
        Ceo {
            name: name.to_string(),
            is_founder,
            has_mba,
        }
    }

    fn market() -> Vec<TickerInfo> {
        vec![
            TickerInfo::new("SMALL", 10.0, Some(1.0e9)),
            TickerInfo::new("AAPL", 220.0, Some(3.3e12)),
            TickerInfo::new("CSGP", 80.0, Some(9.9e12)),
            TickerInfo::new("JPM", 200.0, Some(6.0e11)).on_exchange("XNYS"),
            TickerInfo::new("NOCAP", 5.0, None),
            TickerInfo::new("LSE", 5.0, Some(8.0e12)).on_exchange("XLON"),
            TickerInfo::new("NVDA", 120.0, Some(2.9e12)),
        ]
    }

    #[test]
    fn ranks_by_cap_with_blacklist_last() {
        let infos = market();
        let ranked = top_by_market_cap(&infos, &LISTED_EXCHANGES, &MARKET_CAP_BLACKLIST, 10);
        let tickers: Vec<&str> = ranked.iter().map(|info| info.ticker.as_str()).collect();

        // CSGP and NOCAP rank as zero and keep their input order; LSE is off-exchange
        assert_eq!(tickers, vec!["AAPL", "NVDA", "JPM", "SMALL", "CSGP", "NOCAP"]);
    }

    #[test]
    fn top_k_truncates() {
        let infos = market();
        let ranked = top_by_market_cap(&infos, &LISTED_EXCHANGES, &MARKET_CAP_BLACKLIST, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].ticker, "NVDA");
    }

    #[test]
    fn listed_common_stock() {
        let mut fund = TickerInfo::new("SPY", 500.0, None).on_exchange("XNYS");
        assert!(is_listed_common_stock(&fund));
        fund.kind = Some("ETF".to_string());
        assert!(!is_listed_common_stock(&fund));
        assert!(!is_listed_common_stock(&TickerInfo::new("LSE", 5.0, None).on_exchange("XLON")));
    }

    #[test]
    fn selection_stops_at_fund_size() {
        let infos = market();
        let ranked = top_by_market_cap(&infos, &LISTED_EXCHANGES, &MARKET_CAP_BLACKLIST, 10);
        let ceos: HashMap<String, Ceo> = [
            ("AAPL", ceo("Tim Cook", false, Some(true))),
            ("NVDA", ceo("Jensen Huang", true, Some(false))),
            ("JPM", ceo("Jamie Dimon", false, Some(true))),
            ("SMALL", ceo("A Founder", true, None)),
            ("CSGP", ceo("Andrew Florance", true, Some(false))),
        ]
        .into_iter()
        .map(|(ticker, ceo)| (ticker.to_string(), ceo))
        .collect();

        let founders = select(&ranked, &ceos, Strategy::FounderLed, 2);
        let tickers: Vec<&str> = founders.iter().map(|info| info.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["NVDA", "SMALL"]);

        let no_mba = select(&ranked, &ceos, Strategy::NoMba, 10);
        let tickers: Vec<&str> = no_mba.iter().map(|info| info.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["NVDA", "CSGP"]);

        let top = select(&ranked, &ceos, Strategy::TopMarketCap, 3);
        let tickers: Vec<&str> = top.iter().map(|info| info.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "NVDA", "JPM"]);
    }

    #[test]
    fn strategy_names() {
        assert_eq!("founder".parse::<Strategy>().unwrap(), Strategy::FounderLed);
        assert_eq!("No-MBA".parse::<Strategy>().unwrap(), Strategy::NoMba);
        assert_eq!("top".parse::<Strategy>().unwrap(), Strategy::TopMarketCap);
        assert!(matches!(
            "value".parse::<Strategy>(),
            Err(PortfolioError::UnknownStrategy(name)) if name == "value"
        ));
        assert_eq!(Strategy::NoMba.to_string(), "no-mba");
    }

    #[test]
    fn founder_flips_between_snapshots() {
        let previous: HashMap<String, Ceo> = [
            ("AAPL".to_string(), ceo("Steve Jobs", true, None)),
            ("NVDA".to_string(), ceo("Jensen Huang", true, None)),
        ]
        .into_iter()
        .collect();
        let current: HashMap<String, Ceo> = [
            ("AAPL".to_string(), ceo("Tim Cook", false, None)),
            ("NVDA".to_string(), ceo("Jensen Huang", true, None)),
            ("NEW".to_string(), ceo("Someone", true, None)),
        ]
        .into_iter()
        .collect();

        let flips = founder_flips(&current, &previous, ["AAPL", "NVDA", "NEW"]);
        assert_eq!(flips, vec!["AAPL".to_string()]);
    }

    #[test]
    fn ticker_info_reads_snapshot_rows() {
        let row = r#"{"ticker":"AAPL","close":220.5,"exchange":"XNAS","cik":"0000320193",
            "type":"CS","active":true,"market_cap":3.3e12}"#;
        let info: TickerInfo = serde_json::from_str(row).unwrap();
        assert_eq!(info.kind.as_deref(), Some("CS"));
        assert!(is_listed_common_stock(&info));
    }
}
