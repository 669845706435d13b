use crate::config::FundConfig;
use anyhow::anyhow;
use chrono::NaiveDate;
use fund_portfolio::{
    compute_return,
    selection::{
        founder_flips, is_listed_common_stock, select, top_by_market_cap, LISTED_EXCHANGES,
        MARKET_CAP_BLACKLIST,
    },
    size_orders, write_plan, Ceo, Snapshot, Strategy, TickerInfo,
};
use fund_spider::{fs::read_json, WorkItem};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// The outcome of one backtest, one line when displayed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Summary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy: Strategy,
    pub fund_size: usize,
    pub fund_return: f64,
    pub benchmark_size: usize,
    pub benchmark_return: f64,

    /// Holdings left out of either return for want of a close.
    pub skipped: Vec<String>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} fund of {}: {:.3}, top {} market cap: {:.3}",
            self.start_date.key(),
            self.end_date.key(),
            self.strategy,
            self.fund_size,
            self.fund_return,
            self.benchmark_size,
            self.benchmark_return
        )?;
        if !self.skipped.is_empty() {
            write!(f, " (no close for {})", self.skipped.join(", "))?;
        }
        Ok(())
    }
}

/// Price the configured strategy against a same-size top-market-cap fund over the
/// period, and write the strategy's weights out as the execution plan.
pub(crate) async fn run(config: &FundConfig) -> anyhow::Result<Summary> {
    let time = std::time::Instant::now();

    let snapshots: HashMap<String, Vec<TickerInfo>> = read_json(&config.snapshot_path).await?;
    let ceos: HashMap<String, Ceo> = read_json(&config.ceo_path).await?;
    debug!(
        "{} snapshots and {} CEOs loaded",
        snapshots.len(),
        ceos.len()
    );

    let ranking_day = day(&snapshots, config.ranking_date())?;
    let start: Snapshot = day(&snapshots, config.start_date)?.iter().collect();
    let end: Snapshot = day(&snapshots, config.end_date)?.iter().collect();

    let listed: Vec<TickerInfo> = ranking_day
        .iter()
        .filter(|info| is_listed_common_stock(info))
        .cloned()
        .collect();
    let ranked = top_by_market_cap(&listed, &LISTED_EXCHANGES, &MARKET_CAP_BLACKLIST, config.top_k);

    let fund = select(&ranked, &ceos, config.strategy, config.fund_size);
    if fund.is_empty() {
        return Err(anyhow!(
            "no company among the top {} fits the {} strategy",
            ranked.len(),
            config.strategy
        ));
    }
    let performance = compute_return(
        &Snapshot::holdings(&fund, &start, &end),
        config.max_weight,
    )?;
    write_plan(Path::new(&config.plan_path), &performance.weights)?;
    info!("execution plan written to {}", config.plan_path);

    if let Some(path) = &config.previous_ceo_path {
        let previous: HashMap<String, Ceo> = read_json(path).await?;
        let flips = founder_flips(&ceos, &previous, fund.iter().map(|info| info.ticker.as_str()));
        if !flips.is_empty() {
            warn!("founder status changed for {flips:?}; check the CEO data");
        }
    }

    let benchmark = select(&ranked, &ceos, Strategy::TopMarketCap, fund.len());
    let top = compute_return(
        &Snapshot::holdings(&benchmark, &start, &end),
        config.max_weight,
    )?;

    let whole_shares: Vec<&str> = config.whole_shares.iter().map(String::as_str).collect();
    let orders = size_orders(&performance.weights, &end, config.fund_amount, &whole_shares);
    debug!(
        "{} orders costing {:.2} of {:.2} at {} closes",
        orders.orders.len(),
        orders.cost(&end),
        config.fund_amount,
        config.end_date
    );

    let mut skipped = performance.skipped;
    skipped.extend(top.skipped);
    skipped.sort();
    skipped.dedup();

    let summary = Summary {
        start_date: config.start_date,
        end_date: config.end_date,
        strategy: config.strategy,
        fund_size: fund.len(),
        fund_return: performance.total_return,
        benchmark_size: benchmark.len(),
        benchmark_return: top.total_return,
        skipped,
    };
    debug!("backtest finished. {}", fund_spider::time_elapsed(time));
    Ok(summary)
}

fn day(snapshots: &HashMap<String, Vec<TickerInfo>>, date: NaiveDate) -> anyhow::Result<&[TickerInfo]> {
    snapshots
        .get(&date.key())
        .map(Vec::as_slice)
        .filter(|day| !day.is_empty())
        .ok_or_else(|| anyhow!("no snapshot for {date}"))
}
