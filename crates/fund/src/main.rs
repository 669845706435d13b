mod backtest;
mod config;
mod snapshots;

use config::FundConfig;
use dotenv::var;
use tracing::{info, subscriber, trace, Level};
use tracing_subscriber::FmtSubscriber;

////////////////////////////////////////////////////////////////////////////

// install the subscriber at the requested trace level
fn preprocess(trace_level: Level) -> anyhow::Result<()> {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // set the trace level
    let trace_level = match var("TRACE_LEVEL") {
        Ok(level) => Some(
            level
                .parse::<Level>()
                .map_err(|err| anyhow::anyhow!("invalid TRACE_LEVEL {level:?}, error({err})"))?,
        ),
        Err(_) => None,
    };
    if let Some(trace_level) = trace_level {
        preprocess(trace_level)?;
    }

    // if no trace level provided, use tui
    let tui = trace_level.is_none();

    let config = FundConfig::from_env()?;
    trace!("configuration recorded: {config:?}");

    // no subscriber under the tui, so results go to stdout
    if let Some(urls) = &config.source {
        let collection = snapshots::collect(&config, urls, tui).await?;
        if tui {
            println!("{collection}");
        }
    }

    let summary = backtest::run(&config).await?;
    if tui {
        println!("{summary}");
    } else {
        info!("{summary}");
    }

    Ok(())
}
