use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use swing_bts::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replays a daily price file through the swing ladder simulator.
#[derive(Parser)]
#[command(name = "swing-bts", about = "Backtest a zig-zag swing ladder on a daily price history")]
struct Cli {
    /// Price file (`Date,Open,High,Low,Close[,Volume,Adj Close]`).
    #[arg(long)]
    prices: PathBuf,

    /// Split file (`SPLIT, YYYYMMDD, N:D` rows).
    #[arg(long)]
    splits: Option<PathBuf>,

    /// First simulated day (YYYY-MM-DD). Defaults to the first bar.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Starting cash.
    #[arg(long, default_value_t = STARTING_CASH)]
    cash: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut loader = CsvHistoryLoader::new(&cli.prices);
    if let Some(splits) = &cli.splits {
        loader = loader.with_splits(splits);
    }
    let history = PriceHistory::load(&loader).with_context(|| format!("failed to load {}", cli.prices.display()))?;
    let start = cli.start.unwrap_or(history.start_date());
    info!(
        bars = history.len(),
        first = %history.start_date(),
        last = %history.end_date(),
        %start,
        "history ready"
    );

    let mut simulator = TransactionSimulator::new(history, cli.cash)?;
    simulator
        .run(start)
        .with_context(|| format!("simulation from {start} failed"))?;

    for valuation in simulator.trace() {
        info!(
            date = %valuation.date,
            close = valuation.close,
            cash = valuation.cash,
            position = valuation.position,
            total = valuation.total,
            "account value"
        );
    }

    let total = simulator.trace().last().map_or(cli.cash, |valuation| valuation.total);
    println!("Final account value: {total:.2}");

    #[cfg(feature = "metrics")]
    println!("{}", Metrics::from(&simulator));

    Ok(())
}
