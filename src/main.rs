mod calendar;
mod compare;
mod config;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::compare::CompareStrategy;
use crate::config::AppConfig;
use crate::pipeline::{Outcome, Pipeline, RunReport};
use crate::scraper::http_client::HttpClient;
use crate::scraper::{capture, FilePageSource, PageSource};
use crate::utils::{fmt_opt_float, fmt_opt_number};

#[derive(Parser)]
#[command(name = "vnindex-snapshot", about = "VN-Index market summary recorder", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Table file (overrides storage.table_path)
    #[arg(long, global = true, env = "VNI_TABLE")]
    table: Option<PathBuf>,

    /// Duplicate check policy (overrides pipeline.strategy)
    #[arg(long, global = true, value_enum)]
    strategy: Option<CompareStrategy>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the configured page and record a snapshot if it changed
    Capture,

    /// Record a snapshot from a saved, fully rendered HTML page
    Ingest {
        #[arg(long)]
        html: PathBuf,
    },

    /// Show the last stored row
    Last,

    /// Print the trading date a capture taken now would be filed under
    TradingDate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "vnindex_snapshot=info,warn",
        1 => "vnindex_snapshot=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(table) = cli.table {
        config.storage.table_path = table;
    }
    if let Some(strategy) = cli.strategy {
        config.pipeline.strategy = strategy;
    }

    match cli.command {
        Command::Capture => {
            let _t = utils::Timer::start("Capture");
            let source = HttpClient::new(&config.source)?;
            let report = record(&source, &config).await?;
            print_report(&report);
        }

        Command::Ingest { html } => {
            let _t = utils::Timer::start("Ingest");
            let source = FilePageSource::new(html);
            let report = record(&source, &config).await?;
            print_report(&report);
        }

        Command::Last => {
            let pipeline = Pipeline::from_config(&config.storage, config.pipeline.clone())?;
            let store = pipeline.store();
            let rows = store.row_count().context("Failed to count rows")?;
            match store.read_last() {
                None => println!("No stored rows in {:?}", store.path()),
                Some(k) => {
                    println!("─────────────────────────────────");
                    println!("  {:?} ({} rows)", store.path(), rows);
                    println!("─────────────────────────────────");
                    println!("  Index      : {}", fmt_opt_float(k.index_value, 2));
                    println!("  Spread     : {}", fmt_opt_float(k.spread, 2));
                    println!("  Spread %   : {}", fmt_opt_float(k.spread_percent, 2));
                    println!("  Value (tỷ) : {}", fmt_opt_float(k.traded_value, 3));
                    println!("  Volume     : {}", fmt_opt_number(k.traded_volume));
                    println!("  Up         : {}", fmt_opt_number(k.count_up));
                    println!("  Down       : {}", fmt_opt_number(k.count_down));
                    println!("  Unchanged  : {}", fmt_opt_number(k.count_unchanged));
                    println!("─────────────────────────────────");
                }
            }
        }

        Command::TradingDate => {
            let now = calendar::wall_clock(config.pipeline.utc_offset_minutes);
            println!(
                "{}",
                calendar::trading_date_label(now, config.pipeline.opening_hour)
            );
        }
    }

    Ok(())
}

async fn record(source: &dyn PageSource, config: &AppConfig) -> Result<RunReport> {
    let pipeline = Pipeline::from_config(&config.storage, config.pipeline.clone())?;
    info!(
        "Table {:?}, {:?} comparison",
        pipeline.store().path(),
        pipeline.strategy()
    );

    let raw = capture(source, &config.source.selectors).await?;
    pipeline.run(&raw)
}

fn print_report(report: &RunReport) {
    let snap = &report.snapshot;
    match report.outcome {
        Outcome::Skipped => {
            println!("Unchanged since the last stored row; nothing written.");
        }
        Outcome::Appended(mode) => {
            println!("Recorded {} ({:?}).", snap.date_label(), mode);
        }
    }
    if let Ok(json) = serde_json::to_string_pretty(snap) {
        println!("{}", json);
    }
    if !report.issues.is_empty() {
        println!("{} field(s) could not be read:", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
}
