//! Event Stats - windowed defect statistics from the event store
//!
//! ## Usage
//!
//! ```bash
//! event_stats stats --owner M-001 --start 2026-01-15T00:00:00Z --end 2026-01-15T06:00:00Z
//! event_stats stats --owner M-001 --window 1h
//! event_stats top-lines --partition F01 --from 2026-01-15T00:00:00Z --to 2026-01-16T00:00:00Z --limit 5
//! ```
//!
//! Instants are RFC 3339. `--window` accepts 15m, 1h, 6h, 24h and ends now.
//! Results are printed as pretty JSON; store settings come from the same
//! environment variables as `ingest_batch`.

use chrono::{DateTime, Utc};
use dotenv::dotenv;
use machine_events::aggregator_core::WindowSize;
use machine_events::{AggregationEngine, Error, Result, StoreConfig, TimeWindow};

const DEFAULT_LIMIT: i64 = 10;

const USAGE: &str = "Usage:
  event_stats stats --owner ID (--start T --end T | --window 15m|1h|6h|24h)
  event_stats top-lines --partition ID --from T --to T [--limit N]";

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    flag_value(args, flag)
        .ok_or_else(|| Error::Config(format!("Missing {} argument.\n{}", flag, USAGE)))
}

fn parse_instant(flag: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", flag, value, e)))
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args
        .first()
        .ok_or_else(|| Error::Config(USAGE.to_string()))?;

    if command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = StoreConfig::from_env();
    let store = config.open_store().await?;
    let engine = AggregationEngine::new(store);

    match command.as_str() {
        "stats" => {
            let owner = required(&args, "--owner")?;
            let window = match flag_value(&args, "--window") {
                Some(size) => {
                    let size = WindowSize::parse(size).ok_or_else(|| {
                        let known: Vec<&str> = WindowSize::all().iter().map(|s| s.as_str()).collect();
                        Error::Config(format!("Invalid --window '{}' ({})", size, known.join(", ")))
                    })?;
                    TimeWindow::trailing(Utc::now(), size)
                }
                None => {
                    let start = parse_instant("--start", required(&args, "--start")?)?;
                    let end = parse_instant("--end", required(&args, "--end")?)?;
                    TimeWindow::new(start, end)?
                }
            };

            let stats = engine.get_stats_in(owner, &window).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "top-lines" => {
            let partition = required(&args, "--partition")?;
            let from = parse_instant("--from", required(&args, "--from")?)?;
            let to = parse_instant("--to", required(&args, "--to")?)?;
            let limit = match flag_value(&args, "--limit") {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| Error::Config(format!("Invalid --limit '{}'", raw)))?,
                None => DEFAULT_LIMIT,
            };

            let rankings = engine.get_top_lines(partition, from, to, limit).await?;
            println!("{}", serde_json::to_string_pretty(&rankings)?);
        }
        other => {
            return Err(Error::Config(format!("Unknown command '{}'\n{}", other, USAGE)));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run().await {
        log::error!("❌ {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
