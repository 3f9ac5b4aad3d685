//! Ingest Batch - feed a JSON array of machine events through the ingestion engine
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin ingest_batch -- events.json
//! cat events.json | cargo run --bin ingest_batch
//! ```
//!
//! Prints the `BatchResult` as pretty JSON on stdout. Logs go to stderr.
//!
//! ## Environment Variables
//!
//! - `EVENT_STORE_BACKEND` - `sqlite` | `memory` (default: sqlite)
//! - `EVENT_STORE_DB_PATH` - SQLite file (default: data/machine_events.db)
//! - `EVENT_STORE_SCHEMA_DIR` - extra schema files (default: sql)
//! - `SQLITE_BUSY_TIMEOUT_MS` - (default: 5000)
//! - `GUARD_RETRY_ENABLED` - (default: true)
//! - `RUST_LOG` - Log level (default: info)

use dotenv::dotenv;
use machine_events::{Error, IngestionEngine, RawEvent, Result, StoreConfig, SystemClock};
use std::io::Read;
use std::sync::Arc;

const USAGE: &str = "Usage: ingest_batch [FILE]   (reads stdin when FILE is omitted)";

fn read_input(path: Option<&str>) -> Result<String> {
    let mut input = String::new();
    match path {
        Some(path) => input = std::fs::read_to_string(path)?,
        None => {
            std::io::stdin().read_to_string(&mut input)?;
        }
    }
    Ok(input)
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.len() > 1 {
        return Err(Error::Config(USAGE.to_string()));
    }

    let input = read_input(args.first().map(String::as_str))?;
    let records: Vec<RawEvent> = serde_json::from_str(&input)?;
    if records.is_empty() {
        return Err(Error::Config("Batch must contain at least one event".to_string()));
    }

    let config = StoreConfig::from_env();
    log::info!("🚀 Ingesting {} events", records.len());
    log::info!("   Backend: {:?}", config.backend);
    log::info!("   DB path: {}", config.db_path);

    let store = config.open_store().await?;
    let engine =
        IngestionEngine::new(store, Arc::new(SystemClock)).with_guard_retry(config.guard_retry);

    let result = engine.process_batch(records).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

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
