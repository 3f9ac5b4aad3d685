//! Store and engine configuration from environment variables
//!
//! Environment variables (read after `dotenv`):
//! - `EVENT_STORE_BACKEND` - `sqlite` | `memory` (default: sqlite)
//! - `EVENT_STORE_DB_PATH` (default: data/machine_events.db)
//! - `EVENT_STORE_SCHEMA_DIR` (default: sql)
//! - `SQLITE_BUSY_TIMEOUT_MS` (default: 5000)
//! - `GUARD_RETRY_ENABLED` (default: true)
//!
//! Unparseable values fall back to the default with a warning.

use crate::error::StoreResult;
use crate::store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "data/machine_events.db";
pub const DEFAULT_SCHEMA_DIR: &str = "sql";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sqlite,
    Memory,
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendType::Sqlite),
            "memory" => Ok(BackendType::Memory),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendType,

    /// Path to SQLite database file
    pub db_path: String,

    /// Directory of extra `.sql` files applied after the embedded schema
    pub schema_dir: String,

    pub busy_timeout: Duration,

    /// Re-compare once after losing a revision race
    pub guard_retry: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Sqlite,
            db_path: DEFAULT_DB_PATH.to_string(),
            schema_dir: DEFAULT_SCHEMA_DIR.to_string(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            guard_retry: true,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            backend: parse_or("EVENT_STORE_BACKEND", &lookup, defaults.backend),
            db_path: lookup("EVENT_STORE_DB_PATH").unwrap_or(defaults.db_path),
            schema_dir: lookup("EVENT_STORE_SCHEMA_DIR").unwrap_or(defaults.schema_dir),
            busy_timeout: Duration::from_millis(parse_or(
                "SQLITE_BUSY_TIMEOUT_MS",
                &lookup,
                DEFAULT_BUSY_TIMEOUT_MS,
            )),
            guard_retry: parse_or("GUARD_RETRY_ENABLED", &lookup, defaults.guard_retry),
        }
    }

    /// Open the configured backend
    ///
    /// For SQLite, extra schema files in `schema_dir` are applied when the
    /// directory exists.
    pub async fn open_store(&self) -> StoreResult<Arc<dyn RecordStore>> {
        match self.backend {
            BackendType::Memory => {
                log::info!("🧠 Using in-memory event store (data is not persisted)");
                Ok(Arc::new(MemoryRecordStore::new()))
            }
            BackendType::Sqlite => {
                let store = SqliteRecordStore::open(&self.db_path, self.busy_timeout)?;
                if Path::new(&self.schema_dir).is_dir() {
                    store.migrate(&self.schema_dir).await?;
                } else {
                    log::debug!(
                        "Schema directory {} not found, using embedded schema only",
                        self.schema_dir
                    );
                }
                Ok(Arc::new(store))
            }
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("⚠️  Invalid {}={:?}, using default {:?}", key, raw, default);
                default
            }
        },
    }
}
