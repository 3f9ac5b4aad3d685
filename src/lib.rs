//! Machine event ingestion and windowed defect statistics
//!
//! - `pipeline` - batch ingestion with idempotency and last-writer-wins
//! - `aggregator_core` - per-owner stats and per-partition group rankings
//! - `store` - record store contract plus in-memory and SQLite backends

pub mod aggregator_core;
pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sqlite_pragma;
pub mod store;

pub use aggregator_core::{AggregationEngine, HealthStatus, LineRanking, StatsResult, TimeWindow};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendType, StoreConfig};
pub use error::{Error, IngestError, QueryError, RejectionReason, Result, StoreError};
pub use pipeline::{BatchResult, IngestionEngine, RawEvent};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
