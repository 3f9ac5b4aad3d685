//! Record store contract consumed by the ingestion and aggregation engines
//!
//! The store is the only shared mutable resource. Its two atomic primitives
//! carry all of the concurrency guarantees:
//!
//! - `insert_if_absent` - unique-key enforcement; exactly one racing insert
//!   for an id observes `Inserted`, every other one observes `KeyConflict`
//! - `conditional_replace` - compare-and-swap on `revision`; a replace whose
//!   expected revision no longer matches observes `GuardFailed`
//!
//! Neither outcome is an error. `StoreError` is reserved for the store being
//! unreachable or misbehaving.
//!
//! Implementations:
//! - `MemoryRecordStore` - `RwLock<HashMap>`; tests and single-process use
//! - `SqliteRecordStore` - rusqlite; primary-key constraint + guarded UPDATE

pub mod memory;
pub mod sqlite;

use crate::aggregator_core::window::TimeWindow;
use crate::error::StoreResult;
use crate::pipeline::types::{EventPayload, MachineEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryRecordStore;
pub use sqlite::{run_schema_migrations, SqliteRecordStore};

/// Result of `insert_if_absent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same id already exists; nothing was written
    KeyConflict,
}

/// Result of `conditional_replace`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Payload and arrival replaced; revision is now `expected + 1`
    Replaced,
    /// Stored revision differed from the expected one (or the record is gone)
    GuardFailed,
}

/// Whether scans keep events whose defect count is the unknown sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectFilter {
    IncludeUnknown,
    ExcludeUnknown,
}

impl DefectFilter {
    pub fn keeps(&self, event: &MachineEvent) -> bool {
        match self {
            DefectFilter::IncludeUnknown => true,
            DefectFilter::ExcludeUnknown => !event.payload.has_unknown_defects(),
        }
    }
}

/// Keyed machine event collection
///
/// Scans return events ordered by `occurred_at` ascending, then by insertion
/// order. Windows are half-open on `occurred_at`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_if_absent(&self, event: &MachineEvent) -> StoreResult<InsertOutcome>;

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<MachineEvent>>;

    /// Replace business fields and `arrived_at`, bump `revision` by one,
    /// only if the stored revision equals `expected_revision`
    async fn conditional_replace(
        &self,
        id: &str,
        expected_revision: i64,
        payload: &EventPayload,
        arrived_at: DateTime<Utc>,
    ) -> StoreResult<ReplaceOutcome>;

    async fn scan_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>>;

    async fn scan_by_partition_and_time_range(
        &self,
        partition_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>>;

    /// Count every event for the owner in the window, unknown defects included
    async fn count_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
    ) -> StoreResult<u64>;
}
