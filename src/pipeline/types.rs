//! Core data types for machine event ingestion
//!
//! - `RawEvent` - untrusted record as delivered by a caller (every field optional)
//! - `EventPayload` - the business fields; `PartialEq` is payload identity
//! - `MachineEvent` - the persisted entity (id + payload + arrival stamp + revision)
//! - `BatchResult` - per-batch counts, rejections and per-record outcomes
//!
//! Wire names are camelCase. The legacy field names (`eventId`, `eventTime`,
//! `receivedTime`, `machineId`, `lineId`, `factoryId`) are accepted as aliases.

use crate::error::RejectionReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel defect count meaning "unknown / not applicable"
///
/// Such events count toward event totals but never toward defect sums.
pub const UNKNOWN_DEFECT_COUNT: i32 = -1;

/// Incoming record before validation
///
/// `arrived_at` is accepted so that clients sending it do not fail
/// deserialization, but the engine always overwrites it with a server stamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default, alias = "eventId")]
    pub id: Option<String>,

    #[serde(default, alias = "eventTime")]
    pub occurred_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "receivedTime")]
    pub arrived_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "machineId")]
    pub owner_id: Option<String>,

    #[serde(default)]
    pub duration_ms: Option<i64>,

    #[serde(default)]
    pub defect_count: Option<i64>,

    #[serde(default, alias = "lineId")]
    pub group_id: Option<String>,

    #[serde(default, alias = "factoryId")]
    pub partition_id: Option<String>,
}

/// Business payload of an event
///
/// Two events are payload-identical iff their `EventPayload`s are equal;
/// `id`, `arrived_at` and `revision` never take part in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub occurred_at: DateTime<Utc>,
    pub owner_id: String,
    pub duration_ms: i64,
    pub defect_count: i32,
    pub group_id: String,
    pub partition_id: String,
}

impl EventPayload {
    pub fn has_unknown_defects(&self) -> bool {
        self.defect_count == UNKNOWN_DEFECT_COUNT
    }
}

/// Persisted machine event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineEvent {
    pub id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub arrived_at: DateTime<Utc>,
    pub revision: i64,
}

impl MachineEvent {
    /// Build a never-before-stored event (revision 0)
    pub fn new(id: String, payload: EventPayload, arrived_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            arrived_at,
            revision: 0,
        }
    }
}

/// Fate of a single record that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestOutcome {
    /// New event inserted
    Accepted,
    /// Identical payload, or a stale arrival lost to the stored record
    Deduped,
    /// Different payload with a newer arrival replaced the stored record
    Updated,
}

/// Per-record outcome reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status", content = "reason")]
pub enum RecordStatus {
    Accepted,
    Deduped,
    Updated,
    Rejected(RejectionReason),
}

impl From<IngestOutcome> for RecordStatus {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Accepted => RecordStatus::Accepted,
            IngestOutcome::Deduped => RecordStatus::Deduped,
            IngestOutcome::Updated => RecordStatus::Updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub id: Option<String>,
    #[serde(flatten)]
    pub status: RecordStatus,
}

/// Rejected record with its reason and a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    /// `None` when the record had no usable id
    pub id: Option<String>,
    pub reason: RejectionReason,
    pub message: String,
}

/// Summary of one `process_batch` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub accepted: usize,
    pub deduped: usize,
    pub updated: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchResult {
    pub fn with_capacity(records: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(records),
            ..Self::default()
        }
    }

    pub fn record(&mut self, id: String, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Accepted => self.accepted += 1,
            IngestOutcome::Deduped => self.deduped += 1,
            IngestOutcome::Updated => self.updated += 1,
        }
        self.outcomes.push(RecordOutcome {
            id: Some(id),
            status: outcome.into(),
        });
    }

    pub fn reject(&mut self, id: Option<String>, reason: RejectionReason) {
        self.rejected += 1;
        self.rejections.push(Rejection {
            id: id.clone(),
            reason,
            message: reason.to_string(),
        });
        self.outcomes.push(RecordOutcome {
            id,
            status: RecordStatus::Rejected(reason),
        });
    }

    /// Number of records this result accounts for
    pub fn total(&self) -> usize {
        self.accepted + self.deduped + self.updated + self.rejected
    }
}
