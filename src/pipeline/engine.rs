//! Ingestion engine - validate, stamp, store, resolve conflicts
//!
//! ## Per-record flow
//!
//! ```text
//! RawEvent
//!     ↓
//! validate(raw, clock.now())        → Rejected(reason)
//!     ↓
//! arrived_at = clock.now()
//!     ↓
//! store.insert_if_absent()          → ACCEPTED
//!     ↓ KeyConflict
//! store.get_by_id()
//!     ├─ gone      → insert once more → ACCEPTED (second conflict: rejected)
//!     ├─ same      → DEDUPED
//!     ├─ older arrival wins → DEDUPED
//!     └─ newer     → conditional_replace(revision) → UPDATED
//!                       ↓ GuardFailed
//!                    one re-read / re-compare (if enabled), else DEDUPED
//! ```
//!
//! Records in a batch are processed sequentially and independently. Storage
//! failures reject only the record that hit them. The engine holds no lock
//! across store calls; concurrent batches rely on the store's atomic
//! primitives alone.

use super::types::{BatchResult, EventPayload, IngestOutcome, MachineEvent, RawEvent};
use super::validator::{validate, ValidatedEvent};
use crate::clock::Clock;
use crate::error::{IngestError, RejectionReason};
use crate::store::{InsertOutcome, RecordStore, ReplaceOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of one compare-and-replace attempt against a stored record
enum CompareOutcome {
    Settled(IngestOutcome),
    GuardFailed,
}

pub struct IngestionEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,

    /// Re-read and re-compare once after a lost revision race
    guard_retry: bool,
}

impl IngestionEngine {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            guard_retry: true,
        }
    }

    pub fn with_guard_retry(mut self, enabled: bool) -> Self {
        self.guard_retry = enabled;
        self
    }

    /// Ingest a batch; always succeeds and reports the fate of every record
    ///
    /// Callers that must refuse empty batches do so before calling this.
    pub async fn process_batch(&self, records: Vec<RawEvent>) -> BatchResult {
        let mut result = BatchResult::with_capacity(records.len());

        for raw in &records {
            let validated = match validate(raw, self.clock.now()) {
                Ok(validated) => validated,
                Err(reason) => {
                    log::debug!("Rejected {:?}: {}", raw.id, reason.as_str());
                    result.reject(raw.id.clone(), reason);
                    continue;
                }
            };

            let id = validated.id.clone();
            match self.ingest_one(validated).await {
                Ok(outcome) => {
                    log::debug!("{} → {:?}", id, outcome);
                    result.record(id, outcome);
                }
                Err(e) => {
                    log::error!("❌ Failed to ingest {}: {}", id, e);
                    result.reject(Some(id), RejectionReason::InvalidPayload);
                }
            }
        }

        log::info!(
            "📦 Batch processed: {} records ({} accepted, {} deduped, {} updated, {} rejected)",
            records.len(),
            result.accepted,
            result.deduped,
            result.updated,
            result.rejected
        );

        result
    }

    async fn ingest_one(&self, validated: ValidatedEvent) -> Result<IngestOutcome, IngestError> {
        let arrived_at = self.clock.now();
        let event = MachineEvent::new(validated.id, validated.payload, arrived_at);

        match self.store.insert_if_absent(&event).await? {
            InsertOutcome::Inserted => Ok(IngestOutcome::Accepted),
            InsertOutcome::KeyConflict => self.resolve_conflict(&event).await,
        }
    }

    async fn resolve_conflict(&self, incoming: &MachineEvent) -> Result<IngestOutcome, IngestError> {
        let stored = match self.store.get_by_id(&incoming.id).await? {
            Some(stored) => stored,
            None => {
                log::warn!(
                    "⚠️  {} vanished between insert and read, retrying insert once",
                    incoming.id
                );
                return match self.store.insert_if_absent(incoming).await? {
                    InsertOutcome::Inserted => Ok(IngestOutcome::Accepted),
                    InsertOutcome::KeyConflict => {
                        Err(IngestError::UnresolvedConflict(incoming.id.clone()))
                    }
                };
            }
        };

        match self
            .compare_and_replace(&stored, &incoming.payload, incoming.arrived_at)
            .await?
        {
            CompareOutcome::Settled(outcome) => Ok(outcome),
            CompareOutcome::GuardFailed if !self.guard_retry => {
                log::debug!("{} lost a revision race, retry disabled", incoming.id);
                Ok(IngestOutcome::Deduped)
            }
            CompareOutcome::GuardFailed => {
                log::warn!(
                    "⚠️  {} lost a revision race at revision {}, re-comparing once",
                    incoming.id,
                    stored.revision
                );

                let Some(current) = self.store.get_by_id(&incoming.id).await? else {
                    // Deleted underneath us; the record we raced against is gone too
                    return Ok(IngestOutcome::Deduped);
                };

                match self
                    .compare_and_replace(&current, &incoming.payload, incoming.arrived_at)
                    .await?
                {
                    CompareOutcome::Settled(outcome) => Ok(outcome),
                    CompareOutcome::GuardFailed => Ok(IngestOutcome::Deduped),
                }
            }
        }
    }

    async fn compare_and_replace(
        &self,
        stored: &MachineEvent,
        payload: &EventPayload,
        arrived_at: DateTime<Utc>,
    ) -> Result<CompareOutcome, IngestError> {
        if stored.payload == *payload {
            return Ok(CompareOutcome::Settled(IngestOutcome::Deduped));
        }

        // Last writer wins on server arrival; ties keep the stored record
        if arrived_at <= stored.arrived_at {
            return Ok(CompareOutcome::Settled(IngestOutcome::Deduped));
        }

        match self
            .store
            .conditional_replace(&stored.id, stored.revision, payload, arrived_at)
            .await?
        {
            ReplaceOutcome::Replaced => Ok(CompareOutcome::Settled(IngestOutcome::Updated)),
            ReplaceOutcome::GuardFailed => Ok(CompareOutcome::GuardFailed),
        }
    }
}
