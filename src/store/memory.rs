//! In-memory record store
//!
//! Thread-safe via `RwLock`. Every contract operation runs under a single
//! lock acquisition, so insert-if-absent and the revision guard are atomic.
//! Data is lost on drop.

use super::{DefectFilter, InsertOutcome, RecordStore, ReplaceOutcome};
use crate::aggregator_core::window::TimeWindow;
use crate::error::{StoreError, StoreResult};
use crate::pipeline::types::{EventPayload, MachineEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<String, StoredEvent>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event: MachineEvent,
    /// Insertion sequence, tie-breaker for scan order
    seq: u64,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.events.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete an event (operational concern, never called by the engines)
    pub fn remove(&self, id: &str) -> StoreResult<Option<MachineEvent>> {
        Ok(self.write()?.events.remove(id).map(|stored| stored.event))
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn scan<P>(&self, window: &TimeWindow, filter: DefectFilter, matches: P) -> StoreResult<Vec<MachineEvent>>
    where
        P: Fn(&MachineEvent) -> bool,
    {
        let inner = self.read()?;

        let mut hits: Vec<&StoredEvent> = inner
            .events
            .values()
            .filter(|stored| {
                matches(&stored.event)
                    && window.contains(stored.event.payload.occurred_at)
                    && filter.keeps(&stored.event)
            })
            .collect();

        hits.sort_by_key(|stored| (stored.event.payload.occurred_at, stored.seq));

        Ok(hits.into_iter().map(|stored| stored.event.clone()).collect())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, event: &MachineEvent) -> StoreResult<InsertOutcome> {
        let mut inner = self.write()?;

        if inner.events.contains_key(&event.id) {
            return Ok(InsertOutcome::KeyConflict);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.events.insert(
            event.id.clone(),
            StoredEvent {
                event: event.clone(),
                seq,
            },
        );

        Ok(InsertOutcome::Inserted)
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<MachineEvent>> {
        Ok(self.read()?.events.get(id).map(|stored| stored.event.clone()))
    }

    async fn conditional_replace(
        &self,
        id: &str,
        expected_revision: i64,
        payload: &EventPayload,
        arrived_at: DateTime<Utc>,
    ) -> StoreResult<ReplaceOutcome> {
        let mut inner = self.write()?;

        match inner.events.get_mut(id) {
            Some(stored) if stored.event.revision == expected_revision => {
                stored.event.payload = payload.clone();
                stored.event.arrived_at = arrived_at;
                stored.event.revision = expected_revision + 1;
                Ok(ReplaceOutcome::Replaced)
            }
            _ => Ok(ReplaceOutcome::GuardFailed),
        }
    }

    async fn scan_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>> {
        self.scan(window, filter, |event| event.payload.owner_id == owner_id)
    }

    async fn scan_by_partition_and_time_range(
        &self,
        partition_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>> {
        self.scan(window, filter, |event| event.payload.partition_id == partition_id)
    }

    async fn count_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
    ) -> StoreResult<u64> {
        let inner = self.read()?;
        let count = inner
            .events
            .values()
            .filter(|stored| {
                stored.event.payload.owner_id == owner_id
                    && window.contains(stored.event.payload.occurred_at)
            })
            .count();
        Ok(count as u64)
    }
}
