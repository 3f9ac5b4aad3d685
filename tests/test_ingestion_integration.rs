//! End-to-end ingestion against both store backends
//!
//! Covers the caller-visible guarantees: acceptance of distinct ids,
//! idempotent re-submission, last-writer-wins on the server arrival stamp,
//! stale writes, validation rejections, JSON wire shape, and a larger batch.

#[cfg(test)]
mod ingestion_integration_tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use machine_events::pipeline::RecordStatus;
    use machine_events::{
        IngestionEngine, ManualClock, MemoryRecordStore, RawEvent, RecordStore, RejectionReason,
        SqliteRecordStore,
    };
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn make_test_raw(id: &str, owner: &str, defect_count: i64) -> RawEvent {
        RawEvent {
            id: Some(id.to_string()),
            occurred_at: Some(start_time() - Duration::minutes(30)),
            arrived_at: None,
            owner_id: Some(owner.to_string()),
            duration_ms: Some(4312),
            defect_count: Some(defect_count),
            group_id: Some("L-01".to_string()),
            partition_id: Some("F01".to_string()),
        }
    }

    struct Harness {
        name: &'static str,
        store: Arc<dyn RecordStore>,
        clock: Arc<ManualClock>,
        engine: IngestionEngine,
    }

    fn make_test_harnesses() -> (Vec<Harness>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteRecordStore::open(dir.path().join("ingest.db"), StdDuration::from_secs(5))
            .unwrap();
        let backends: Vec<(&'static str, Arc<dyn RecordStore>)> = vec![
            ("memory", Arc::new(MemoryRecordStore::new())),
            ("sqlite", Arc::new(sqlite)),
        ];

        let harnesses = backends
            .into_iter()
            .map(|(name, store)| {
                let clock = Arc::new(ManualClock::new(start_time()));
                let engine = IngestionEngine::new(store.clone(), clock.clone());
                Harness { name, store, clock, engine }
            })
            .collect();
        (harnesses, dir)
    }

    #[tokio::test]
    async fn test_distinct_ids_are_all_accepted() {
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            let batch: Vec<RawEvent> = (0..5)
                .map(|i| make_test_raw(&format!("E-{}", i), "M-001", i))
                .collect();
            let result = h.engine.process_batch(batch.clone()).await;

            assert_eq!(result.accepted, 5, "{}", h.name);
            assert_eq!(result.rejected, 0, "{}", h.name);

            for raw in &batch {
                let id = raw.id.as_deref().unwrap();
                let stored = h.store.get_by_id(id).await.unwrap().unwrap();
                assert_eq!(Some(i64::from(stored.payload.defect_count)), raw.defect_count, "{}", h.name);
                assert_eq!(Some(stored.payload.occurred_at), raw.occurred_at, "{}", h.name);
                assert_eq!(stored.arrived_at, start_time(), "{}", h.name);
                assert_eq!(stored.revision, 0, "{}", h.name);
            }
        }
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            let raw = make_test_raw("E-1", "M-001", 2);
            let first = h.engine.process_batch(vec![raw.clone()]).await;
            let before = h.store.get_by_id("E-1").await.unwrap().unwrap();

            h.clock.advance(Duration::minutes(5));
            let second = h.engine.process_batch(vec![raw]).await;
            let after = h.store.get_by_id("E-1").await.unwrap().unwrap();

            assert_eq!(first.outcomes[0].status, RecordStatus::Accepted, "{}", h.name);
            assert_eq!(second.outcomes[0].status, RecordStatus::Deduped, "{}", h.name);
            assert_eq!(before, after, "{}", h.name);
        }
    }

    #[tokio::test]
    async fn test_last_writer_wins_and_stale_writes_lose() {
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            h.engine.process_batch(vec![make_test_raw("E-1", "M-001", 1)]).await;

            // Newer arrival replaces
            h.clock.advance(Duration::seconds(10));
            let result = h.engine.process_batch(vec![make_test_raw("E-1", "M-001", 6)]).await;
            assert_eq!(result.updated, 1, "{}", h.name);

            let stored = h.store.get_by_id("E-1").await.unwrap().unwrap();
            assert_eq!(stored.payload.defect_count, 6, "{}", h.name);
            assert_eq!(stored.revision, 1, "{}", h.name);

            // A writer whose arrival stamp predates the stored one loses
            h.clock.set(start_time() + Duration::seconds(5));
            let result = h.engine.process_batch(vec![make_test_raw("E-1", "M-001", 9)]).await;
            assert_eq!(result.deduped, 1, "{}", h.name);

            let stored = h.store.get_by_id("E-1").await.unwrap().unwrap();
            assert_eq!(stored.payload.defect_count, 6, "{}", h.name);
            assert_eq!(stored.revision, 1, "{}", h.name);
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_counts() {
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            h.engine.process_batch(vec![make_test_raw("E-1", "M-001", 1)]).await;
            h.clock.advance(Duration::seconds(1));

            let mut negative = make_test_raw("E-3", "M-001", 0);
            negative.duration_ms = Some(-1);
            let mut future = make_test_raw("E-4", "M-001", 0);
            future.occurred_at = Some(start_time() + Duration::minutes(20));
            let mut missing_owner = make_test_raw("E-5", "M-001", 0);
            missing_owner.owner_id = None;

            let result = h
                .engine
                .process_batch(vec![
                    make_test_raw("E-1", "M-001", 1), // deduped
                    make_test_raw("E-2", "M-001", 0), // accepted
                    negative,
                    future,
                    missing_owner,
                    make_test_raw("E-1", "M-001", 4), // updated
                ])
                .await;

            assert_eq!(result.accepted, 1, "{}", h.name);
            assert_eq!(result.deduped, 1, "{}", h.name);
            assert_eq!(result.updated, 1, "{}", h.name);
            assert_eq!(result.rejected, 3, "{}", h.name);
            assert_eq!(result.total(), 6, "{}", h.name);

            let reasons: Vec<RejectionReason> = result.rejections.iter().map(|r| r.reason).collect();
            assert_eq!(
                reasons,
                vec![
                    RejectionReason::InvalidDuration,
                    RejectionReason::FutureEventTime,
                    RejectionReason::InvalidPayload,
                ],
                "{}",
                h.name
            );
            assert!(h.store.get_by_id("E-3").await.unwrap().is_none(), "{}", h.name);
        }
    }

    #[tokio::test]
    async fn test_legacy_json_batch() {
        let (harnesses, _dir) = make_test_harnesses();
        let json = r#"[
            {"eventId": "E-1", "eventTime": "2026-01-15T11:00:00Z", "receivedTime": "2030-01-01T00:00:00Z",
             "machineId": "M-001", "durationMs": 1000, "defectCount": 0, "lineId": "L-01", "factoryId": "F01"},
            {"eventId": "E-2", "eventTime": "2026-01-15T11:00:00Z",
             "machineId": "M-001", "durationMs": 21600001, "defectCount": 0, "lineId": "L-01", "factoryId": "F01"},
            {"machineId": "M-001"}
        ]"#;

        for h in harnesses {
            let records: Vec<RawEvent> = serde_json::from_str(json).unwrap();
            let result = h.engine.process_batch(records).await;

            assert_eq!(result.accepted, 1, "{}", h.name);
            assert_eq!(result.rejected, 2, "{}", h.name);

            // Client-supplied receivedTime never reaches the store
            let stored = h.store.get_by_id("E-1").await.unwrap().unwrap();
            assert_eq!(stored.arrived_at, start_time(), "{}", h.name);

            let value = serde_json::to_value(&result).unwrap();
            assert_eq!(value["accepted"], 1);
            assert_eq!(value["rejections"][0]["reason"], "INVALID_DURATION");
            assert_eq!(value["rejections"][0]["message"], "Duration must be between 0 and 6 hours");
            assert!(value["rejections"][1]["id"].is_null());
            assert_eq!(value["outcomes"][0]["status"], "ACCEPTED");
        }
    }

    #[tokio::test]
    async fn test_thousand_event_batch() {
        // Test: A 1000-record batch of distinct ids is fully accepted
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            let batch: Vec<RawEvent> = (0..1000)
                .map(|i| {
                    let mut raw = make_test_raw(&format!("BULK-{:04}", i), &format!("M-{:03}", i % 20), i % 7);
                    raw.occurred_at = Some(start_time() - Duration::seconds(i));
                    raw
                })
                .collect();

            let result = h.engine.process_batch(batch).await;

            assert_eq!(result.accepted, 1000, "{}", h.name);
            assert_eq!(result.outcomes.len(), 1000, "{}", h.name);
            assert!(h.store.get_by_id("BULK-0999").await.unwrap().is_some(), "{}", h.name);
        }
    }

    #[tokio::test]
    async fn test_unstorable_values_rejected_by_every_backend() {
        let (harnesses, _dir) = make_test_harnesses();

        for h in harnesses {
            let mut ancient = make_test_raw("E-1", "M-001", 0);
            ancient.occurred_at = Some(Utc.with_ymd_and_hms(1600, 1, 1, 0, 0, 0).unwrap());
            let huge_defects = make_test_raw("E-2", "M-001", i64::MAX);
            let max_defects = make_test_raw("E-3", "M-001", i64::from(i32::MAX));

            let result = h
                .engine
                .process_batch(vec![ancient, huge_defects, max_defects])
                .await;

            assert_eq!(result.accepted, 1, "{}", h.name);
            assert_eq!(result.rejected, 2, "{}", h.name);
            assert!(
                result
                    .rejections
                    .iter()
                    .all(|r| r.reason == RejectionReason::InvalidPayload),
                "{}",
                h.name
            );
            assert!(h.store.get_by_id("E-1").await.unwrap().is_none(), "{}", h.name);

            let stored = h.store.get_by_id("E-3").await.unwrap().unwrap();
            assert_eq!(stored.payload.defect_count, i32::MAX, "{}", h.name);
        }
    }
}
