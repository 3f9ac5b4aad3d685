//! SQLite record store
//!
//! One connection behind `Arc<Mutex<_>>`; every call hops onto the blocking
//! pool with `spawn_blocking`. Atomicity comes from SQLite itself:
//! - insert relies on the `id` primary key; a constraint violation is `KeyConflict`
//! - replace is `UPDATE ... WHERE id = ? AND revision = ?`; zero changed rows is `GuardFailed`
//!
//! Instants are stored as INTEGER nanoseconds since the epoch. Query windows
//! reaching past that range are clipped to it.

use super::{DefectFilter, InsertOutcome, RecordStore, ReplaceOutcome};
use crate::aggregator_core::window::TimeWindow;
use crate::error::{StoreError, StoreResult};
use crate::pipeline::types::{EventPayload, MachineEvent, UNKNOWN_DEFECT_COUNT};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embedded copy of `sql/01_machine_events.sql`
pub const SCHEMA_SQL: &str = include_str!("../../sql/01_machine_events.sql");

const SELECT_COLUMNS: &str = "id, occurred_at, arrived_at, owner_id, duration_ms, \
                              defect_count, group_id, partition_id, revision";

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database file, tune it and apply the embedded schema
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn, busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Migration(format!("01_machine_events.sql: {}", e)))?;

        log::info!("✅ SQLite event store ready at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_optimized_pragmas(&conn, Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Migration(format!("01_machine_events.sql: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply extra schema files from `schema_dir` on this store's connection
    pub async fn migrate(&self, schema_dir: &str) -> StoreResult<()> {
        let schema_dir = schema_dir.to_string();
        self.with_conn(move |conn| run_schema_migrations(conn, &schema_dir))
            .await
    }

    async fn with_conn<F, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {}", e)))?
    }

    async fn scan(
        &self,
        column: &'static str,
        key: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>> {
        let key = key.to_string();
        let Some((first, last)) = window_nanos(window) else {
            return Ok(Vec::new());
        };

        let defect_clause = match filter {
            DefectFilter::IncludeUnknown => "",
            DefectFilter::ExcludeUnknown => " AND defect_count <> ?4",
        };
        let sql = format!(
            "SELECT {} FROM machine_events \
             WHERE {} = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3{} \
             ORDER BY occurred_at ASC, rowid ASC",
            SELECT_COLUMNS, column, defect_clause
        );

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = match filter {
                DefectFilter::IncludeUnknown => {
                    stmt.query_map(params![key, first, last], read_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                DefectFilter::ExcludeUnknown => {
                    stmt.query_map(params![key, first, last, UNKNOWN_DEFECT_COUNT], read_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows.into_iter().map(StoredRow::into_event).collect())
        })
        .await
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_if_absent(&self, event: &MachineEvent) -> StoreResult<InsertOutcome> {
        let occurred_at = to_nanos(event.payload.occurred_at)?;
        let arrived_at = to_nanos(event.arrived_at)?;
        let event = event.clone();

        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO machine_events (
                    id, occurred_at, arrived_at, owner_id, duration_ms,
                    defect_count, group_id, partition_id, revision
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.id,
                    occurred_at,
                    arrived_at,
                    event.payload.owner_id,
                    event.payload.duration_ms,
                    event.payload.defect_count,
                    event.payload.group_id,
                    event.payload.partition_id,
                    event.revision,
                ],
            );

            match result {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_primary_key_violation(&e) => Ok(InsertOutcome::KeyConflict),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<MachineEvent>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM machine_events WHERE id = ?1", SELECT_COLUMNS);
            let row = conn
                .query_row(&sql, params![id], read_row)
                .optional()?;
            Ok(row.map(StoredRow::into_event))
        })
        .await
    }

    async fn conditional_replace(
        &self,
        id: &str,
        expected_revision: i64,
        payload: &EventPayload,
        arrived_at: DateTime<Utc>,
    ) -> StoreResult<ReplaceOutcome> {
        let id = id.to_string();
        let occurred_at = to_nanos(payload.occurred_at)?;
        let arrived_at = to_nanos(arrived_at)?;
        let payload = payload.clone();

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE machine_events SET
                    occurred_at = ?1,
                    arrived_at = ?2,
                    owner_id = ?3,
                    duration_ms = ?4,
                    defect_count = ?5,
                    group_id = ?6,
                    partition_id = ?7,
                    revision = revision + 1
                 WHERE id = ?8 AND revision = ?9",
                params![
                    occurred_at,
                    arrived_at,
                    payload.owner_id,
                    payload.duration_ms,
                    payload.defect_count,
                    payload.group_id,
                    payload.partition_id,
                    id,
                    expected_revision,
                ],
            )?;

            if changed == 0 {
                Ok(ReplaceOutcome::GuardFailed)
            } else {
                Ok(ReplaceOutcome::Replaced)
            }
        })
        .await
    }

    async fn scan_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>> {
        self.scan("owner_id", owner_id, window, filter).await
    }

    async fn scan_by_partition_and_time_range(
        &self,
        partition_id: &str,
        window: &TimeWindow,
        filter: DefectFilter,
    ) -> StoreResult<Vec<MachineEvent>> {
        self.scan("partition_id", partition_id, window, filter).await
    }

    async fn count_by_owner_and_time_range(
        &self,
        owner_id: &str,
        window: &TimeWindow,
    ) -> StoreResult<u64> {
        let owner_id = owner_id.to_string();
        let Some((first, last)) = window_nanos(window) else {
            return Ok(0);
        };

        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM machine_events
                 WHERE owner_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3",
                params![owner_id, first, last],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

/// Run schema migrations from SQL files
///
/// Executes every `.sql` file in `schema_dir` in file-name order
/// (`01_`, `02_`, ...). Files must be idempotent (`IF NOT EXISTS`).
/// Stops at the first failure.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> StoreResult<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.is_dir() {
        return Err(StoreError::Migration(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)
        .map_err(|e| StoreError::Migration(format!("{}: {}", schema_dir, e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for path in sql_files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)
            .map_err(|e| StoreError::Migration(format!("{}: {}", filename, e)))?;

        conn.execute_batch(&sql_content)
            .map_err(|e| StoreError::Migration(format!("{}: {}", filename, e)))?;

        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

/// Row as read from SQLite, before instant decoding
struct StoredRow {
    id: String,
    occurred_at: i64,
    arrived_at: i64,
    owner_id: String,
    duration_ms: i64,
    defect_count: i32,
    group_id: String,
    partition_id: String,
    revision: i64,
}

impl StoredRow {
    fn into_event(self) -> MachineEvent {
        MachineEvent {
            id: self.id,
            payload: EventPayload {
                occurred_at: from_nanos(self.occurred_at),
                owner_id: self.owner_id,
                duration_ms: self.duration_ms,
                defect_count: self.defect_count,
                group_id: self.group_id,
                partition_id: self.partition_id,
            },
            arrived_at: from_nanos(self.arrived_at),
            revision: self.revision,
        }
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        occurred_at: row.get(1)?,
        arrived_at: row.get(2)?,
        owner_id: row.get(3)?,
        duration_ms: row.get(4)?,
        defect_count: row.get(5)?,
        group_id: row.get(6)?,
        partition_id: row.get(7)?,
        revision: row.get(8)?,
    })
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Nanoseconds since the epoch; instants outside roughly 1677..2262 do not fit
fn to_nanos(instant: DateTime<Utc>) -> StoreResult<i64> {
    instant.timestamp_nanos_opt().ok_or_else(|| {
        StoreError::Encoding(format!(
            "instant {} is outside the storable range",
            instant.to_rfc3339()
        ))
    })
}

/// Inclusive nanosecond bounds of `[start, end)` clipped to the storable range
///
/// `None` when no storable instant falls inside the window.
fn window_nanos(window: &TimeWindow) -> Option<(i64, i64)> {
    let first = match window.start().timestamp_nanos_opt() {
        Some(nanos) => nanos,
        None if window.start().timestamp() < 0 => i64::MIN,
        None => return None,
    };
    let last = match window.end().timestamp_nanos_opt() {
        Some(nanos) => nanos.checked_sub(1)?,
        None if window.end().timestamp() > 0 => i64::MAX,
        None => return None,
    };

    (first <= last).then_some((first, last))
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap()
    }

    fn make_event(id: &str, partition: &str, minute: i64, defect_count: i32) -> MachineEvent {
        MachineEvent::new(
            id.to_string(),
            EventPayload {
                occurred_at: base_time() + ChronoDuration::minutes(minute),
                owner_id: "M-001".to_string(),
                duration_ms: 2500,
                defect_count,
                group_id: "L-01".to_string(),
                partition_id: partition.to_string(),
            },
            base_time() + ChronoDuration::hours(2),
        )
    }

    #[tokio::test]
    async fn test_open_creates_schema_and_wal() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("events.db");

        let _store = SqliteRecordStore::open(&db_path, Duration::from_secs(1)).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'machine_events'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");

        {
            let store = SqliteRecordStore::open(&db_path, Duration::from_secs(1)).unwrap();
            store.insert_if_absent(&make_event("E-1", "F01", 0, 3)).await.unwrap();
        }

        // Schema statements are idempotent
        let store = SqliteRecordStore::open(&db_path, Duration::from_secs(1)).unwrap();
        let stored = store.get_by_id("E-1").await.unwrap().unwrap();
        assert_eq!(stored.payload.defect_count, 3);
    }

    #[tokio::test]
    async fn test_insert_conflict_and_guarded_replace() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let event = make_event("E-1", "F01", 5, 1);

        assert_eq!(store.insert_if_absent(&event).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_if_absent(&event).await.unwrap(), InsertOutcome::KeyConflict);

        let mut payload = event.payload.clone();
        payload.defect_count = 6;
        let arrived = base_time() + ChronoDuration::hours(3);

        assert_eq!(
            store.conditional_replace("E-1", 1, &payload, arrived).await.unwrap(),
            ReplaceOutcome::GuardFailed
        );
        assert_eq!(
            store.conditional_replace("E-1", 0, &payload, arrived).await.unwrap(),
            ReplaceOutcome::Replaced
        );
        assert_eq!(
            store.conditional_replace("missing", 0, &payload, arrived).await.unwrap(),
            ReplaceOutcome::GuardFailed
        );

        let stored = store.get_by_id("E-1").await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.payload, payload);
        assert_eq!(stored.arrived_at, arrived);
    }

    #[tokio::test]
    async fn test_instants_roundtrip_with_nanosecond_precision() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut event = make_event("E-1", "F01", 0, 0);
        event.payload.occurred_at = base_time() + ChronoDuration::nanoseconds(123_456_789);

        store.insert_if_absent(&event).await.unwrap();
        let stored = store.get_by_id("E-1").await.unwrap().unwrap();
        assert_eq!(stored, event);
    }

    #[tokio::test]
    async fn test_out_of_range_instant_is_encoding_error() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut event = make_event("E-1", "F01", 0, 0);
        event.payload.occurred_at = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();

        let result = store.insert_if_absent(&event).await;
        assert!(matches!(result, Err(StoreError::Encoding(_))));
    }

    #[test]
    fn test_window_nanos_clips_to_storable_range() {
        let at = |year| Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();

        let window = TimeWindow::new(at(1600), at(3000)).unwrap();
        assert_eq!(window_nanos(&window), Some((i64::MIN, i64::MAX)));

        let window = TimeWindow::new(base_time(), base_time() + ChronoDuration::seconds(1)).unwrap();
        let first = base_time().timestamp_nanos_opt().unwrap();
        assert_eq!(window_nanos(&window), Some((first, first + 999_999_999)));

        let window = TimeWindow::new(at(1500), at(1600)).unwrap();
        assert_eq!(window_nanos(&window), None);
        let window = TimeWindow::new(at(2300), at(2400)).unwrap();
        assert_eq!(window_nanos(&window), None);
    }

    #[tokio::test]
    async fn test_partition_scan_filters_unknown_defects() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert_if_absent(&make_event("E-2", "F01", 20, -1)).await.unwrap();
        store.insert_if_absent(&make_event("E-1", "F01", 10, 4)).await.unwrap();
        store.insert_if_absent(&make_event("E-3", "F01", 20, 2)).await.unwrap();
        store.insert_if_absent(&make_event("E-4", "F02", 20, 2)).await.unwrap();
        store.insert_if_absent(&make_event("E-5", "F01", 60, 2)).await.unwrap();

        let window = TimeWindow::new(base_time(), base_time() + ChronoDuration::hours(1)).unwrap();

        let all = store
            .scan_by_partition_and_time_range("F01", &window, DefectFilter::IncludeUnknown)
            .await
            .unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
        // Equal occurred_at keeps insertion order
        assert_eq!(ids, vec!["E-1", "E-2", "E-3"]);

        let known = store
            .scan_by_partition_and_time_range("F01", &window, DefectFilter::ExcludeUnknown)
            .await
            .unwrap();
        let ids: Vec<&str> = known.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["E-1", "E-3"]);

        let count = store.count_by_owner_and_time_range("M-001", &window).await.unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_run_schema_migrations_in_name_order() {
        let dir = tempdir().unwrap();
        let schema_dir = dir.path().join("sql");
        fs::create_dir_all(&schema_dir).unwrap();
        fs::write(
            schema_dir.join("02_audit.sql"),
            "CREATE TABLE IF NOT EXISTS ingest_audit (event_id TEXT REFERENCES machine_events(id));",
        )
        .unwrap();
        fs::write(schema_dir.join("01_machine_events.sql"), SCHEMA_SQL).unwrap();
        fs::write(schema_dir.join("README.md"), "not sql").unwrap();

        let mut conn = Connection::open(dir.path().join("migrate.db")).unwrap();
        run_schema_migrations(&mut conn, schema_dir.to_str().unwrap()).unwrap();
        // Second run is a no-op
        run_schema_migrations(&mut conn, schema_dir.to_str().unwrap()).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('machine_events', 'ingest_audit')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[tokio::test]
    async fn test_run_schema_migrations_missing_dir() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = run_schema_migrations(&mut conn, "/nonexistent/schema/dir");
        assert!(matches!(result, Err(StoreError::Migration(_))));
    }
}
