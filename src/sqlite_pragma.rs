//! Shared SQLite connection tuning
//!
//! Applied to every connection the crate opens:
//! - `journal_mode = WAL` so scans do not block the writer
//! - `synchronous = NORMAL` (safe under WAL)
//! - `temp_store = MEMORY`
//! - `wal_autocheckpoint = 1000` pages
//! - busy timeout so concurrent writers wait instead of failing with SQLITE_BUSY

use rusqlite::Connection;
use std::time::Duration;

pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

pub fn apply_optimized_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    // journal_mode returns the resulting mode as a row
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        // In-memory databases report "memory"
        log::debug!("journal_mode is {} (WAL not available)", mode);
    }

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    let _pages: i64 = conn.pragma_update_and_check(
        None,
        "wal_autocheckpoint",
        WAL_AUTOCHECKPOINT_PAGES,
        |row| row.get(0),
    )?;

    conn.busy_timeout(busy_timeout)?;

    Ok(())
}
