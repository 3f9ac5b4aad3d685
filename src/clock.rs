//! Time source for server-assigned arrival stamps
//!
//! The ingestion engine never trusts a client-supplied arrival time. Every
//! stamp comes from a `Clock`, which tests replace with a `ManualClock` for
//! deterministic last-writer-wins scenarios.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
///
/// Stores nanoseconds since the Unix epoch so it can be shared across tasks
/// without a lock.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    ///
    /// Instants outside the nanosecond range (years 1677-2262) are clamped.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(to_nanos_saturating(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.nanos.store(to_nanos_saturating(instant), Ordering::SeqCst);
    }

    /// Move the clock by `by`, saturating at the ends of the nanosecond range
    pub fn advance(&self, by: Duration) {
        let step = by
            .num_nanoseconds()
            .unwrap_or(if by < Duration::zero() { i64::MIN } else { i64::MAX });
        // The closure always returns Some, so the update cannot fail
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(step))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn to_nanos_saturating(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_nanos_opt().unwrap_or(if instant.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
