//! Half-open time windows for store scans and aggregation

use crate::error::QueryError;
use chrono::{DateTime, Duration, Utc};

/// Named window sizes for trailing-window queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSize {
    Min15,
    Hour1,
    Hour6,
    Hour24,
}

impl WindowSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowSize::Min15 => "15m",
            WindowSize::Hour1 => "1h",
            WindowSize::Hour6 => "6h",
            WindowSize::Hour24 => "24h",
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            WindowSize::Min15 => 15 * 60,
            WindowSize::Hour1 => 60 * 60,
            WindowSize::Hour6 => 6 * 60 * 60,
            WindowSize::Hour24 => 24 * 60 * 60,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "15m" => Some(WindowSize::Min15),
            "1h" => Some(WindowSize::Hour1),
            "6h" => Some(WindowSize::Hour6),
            "24h" => Some(WindowSize::Hour24),
            _ => None,
        }
    }

    pub fn all() -> [WindowSize; 4] {
        [
            WindowSize::Min15,
            WindowSize::Hour1,
            WindowSize::Hour6,
            WindowSize::Hour24,
        ]
    }
}

/// Time range `[start, end)`; construction guarantees `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, QueryError> {
        if start >= end {
            return Err(QueryError::InvalidArgument(format!(
                "Invalid time range: start ({}) must be before end ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of the given size ending at `now`
    pub fn trailing(now: DateTime<Utc>, size: WindowSize) -> Self {
        Self {
            start: now - Duration::seconds(size.duration_secs()),
            end: now,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `start <= instant < end`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Window length in fractional hours (millisecond resolution)
    pub fn hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }
}
