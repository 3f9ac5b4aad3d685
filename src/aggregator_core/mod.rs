//! Aggregation core - windowed statistics over stored events
//!
//! # Architecture
//!
//! ```text
//! RecordStore (scan / count, half-open window)
//!     ↓
//! AggregationEngine
//!     ├─ get_stats      → StatsResult (events, defects, defects/hour, health)
//!     └─ get_top_lines  → Vec<LineRanking> (defects per 100 events, ranked)
//! ```

pub mod stats;
pub mod window;

pub use stats::{AggregationEngine, HealthStatus, LineRanking, StatsResult, WARNING_DEFECT_RATE};
pub use window::{TimeWindow, WindowSize};
