//! Windowed statistics over stored machine events
//!
//! Two read-only queries:
//! - `get_stats` - per-owner event count, defect sum, defects/hour, health
//! - `get_top_lines` - per-partition ranking of groups by defects per 100 events
//!
//! Events with the unknown defect sentinel count toward `events_count` but
//! never toward any defect figure.

use super::window::TimeWindow;
use crate::error::QueryError;
use crate::store::{DefectFilter, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Defects per hour at or above which an owner is flagged
pub const WARNING_DEFECT_RATE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

impl HealthStatus {
    pub fn from_rate(avg_defect_rate: f64) -> Self {
        if avg_defect_rate >= WARNING_DEFECT_RATE {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResult {
    pub owner_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events_count: u64,
    pub defects_count: i64,
    pub avg_defect_rate: f64,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRanking {
    pub group_id: String,
    pub total_defects: i64,
    pub event_count: u64,
    /// Defects per 100 events, two decimals
    pub defects_percent: f64,
}

/// Running totals for one group while scanning
#[derive(Debug)]
struct GroupTotals {
    group_id: String,
    total_defects: i64,
    event_count: u64,
}

pub struct AggregationEngine {
    store: Arc<dyn RecordStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn get_stats(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<StatsResult, QueryError> {
        let window = TimeWindow::new(start, end)?;
        self.get_stats_in(owner_id, &window).await
    }

    /// `get_stats` over an already-built window (e.g. `TimeWindow::trailing`)
    pub async fn get_stats_in(
        &self,
        owner_id: &str,
        window: &TimeWindow,
    ) -> Result<StatsResult, QueryError> {
        log::info!(
            "📊 Stats for {} in [{}, {})",
            owner_id,
            window.start().to_rfc3339(),
            window.end().to_rfc3339()
        );

        let events_count = self
            .store
            .count_by_owner_and_time_range(owner_id, window)
            .await?;

        let defects_count: i64 = self
            .store
            .scan_by_owner_and_time_range(owner_id, window, DefectFilter::ExcludeUnknown)
            .await?
            .iter()
            .map(|event| i64::from(event.payload.defect_count))
            .sum();

        let hours = window.hours();
        let avg_defect_rate = if hours <= 0.0 {
            0.0
        } else {
            defects_count as f64 / hours
        };
        let status = HealthStatus::from_rate(avg_defect_rate);

        log::debug!(
            "{}: events={}, defects={}, rate={:.3}, status={:?}",
            owner_id,
            events_count,
            defects_count,
            avg_defect_rate,
            status
        );

        Ok(StatsResult {
            owner_id: owner_id.to_string(),
            start: window.start(),
            end: window.end(),
            events_count,
            defects_count,
            avg_defect_rate,
            status,
        })
    }

    /// Groups of a partition ranked by `defects_percent`, highest first
    ///
    /// Ties keep the order in which groups were first seen in the scan.
    pub async fn get_top_lines(
        &self,
        partition_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LineRanking>, QueryError> {
        let window = TimeWindow::new(from, to)?;
        if limit <= 0 {
            return Err(QueryError::InvalidArgument(format!(
                "Limit must be positive, got {}",
                limit
            )));
        }

        log::info!(
            "📊 Top {} lines for {} in [{}, {})",
            limit,
            partition_id,
            from.to_rfc3339(),
            to.to_rfc3339()
        );

        let events = self
            .store
            .scan_by_partition_and_time_range(partition_id, &window, DefectFilter::ExcludeUnknown)
            .await?;

        let mut groups: Vec<GroupTotals> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for event in &events {
            let slot = match index.get(&event.payload.group_id) {
                Some(&slot) => slot,
                None => {
                    groups.push(GroupTotals {
                        group_id: event.payload.group_id.clone(),
                        total_defects: 0,
                        event_count: 0,
                    });
                    index.insert(event.payload.group_id.clone(), groups.len() - 1);
                    groups.len() - 1
                }
            };
            groups[slot].total_defects += i64::from(event.payload.defect_count);
            groups[slot].event_count += 1;
        }

        let mut rankings: Vec<LineRanking> = groups
            .into_iter()
            .map(|group| LineRanking {
                defects_percent: defects_percent(group.total_defects, group.event_count),
                group_id: group.group_id,
                total_defects: group.total_defects,
                event_count: group.event_count,
            })
            .collect();

        // Stable sort keeps first-seen order among equal percentages
        rankings.sort_by(|a, b| b.defects_percent.total_cmp(&a.defects_percent));
        rankings.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        log::debug!("{} lines ranked for {}", rankings.len(), partition_id);

        Ok(rankings)
    }
}

/// `total / count * 100`, rounded half away from zero to two decimals
fn defects_percent(total_defects: i64, event_count: u64) -> f64 {
    if event_count == 0 {
        return 0.0;
    }
    let percent = total_defects as f64 / event_count as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
