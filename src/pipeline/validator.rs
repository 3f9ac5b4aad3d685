//! Structural and business-rule validation for incoming events
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. Required fields present (strings non-blank) -> `InvalidPayload`
//! 2. `0 <= duration_ms <= 21_600_000` -> `InvalidDuration`
//! 3. `occurred_at <= now + 15 minutes` -> `FutureEventTime`
//! 4. `occurred_at` within the storable range (nanoseconds since the epoch
//!    fit in an `i64`, roughly 1677-2262) -> `InvalidPayload`
//!
//! `defect_count` must fit in an `i32`; larger values are `InvalidPayload`.
//!
//! Pure: no I/O, no clock reads. `now` is passed in by the caller.

use super::types::{EventPayload, RawEvent};
use crate::error::RejectionReason;
use chrono::{DateTime, Duration, Utc};

pub const MIN_DURATION_MS: i64 = 0;

/// Six hours
pub const MAX_DURATION_MS: i64 = 21_600_000;

pub const FUTURE_TOLERANCE_MINUTES: i64 = 15;

/// A record that passed validation, with every required field unwrapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEvent {
    pub id: String,
    pub payload: EventPayload,
}

pub fn validate(raw: &RawEvent, now: DateTime<Utc>) -> Result<ValidatedEvent, RejectionReason> {
    let id = required_text(&raw.id)?;
    let occurred_at = raw.occurred_at.ok_or(RejectionReason::InvalidPayload)?;
    let owner_id = required_text(&raw.owner_id)?;
    let duration_ms = raw.duration_ms.ok_or(RejectionReason::InvalidPayload)?;
    let defect_count = raw
        .defect_count
        .and_then(|count| i32::try_from(count).ok())
        .ok_or(RejectionReason::InvalidPayload)?;
    let group_id = required_text(&raw.group_id)?;
    let partition_id = required_text(&raw.partition_id)?;

    if !(MIN_DURATION_MS..=MAX_DURATION_MS).contains(&duration_ms) {
        return Err(RejectionReason::InvalidDuration);
    }

    if occurred_at > now + Duration::minutes(FUTURE_TOLERANCE_MINUTES) {
        return Err(RejectionReason::FutureEventTime);
    }

    if occurred_at.timestamp_nanos_opt().is_none() {
        return Err(RejectionReason::InvalidPayload);
    }

    Ok(ValidatedEvent {
        id,
        payload: EventPayload {
            occurred_at,
            owner_id,
            duration_ms,
            defect_count,
            group_id,
            partition_id,
        },
    })
}

fn required_text(value: &Option<String>) -> Result<String, RejectionReason> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(RejectionReason::InvalidPayload),
    }
}
