//! # Event ingestion pipeline
//!
//! Turns untrusted batches of machine events into stored records:
//! 1. Validation (required fields, duration range, future tolerance)
//! 2. Server-side arrival stamp from the injected `Clock`
//! 3. Insert-if-absent keyed by event id
//! 4. Conflict resolution on collision: dedupe identical payloads, last
//!    writer wins on arrival stamp, revision-guarded replace
//!
//! Every record gets exactly one outcome (`ACCEPTED`, `DEDUPED`, `UPDATED`
//! or `REJECTED` with a reason). A batch never fails as a whole.
//!
//! ## Module Organization
//!
//! - `types` - Wire and domain types (RawEvent, MachineEvent, BatchResult)
//! - `validator` - Pure validation rules
//! - `engine` - IngestionEngine (per-record algorithm)

pub mod engine;
pub mod types;
pub mod validator;

pub use engine::IngestionEngine;
pub use types::{
    BatchResult, EventPayload, IngestOutcome, MachineEvent, RawEvent, RecordOutcome,
    RecordStatus, Rejection, UNKNOWN_DEFECT_COUNT,
};
pub use validator::{validate, ValidatedEvent};
