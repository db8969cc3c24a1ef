//! Domain model for guarded records.
//!
//! # Responsibility
//! - Define record, model identity and schema shapes used by core logic.
//! - Own mass-assignment rules and presence validation.
//!
//! # Invariants
//! - Every record is identified by a stable, non-nil `RecordId`.
//! - Mass assignment never partially applies: it either assigns every key or
//!   fails before touching the record.

pub mod record;
pub mod schema;
pub mod validation;
