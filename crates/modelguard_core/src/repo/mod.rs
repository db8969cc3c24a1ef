//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence collaborator contract used by lifecycle operations.
//! - Isolate SQLite query details from the recovery protocol and services.
//!
//! # Invariants
//! - Repository writes validate before persistence.
//! - Repository APIs return semantic errors (`Validation`, `NotFound`) in
//!   addition to DB transport errors.

pub mod record_repo;
