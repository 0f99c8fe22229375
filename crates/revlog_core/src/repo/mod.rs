//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for live events and the revision log.
//! - Isolate SQLite query details from session orchestration.
//!
//! # Invariants
//! - Repository writes must enforce payload validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.
//! - Repositories never open transactions; the caller's scope owns atomicity.

pub mod event_repo;
pub mod revision_repo;
mod schema;
