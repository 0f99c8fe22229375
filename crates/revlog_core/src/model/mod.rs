//! Domain model for audited events.
//!
//! # Responsibility
//! - Define the live `Event` record and its write payloads.
//! - Define the immutable revision records produced by the audit log.
//!
//! # Invariants
//! - Every event is identified by a store-generated `EventId`.
//! - Revisions are values; nothing in this module mutates history.

pub mod event;
pub mod revision;
