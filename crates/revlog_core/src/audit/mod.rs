//! Point-in-time read path over the revision log.
//!
//! # Responsibility
//! - Reconstruct events as they were at a given revision.
//! - Expose revision metadata (numbers, commit times, per-revision changes).
//!
//! # Invariants
//! - Reads return committed snapshots verbatim, or fail explicitly.
//! - The reader never writes.

mod reader;

pub use reader::AuditReader;
