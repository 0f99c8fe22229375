//! Core of revlog: an audited event store on SQLite.
//! Live event rows and their append-only revision history are written in
//! the same transaction, and the audit reader answers point-in-time reads.

pub mod audit;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod session;

pub use audit::AuditReader;
pub use config::{StoreConfig, StoreLocation, DEFAULT_BUSY_TIMEOUT};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogConfig,
};
pub use model::event::{Event, EventId, EventPatch, EventValidationError, NewEvent};
pub use model::revision::{EventSnapshot, Revision, RevisionInfo, RevisionNumber, RevisionType};
pub use repo::event_repo::{
    EventListQuery, EventRepository, RepoError, RepoResult, SqliteEventRepository,
};
pub use repo::revision_repo::{RevisionHistory, SqliteRevisionRepository};
pub use session::{AuditedTransaction, Store};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
