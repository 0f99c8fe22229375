//! Storage handle configuration.
//!
//! # Responsibility
//! - Describe where the event store lives and how writers wait on locks.
//!
//! # Invariants
//! - A config is plain data; nothing is opened until `Store::open`.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time a writer waits for the SQLite write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Backing location of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file; created when missing.
    File(PathBuf),
    /// Private in-memory database, discarded on close.
    Memory,
}

/// Configuration consumed by `Store::open` and `db::open_db_with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long a transaction waits for a competing writer before failing
    /// with a retryable conflict.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Config for a database file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Config for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub(crate) fn mode(&self) -> &'static str {
        match self.location {
            StoreLocation::File(_) => "file",
            StoreLocation::Memory => "memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreConfig, StoreLocation, DEFAULT_BUSY_TIMEOUT};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn constructors_use_default_busy_timeout() {
        let file = StoreConfig::file("/tmp/revlog.sqlite3");
        assert_eq!(
            file.location,
            StoreLocation::File(PathBuf::from("/tmp/revlog.sqlite3"))
        );
        assert_eq!(file.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert_eq!(file.mode(), "file");

        let memory = StoreConfig::in_memory();
        assert_eq!(memory.location, StoreLocation::Memory);
        assert_eq!(memory.mode(), "memory");
    }

    #[test]
    fn busy_timeout_can_be_overridden() {
        let config = StoreConfig::in_memory().with_busy_timeout(Duration::from_millis(250));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }
}
