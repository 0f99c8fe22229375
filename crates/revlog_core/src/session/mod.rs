//! Explicit store handle and audited transaction scope.
//!
//! # Responsibility
//! - Own the SQLite connection for its whole lifetime (`open` .. `close`).
//! - Run caller code inside one immediate write transaction.
//! - Pair every entity write with its revision log append.
//!
//! # Invariants
//! - Entity mutations and revision rows commit or roll back together.
//! - Changes are buffered per event and written to the revision log once,
//!   right before commit. A transaction allocates at most one revision
//!   number, and none when nothing is left to record.
//! - Rollback happens on `Err` and on panic (the inner
//!   `rusqlite::Transaction` rolls back when dropped).

use crate::audit::AuditReader;
use crate::config::StoreConfig;
use crate::db::{open_db_with, DbError};
use crate::model::event::{Event, EventId, EventPatch, NewEvent};
use crate::model::revision::{EventSnapshot, RevisionInfo, RevisionType};
use crate::repo::event_repo::{
    EventListQuery, EventRepository, RepoError, RepoResult, SqliteEventRepository,
};
use crate::repo::revision_repo::{RevisionHistory, RevisionLog, SqliteRevisionRepository};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Storage client handle. Construct with `open`, release with `close`.
pub struct Store {
    conn: Connection,
    config: StoreConfig,
    last_revision: Option<RevisionInfo>,
}

impl Store {
    /// Opens (and migrates) the database described by `config`.
    pub fn open(config: &StoreConfig) -> RepoResult<Self> {
        let conn = open_db_with(config)?;
        SqliteEventRepository::try_new(&conn)?;
        SqliteRevisionRepository::try_new(&conn)?;
        Ok(Self {
            conn,
            config: config.clone(),
            last_revision: None,
        })
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Revision recorded by the last successful `in_transaction` call;
    /// `None` when that transaction changed nothing.
    pub fn last_committed_revision(&self) -> Option<RevisionInfo> {
        self.last_revision
    }

    /// Raw connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `action` inside one audited write transaction.
    ///
    /// Commits when `action` returns `Ok`, rolls back otherwise. Lock
    /// contention with another writer surfaces as a retryable
    /// `RepoError::Conflict`.
    pub fn in_transaction<T, E, F>(&mut self, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut AuditedTransaction<'_>) -> Result<T, E>,
        E: From<RepoError>,
    {
        let started_at = Instant::now();
        self.last_revision = None;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| RepoError::from_db_lock(DbError::from(err), None))?;
        let mut audited = AuditedTransaction {
            tx,
            pending: BTreeMap::new(),
        };

        let outcome = action(&mut audited).and_then(|value| Ok((value, audited.flush()?)));
        let AuditedTransaction { tx, pending } = audited;

        match outcome {
            Ok((value, revision)) => {
                if let Err(err) = tx.commit() {
                    error!(
                        "event=tx_commit module=session status=error duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(RepoError::from_db_lock(DbError::from(err), None).into());
                }
                info!(
                    "event=tx_commit module=session status=ok rev={} changes={} duration_ms={}",
                    revision_label(revision),
                    pending.len(),
                    started_at.elapsed().as_millis()
                );
                self.last_revision = revision;
                Ok(value)
            }
            Err(err) => {
                match tx.rollback() {
                    Ok(()) => warn!(
                        "event=tx_rollback module=session status=ok discarded_changes={} duration_ms={}",
                        pending.len(),
                        started_at.elapsed().as_millis()
                    ),
                    Err(rollback_err) => error!(
                        "event=tx_rollback module=session status=error duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        rollback_err
                    ),
                }
                Err(err)
            }
        }
    }

    /// Audit reader over committed history.
    pub fn audit_reader(&self) -> AuditReader<'_> {
        AuditReader::new_unchecked(&self.conn)
    }

    /// Closes the underlying connection, reporting any close failure.
    pub fn close(self) -> RepoResult<()> {
        self.conn.close().map_err(|(_, err)| RepoError::from(err))?;
        info!("event=db_close module=session status=ok");
        Ok(())
    }
}

/// One open write transaction with auditing.
pub struct AuditedTransaction<'conn> {
    tx: Transaction<'conn>,
    pending: BTreeMap<EventId, PendingChange>,
}

/// Net change of one event within the open transaction.
#[derive(Debug)]
struct PendingChange {
    kind: RevisionType,
    snapshot: EventSnapshot,
}

impl AuditedTransaction<'_> {
    /// Inserts a new event and records an `Add` revision.
    pub fn create(&mut self, event: &NewEvent) -> RepoResult<EventId> {
        let created = self.events().insert_event(event)?;
        self.record_change(created.id, RevisionType::Add, EventSnapshot::from(&created));
        Ok(created.id)
    }

    /// Returns the live event or `NotFound`.
    pub fn read(&self, id: EventId) -> RepoResult<Event> {
        self.find(id)?.ok_or(RepoError::NotFound(id))
    }

    pub fn find(&self, id: EventId) -> RepoResult<Option<Event>> {
        self.events().get_event(id)
    }

    pub fn list(&self, query: &EventListQuery) -> RepoResult<Vec<Event>> {
        self.events().list_events(query)
    }

    /// Applies `patch` and records a `Mod` revision.
    ///
    /// A patch that leaves the event unchanged writes nothing.
    pub fn update(&mut self, id: EventId, patch: &EventPatch) -> RepoResult<()> {
        let current = self.read(id)?;
        let next = current.patched(patch);
        if next == current {
            debug!("event=event_update module=session status=skipped reason=unchanged entity_id={id}");
            return Ok(());
        }

        self.events().update_event(&next)?;
        self.record_change(id, RevisionType::Mod, EventSnapshot::from(&next));
        Ok(())
    }

    /// Deletes the live row and records a `Del` revision carrying the
    /// last-known snapshot.
    pub fn delete(&mut self, id: EventId) -> RepoResult<()> {
        let current = self.read(id)?;
        self.events().delete_event(id)?;
        self.record_change(id, RevisionType::Del, EventSnapshot::from(&current));
        Ok(())
    }

    /// Number of events with a change waiting to be recorded at commit.
    pub fn pending_changes(&self) -> usize {
        self.pending.len()
    }

    /// Audit reader over history committed before this transaction.
    pub fn audit_reader(&self) -> AuditReader<'_> {
        AuditReader::new_unchecked(&self.tx)
    }

    fn record_change(&mut self, entity_id: EventId, kind: RevisionType, snapshot: EventSnapshot) {
        let merged = match self.pending.remove(&entity_id) {
            Some(earlier) => earlier.kind.merge(kind),
            None => Some(kind),
        };
        if let Some(kind) = merged {
            self.pending.insert(entity_id, PendingChange { kind, snapshot });
        }
    }

    /// Allocates this commit's revision and appends one row per changed
    /// event.
    fn flush(&self) -> RepoResult<Option<RevisionInfo>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let revisions = self.revisions();
        // Commit times stay ordered with revision numbers even if the wall
        // clock steps backwards.
        let floor = revisions
            .latest_revision()?
            .map_or(0, |latest| latest.committed_at);
        let info = revisions.allocate_revision(now_epoch_ms().max(floor))?;
        for (entity_id, change) in &self.pending {
            revisions.append(info.number, *entity_id, change.kind, &change.snapshot)?;
        }
        debug!(
            "event=revision_append module=session status=ok rev={} committed_at={} changes={}",
            info.number,
            info.committed_at,
            self.pending.len()
        );
        Ok(Some(info))
    }

    fn events(&self) -> SqliteEventRepository<'_> {
        SqliteEventRepository::new_unchecked(&self.tx)
    }

    fn revisions(&self) -> SqliteRevisionRepository<'_> {
        SqliteRevisionRepository::new_unchecked(&self.tx)
    }
}

fn revision_label(revision: Option<RevisionInfo>) -> String {
    revision.map_or_else(|| "none".to_string(), |info| info.number.to_string())
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
