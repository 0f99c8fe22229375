//! Audit reader over `events_audit` and `revisions`.

use crate::model::event::{Event, EventId};
use crate::model::revision::{Revision, RevisionInfo, RevisionNumber, RevisionType};
use crate::repo::event_repo::{RepoError, RepoResult};
use crate::repo::revision_repo::{RevisionHistory, SqliteRevisionRepository};
use log::debug;
use rusqlite::Connection;

/// Read-only view of event history.
///
/// Obtain one from `Store::audit_reader`, from an open
/// `AuditedTransaction`, or from any migrated connection via `try_new`.
pub struct AuditReader<'conn> {
    history: SqliteRevisionRepository<'conn>,
}

impl<'conn> AuditReader<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        Ok(Self {
            history: SqliteRevisionRepository::try_new(conn)?,
        })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self {
            history: SqliteRevisionRepository::new_unchecked(conn),
        }
    }

    /// Returns the event as it was at `revision`.
    ///
    /// Picks the newest audit row for `entity_id` at or below `revision`.
    /// Fails with `RevisionNotFound` when the event had not been created yet
    /// or had already been deleted at that revision.
    pub fn find_as_of(&self, entity_id: EventId, revision: RevisionNumber) -> RepoResult<Event> {
        ensure_valid_revision(revision)?;

        let found = self.history.at_or_before(entity_id, revision)?;
        match found {
            Some(row) if row.revision_type != RevisionType::Del => {
                debug!(
                    "event=audit_find module=audit status=ok entity_id={} requested_rev={} matched_rev={}",
                    entity_id, revision, row.revision_number
                );
                Ok(row.to_event())
            }
            other => {
                debug!(
                    "event=audit_find module=audit status=not_found entity_id={} requested_rev={} deleted={}",
                    entity_id,
                    revision,
                    other.is_some()
                );
                Err(RepoError::RevisionNotFound {
                    entity_id,
                    revision,
                })
            }
        }
    }

    /// Returns the audit row recorded for `entity_id` by exactly `revision`.
    pub fn find_revision(
        &self,
        entity_id: EventId,
        revision: RevisionNumber,
    ) -> RepoResult<Revision> {
        ensure_valid_revision(revision)?;
        self.history
            .exact(entity_id, revision)?
            .ok_or(RepoError::RevisionNotFound {
                entity_id,
                revision,
            })
    }

    /// Returns the newest audit row for `entity_id`, including `Del` rows.
    pub fn find_latest(&self, entity_id: EventId) -> RepoResult<Option<Revision>> {
        self.history.latest_for_entity(entity_id)
    }

    /// Revision numbers that touched `entity_id`, ascending.
    pub fn revisions_of(&self, entity_id: EventId) -> RepoResult<Vec<RevisionNumber>> {
        Ok(self
            .history
            .history(entity_id)?
            .into_iter()
            .map(|row| row.revision_number)
            .collect())
    }

    /// Full audit trail of `entity_id`, ascending by revision.
    pub fn history(&self, entity_id: EventId) -> RepoResult<Vec<Revision>> {
        self.history.history(entity_id)
    }

    pub fn revision_info(&self, revision: RevisionNumber) -> RepoResult<RevisionInfo> {
        ensure_valid_revision(revision)?;
        self.history
            .revision_info(revision)?
            .ok_or(RepoError::UnknownRevision(revision))
    }

    /// Commit time of `revision` in epoch milliseconds.
    pub fn revision_date(&self, revision: RevisionNumber) -> RepoResult<i64> {
        Ok(self.revision_info(revision)?.committed_at)
    }

    /// Highest revision committed at or before `epoch_ms`.
    pub fn revision_for_date(&self, epoch_ms: i64) -> RepoResult<RevisionNumber> {
        self.history
            .revision_at(epoch_ms)?
            .map(|info| info.number)
            .ok_or(RepoError::NoRevisionAt(epoch_ms))
    }

    /// Newest committed revision, or `None` on an empty log.
    pub fn latest_revision(&self) -> RepoResult<Option<RevisionInfo>> {
        self.history.latest_revision()
    }

    /// Every entity change recorded by `revision`.
    pub fn changes_in_revision(&self, revision: RevisionNumber) -> RepoResult<Vec<Revision>> {
        self.revision_info(revision)?;
        self.history.changes_in(revision)
    }
}

fn ensure_valid_revision(revision: RevisionNumber) -> RepoResult<()> {
    if revision < 1 {
        return Err(RepoError::InvalidRevision(revision));
    }
    Ok(())
}
