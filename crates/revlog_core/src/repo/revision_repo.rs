//! Revision log contracts and SQLite implementation.
//!
//! # Responsibility
//! - Allocate global revision numbers (`revisions` table).
//! - Append immutable event snapshots (`events_audit` table).
//! - Answer raw history queries for the audit reader.
//!
//! # Invariants
//! - Revision numbers come from an `AUTOINCREMENT` key inside the caller's
//!   write transaction, so concurrent commits never share a number.
//! - Per entity, revisions are appended in strictly increasing order;
//!   an append at or below an already-recorded revision is a `Conflict`.
//! - Audit rows are only ever inserted. Schema triggers reject updates and
//!   deletes on both tables.

use crate::model::event::EventId;
use crate::model::revision::{
    EventSnapshot, Revision, RevisionInfo, RevisionNumber, RevisionType,
};
use crate::repo::event_repo::{RepoError, RepoResult};
use crate::repo::schema::ensure_tables_ready;
use rusqlite::{params, Connection, OptionalExtension, Row};

const REVISION_SELECT_SQL: &str = "SELECT
    a.event_id AS event_id,
    a.rev AS rev,
    a.revtype AS revtype,
    a.title AS title,
    a.event_date AS event_date,
    r.committed_at AS committed_at
FROM events_audit a
INNER JOIN revisions r ON r.rev = a.rev";

const REVISIONS_COLUMNS: &[&str] = &["rev", "committed_at"];
const EVENTS_AUDIT_COLUMNS: &[&str] = &["event_id", "rev", "revtype", "title", "event_date"];

/// Write side of the audit log. Driven only by `AuditedTransaction`, which
/// allocates one revision per commit and appends each changed entity once.
pub(crate) trait RevisionLog {
    /// Allocates the next global revision number.
    fn allocate_revision(&self, committed_at: i64) -> RepoResult<RevisionInfo>;
    /// Inserts `snapshot` for `entity_id` under `revision`.
    fn append(
        &self,
        revision: RevisionNumber,
        entity_id: EventId,
        kind: RevisionType,
        snapshot: &EventSnapshot,
    ) -> RepoResult<RevisionNumber>;
}

/// Read side of the audit log.
pub trait RevisionHistory {
    /// Newest row for `entity_id` with `rev <= revision`.
    fn at_or_before(&self, entity_id: EventId, revision: RevisionNumber)
        -> RepoResult<Option<Revision>>;
    /// Row for exactly `(entity_id, revision)`.
    fn exact(&self, entity_id: EventId, revision: RevisionNumber) -> RepoResult<Option<Revision>>;
    /// Newest row for `entity_id`, if any.
    fn latest_for_entity(&self, entity_id: EventId) -> RepoResult<Option<Revision>>;
    /// All rows for `entity_id`, oldest first.
    fn history(&self, entity_id: EventId) -> RepoResult<Vec<Revision>>;
    /// All rows recorded by `revision`, ordered by entity id.
    fn changes_in(&self, revision: RevisionNumber) -> RepoResult<Vec<Revision>>;
    fn revision_info(&self, revision: RevisionNumber) -> RepoResult<Option<RevisionInfo>>;
    /// Highest revision committed at or before `epoch_ms`.
    fn revision_at(&self, epoch_ms: i64) -> RepoResult<Option<RevisionInfo>>;
    fn latest_revision(&self) -> RepoResult<Option<RevisionInfo>>;
}

/// SQLite-backed revision log.
pub struct SqliteRevisionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRevisionRepository<'conn> {
    /// Constructs a repository after verifying the connection is migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables_ready(
            conn,
            &[
                ("revisions", REVISIONS_COLUMNS),
                ("events_audit", EVENTS_AUDIT_COLUMNS),
            ],
        )?;
        Ok(Self { conn })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RevisionLog for SqliteRevisionRepository<'_> {
    fn allocate_revision(&self, committed_at: i64) -> RepoResult<RevisionInfo> {
        self.conn.execute(
            "INSERT INTO revisions (committed_at) VALUES (?1);",
            [committed_at],
        )?;

        Ok(RevisionInfo {
            number: self.conn.last_insert_rowid(),
            committed_at,
        })
    }

    fn append(
        &self,
        revision: RevisionNumber,
        entity_id: EventId,
        kind: RevisionType,
        snapshot: &EventSnapshot,
    ) -> RepoResult<RevisionNumber> {
        if revision < 1 {
            return Err(RepoError::InvalidRevision(revision));
        }

        if let Some(existing) = self.latest_for_entity(entity_id)? {
            if existing.revision_number >= revision {
                return Err(RepoError::Conflict {
                    entity_id: Some(entity_id),
                    detail: format!(
                        "revision {revision} is not newer than recorded revision {}",
                        existing.revision_number
                    ),
                });
            }
        }

        self.conn.execute(
            "INSERT INTO events_audit (
                event_id,
                rev,
                revtype,
                title,
                event_date
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entity_id,
                revision,
                kind.code(),
                snapshot.title.as_str(),
                snapshot.date
            ],
        )?;
        Ok(revision)
    }
}

impl RevisionHistory for SqliteRevisionRepository<'_> {
    fn at_or_before(
        &self,
        entity_id: EventId,
        revision: RevisionNumber,
    ) -> RepoResult<Option<Revision>> {
        self.query_one(
            &format!(
                "{REVISION_SELECT_SQL}
                 WHERE a.event_id = ?1 AND a.rev <= ?2
                 ORDER BY a.rev DESC
                 LIMIT 1;"
            ),
            params![entity_id, revision],
        )
    }

    fn exact(&self, entity_id: EventId, revision: RevisionNumber) -> RepoResult<Option<Revision>> {
        self.query_one(
            &format!("{REVISION_SELECT_SQL} WHERE a.event_id = ?1 AND a.rev = ?2;"),
            params![entity_id, revision],
        )
    }

    fn latest_for_entity(&self, entity_id: EventId) -> RepoResult<Option<Revision>> {
        self.query_one(
            &format!(
                "{REVISION_SELECT_SQL}
                 WHERE a.event_id = ?1
                 ORDER BY a.rev DESC
                 LIMIT 1;"
            ),
            params![entity_id],
        )
    }

    fn history(&self, entity_id: EventId) -> RepoResult<Vec<Revision>> {
        self.query_many(
            &format!("{REVISION_SELECT_SQL} WHERE a.event_id = ?1 ORDER BY a.rev ASC;"),
            params![entity_id],
        )
    }

    fn changes_in(&self, revision: RevisionNumber) -> RepoResult<Vec<Revision>> {
        self.query_many(
            &format!("{REVISION_SELECT_SQL} WHERE a.rev = ?1 ORDER BY a.event_id ASC;"),
            params![revision],
        )
    }

    fn revision_info(&self, revision: RevisionNumber) -> RepoResult<Option<RevisionInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT rev, committed_at FROM revisions WHERE rev = ?1;",
                [revision],
                parse_revision_info_row,
            )
            .optional()?;
        Ok(info)
    }

    fn revision_at(&self, epoch_ms: i64) -> RepoResult<Option<RevisionInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT rev, committed_at
                 FROM revisions
                 WHERE committed_at <= ?1
                 ORDER BY rev DESC
                 LIMIT 1;",
                [epoch_ms],
                parse_revision_info_row,
            )
            .optional()?;
        Ok(info)
    }

    fn latest_revision(&self) -> RepoResult<Option<RevisionInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT rev, committed_at FROM revisions ORDER BY rev DESC LIMIT 1;",
                [],
                parse_revision_info_row,
            )
            .optional()?;
        Ok(info)
    }
}

impl SqliteRevisionRepository<'_> {
    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> RepoResult<Option<Revision>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_revision_row(row)?));
        }
        Ok(None)
    }

    fn query_many(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Revision>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next()? {
            revisions.push(parse_revision_row(row)?);
        }
        Ok(revisions)
    }
}

fn parse_revision_row(row: &Row<'_>) -> RepoResult<Revision> {
    let code: i64 = row.get("revtype")?;
    let revision_type = RevisionType::from_code(code).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid revision type `{code}` in events_audit.revtype"
        ))
    })?;

    Ok(Revision {
        entity_id: row.get("event_id")?,
        revision_number: row.get("rev")?,
        revision_type,
        title: row.get("title")?,
        date: row.get("event_date")?,
        committed_at: row.get("committed_at")?,
    })
}

fn parse_revision_info_row(row: &Row<'_>) -> rusqlite::Result<RevisionInfo> {
    Ok(RevisionInfo {
        number: row.get(0)?,
        committed_at: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{RevisionHistory, RevisionLog, SqliteRevisionRepository};
    use crate::db::open_db_in_memory;
    use crate::model::revision::{EventSnapshot, RevisionType};
    use crate::repo::event_repo::RepoError;

    fn snapshot(title: &str) -> EventSnapshot {
        EventSnapshot {
            title: title.to_string(),
            date: 0,
        }
    }

    #[test]
    fn out_of_order_append_is_a_conflict() {
        let conn = open_db_in_memory().unwrap();
        let log = SqliteRevisionRepository::try_new(&conn).unwrap();

        let older = log.allocate_revision(1).unwrap();
        let newer = log.allocate_revision(2).unwrap();
        assert!(newer.number > older.number);

        log.append(newer.number, 1, RevisionType::Add, &snapshot("raced"))
            .unwrap();
        let err = log
            .append(older.number, 1, RevisionType::Mod, &snapshot("raced"))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, RepoError::Conflict { entity_id: Some(1), .. }));

        assert_eq!(log.history(1).unwrap().len(), 1);
    }

    #[test]
    fn append_never_rewrites_a_recorded_revision() {
        let conn = open_db_in_memory().unwrap();
        let log = SqliteRevisionRepository::try_new(&conn).unwrap();
        let first = log.allocate_revision(1).unwrap();
        log.append(first.number, 7, RevisionType::Add, &snapshot("kept"))
            .unwrap();

        for kind in [RevisionType::Add, RevisionType::Mod, RevisionType::Del] {
            let err = log
                .append(first.number, 7, kind, &snapshot("forged"))
                .unwrap_err();
            assert!(matches!(err, RepoError::Conflict { entity_id: Some(7), .. }));
        }

        let history = log.history(7).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].revision_type, RevisionType::Add);
        assert_eq!(history[0].title, "kept");
    }

    #[test]
    fn revisions_below_one_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let log = SqliteRevisionRepository::try_new(&conn).unwrap();

        assert!(matches!(
            log.append(0, 1, RevisionType::Add, &snapshot("zero")),
            Err(RepoError::InvalidRevision(0))
        ));
    }
}
