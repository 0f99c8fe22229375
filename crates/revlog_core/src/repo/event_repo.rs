//! Event repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide current-state CRUD over the `events` table.
//! - Own the repository error type shared by the revision log and reader.
//!
//! # Invariants
//! - Write paths validate payloads before SQL mutations.
//! - Read paths never return a default event for a missing id.
//! - This repository does not audit; `session::AuditedTransaction` pairs
//!   every write with a revision log append in the same transaction.

use crate::db::DbError;
use crate::model::event::{Event, EventId, EventValidationError, NewEvent};
use crate::model::revision::RevisionNumber;
use crate::repo::schema::ensure_tables_ready;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    title,
    event_date
FROM events";

const EVENT_COLUMNS: &[&str] = &["id", "title", "event_date"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for event persistence, revision log and audit queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(EventValidationError),
    Db(DbError),
    /// No live event with this id.
    NotFound(EventId),
    /// The event did not exist (or was deleted) as of `revision`.
    RevisionNotFound {
        entity_id: EventId,
        revision: RevisionNumber,
    },
    /// No committed revision carries this number.
    UnknownRevision(RevisionNumber),
    /// Revision numbers start at 1.
    InvalidRevision(RevisionNumber),
    /// No revision was committed at or before this epoch-millisecond instant.
    NoRevisionAt(i64),
    /// A competing writer held the database or a revision would be recorded
    /// out of order. The whole transaction should be retried.
    Conflict {
        entity_id: Option<EventId>,
        detail: String,
    },
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns whether this error reports a missing row of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::RevisionNotFound { .. }
                | Self::UnknownRevision(_)
                | Self::NoRevisionAt(_)
        )
    }

    pub(crate) fn from_db_lock(err: DbError, entity_id: Option<EventId>) -> Self {
        if err.is_busy() {
            Self::Conflict {
                entity_id,
                detail: err.to_string(),
            }
        } else {
            Self::Db(err)
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "event not found: {id}"),
            Self::RevisionNotFound {
                entity_id,
                revision,
            } => write!(f, "event {entity_id} not found at revision {revision}"),
            Self::UnknownRevision(revision) => write!(f, "revision does not exist: {revision}"),
            Self::InvalidRevision(revision) => {
                write!(f, "invalid revision number {revision}; expected >= 1")
            }
            Self::NoRevisionAt(epoch_ms) => {
                write!(f, "no revision committed at or before {epoch_ms}")
            }
            Self::Conflict {
                entity_id: Some(id),
                detail,
            } => write!(f, "conflicting write on event {id}: {detail}"),
            Self::Conflict {
                entity_id: None,
                detail,
            } => write!(f, "conflicting write: {detail}"),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} is behind required {expected_version}; open it through db::open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EventValidationError> for RepoError {
    fn from(value: EventValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing live events.
#[derive(Debug, Clone, Default)]
pub struct EventListQuery {
    /// Case-insensitive substring match on `title`.
    pub title_contains: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for live event state.
pub trait EventRepository {
    fn insert_event(&self, event: &NewEvent) -> RepoResult<Event>;
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    fn list_events(&self, query: &EventListQuery) -> RepoResult<Vec<Event>>;
    fn update_event(&self, event: &Event) -> RepoResult<()>;
    fn delete_event(&self, id: EventId) -> RepoResult<()>;
}

/// SQLite-backed event repository.
///
/// Accepts a plain connection or, through deref, an open transaction.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    /// Constructs a repository after verifying the connection is migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables_ready(conn, &[("events", EVENT_COLUMNS)])?;
        Ok(Self { conn })
    }

    /// Constructs a repository on a connection already verified by the
    /// owning `Store`.
    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn insert_event(&self, event: &NewEvent) -> RepoResult<Event> {
        event.validate()?;

        self.conn.execute(
            "INSERT INTO events (title, event_date) VALUES (?1, ?2);",
            params![event.title.as_str(), event.date],
        )?;

        Ok(Event {
            id: self.conn.last_insert_rowid(),
            title: event.title.clone(),
            date: event.date,
        })
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }

        Ok(None)
    }

    fn list_events(&self, query: &EventListQuery) -> RepoResult<Vec<Event>> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(needle) = query.title_contains.as_ref() {
            sql.push_str(" AND instr(lower(title), lower(?)) > 0");
            bind_values.push(Value::Text(needle.clone()));
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut events = Vec::new();

        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }

        Ok(events)
    }

    fn update_event(&self, event: &Event) -> RepoResult<()> {
        event.validate()?;

        let changed = self.conn.execute(
            "UPDATE events
             SET
                title = ?1,
                event_date = ?2
             WHERE id = ?3;",
            params![event.title.as_str(), event.date, event.id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(event.id));
        }

        Ok(())
    }

    fn delete_event(&self, id: EventId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM events WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let event = Event {
        id: row.get("id")?,
        title: row.get("title")?,
        date: row.get("event_date")?,
    };
    event.validate().map_err(|err| {
        RepoError::InvalidData(format!("event {} failed validation: {err}", event.id))
    })?;
    Ok(event)
}
