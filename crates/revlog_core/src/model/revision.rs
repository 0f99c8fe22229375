//! Revision log model.
//!
//! # Responsibility
//! - Define the immutable audit row recorded per changed event per commit.
//! - Define the per-transaction revision metadata.
//!
//! # Invariants
//! - Revision numbers are global: one number per committing transaction,
//!   shared by every event it changed, strictly increasing across commits.
//! - A `Del` revision keeps the last-known snapshot of the event.

use crate::model::event::{Event, EventId};
use serde::{Deserialize, Serialize};

/// Global revision number allocated once per audited transaction.
pub type RevisionNumber = i64;

/// Kind of change a revision records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    /// Event was created.
    Add,
    /// Event fields changed.
    Mod,
    /// Event was deleted.
    Del,
}

impl RevisionType {
    /// Stable integer code persisted in `events_audit.revtype`.
    pub fn code(self) -> i64 {
        match self {
            Self::Add => 0,
            Self::Mod => 1,
            Self::Del => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Mod),
            2 => Some(Self::Del),
            _ => None,
        }
    }

    /// Folds a later change of the same event into the change already
    /// pending in the current transaction.
    ///
    /// Returns `None` when the two cancel out (created and deleted in one
    /// transaction), meaning no audit row should remain.
    pub fn merge(self, later: RevisionType) -> Option<RevisionType> {
        match (self, later) {
            (Self::Add, Self::Del) => None,
            (Self::Add, _) => Some(Self::Add),
            (_, Self::Del) => Some(Self::Del),
            (Self::Del, Self::Add) => Some(Self::Mod),
            (Self::Mod, _) | (Self::Del, _) => Some(later),
        }
    }
}

/// Metadata of one committed revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub number: RevisionNumber,
    /// Unix epoch milliseconds at which the revision was allocated.
    pub committed_at: i64,
}

/// Field values captured by a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub title: String,
    pub date: i64,
}

impl From<&Event> for EventSnapshot {
    fn from(value: &Event) -> Self {
        Self {
            title: value.title.clone(),
            date: value.date,
        }
    }
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub entity_id: EventId,
    pub revision_number: RevisionNumber,
    pub revision_type: RevisionType,
    pub title: String,
    pub date: i64,
    pub committed_at: i64,
}

impl Revision {
    /// Rebuilds the event exactly as it was captured by this revision.
    pub fn to_event(&self) -> Event {
        Event {
            id: self.entity_id,
            title: self.title.clone(),
            date: self.date,
        }
    }

    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            title: self.title.clone(),
            date: self.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RevisionType;

    #[test]
    fn codes_round_trip_and_reject_unknown_values() {
        for kind in [RevisionType::Add, RevisionType::Mod, RevisionType::Del] {
            assert_eq!(RevisionType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(RevisionType::from_code(3), None);
    }

    #[test]
    fn merge_collapses_changes_within_one_transaction() {
        assert_eq!(
            RevisionType::Add.merge(RevisionType::Mod),
            Some(RevisionType::Add)
        );
        assert_eq!(RevisionType::Add.merge(RevisionType::Del), None);
        assert_eq!(
            RevisionType::Mod.merge(RevisionType::Mod),
            Some(RevisionType::Mod)
        );
        assert_eq!(
            RevisionType::Mod.merge(RevisionType::Del),
            Some(RevisionType::Del)
        );
    }
}
