//! Event domain model.
//!
//! # Responsibility
//! - Define the live record owned by the entity store.
//! - Define creation and patch payloads with explicit validation.
//!
//! # Invariants
//! - `id` is assigned by storage and never reused for another event.
//! - `title` is never blank after trimming.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-generated identifier of an event row.
pub type EventId = i64;

/// Live event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    /// Unix epoch milliseconds.
    pub date: i64,
}

/// Payload for creating an event. The id is generated on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    /// Unix epoch milliseconds.
    pub date: i64,
}

/// Partial update for an existing event; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<i64>,
}

/// Validation failures for event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    BlankTitle,
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "event title must not be blank"),
        }
    }
}

impl Error for EventValidationError {}

impl NewEvent {
    pub fn new(title: impl Into<String>, date: i64) -> Self {
        Self {
            title: title.into(),
            date,
        }
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        validate_title(&self.title)
    }
}

impl Event {
    pub fn validate(&self) -> Result<(), EventValidationError> {
        validate_title(&self.title)
    }

    /// Returns a copy of this event with `patch` applied.
    pub fn patched(&self, patch: &EventPatch) -> Event {
        Event {
            id: self.id,
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            date: patch.date.unwrap_or(self.date),
        }
    }
}

impl EventPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            date: None,
        }
    }

    pub fn date(date: i64) -> Self {
        Self {
            title: None,
            date: Some(date),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_date(mut self, date: i64) -> Self {
        self.date = Some(date);
        self
    }
}

fn validate_title(title: &str) -> Result<(), EventValidationError> {
    if title.trim().is_empty() {
        return Err(EventValidationError::BlankTitle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Event, EventPatch, EventValidationError, NewEvent};

    #[test]
    fn blank_titles_are_rejected() {
        assert_eq!(
            NewEvent::new("  \n", 0).validate(),
            Err(EventValidationError::BlankTitle)
        );
        assert!(NewEvent::new("standup", 0).validate().is_ok());
    }

    #[test]
    fn patch_only_touches_provided_fields() {
        let event = Event {
            id: 7,
            title: "launch".to_string(),
            date: 1_000,
        };

        let retitled = event.patched(&EventPatch::title("launch (rescheduled)"));
        assert_eq!(retitled.title, "launch (rescheduled)");
        assert_eq!(retitled.date, 1_000);

        let moved = event.patched(&EventPatch::date(2_000));
        assert_eq!(moved.title, "launch");
        assert_eq!(moved.date, 2_000);

        assert_eq!(event.patched(&EventPatch::default()), event);
    }
}
