//! Event record and creation draft.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EventKey, UserId};

/// City recorded when the organizer gives none.
pub const DEFAULT_CITY: &str = "Default City";
/// Topics recorded when the organizer gives none.
pub const DEFAULT_TOPICS: [&str; 2] = ["Default", "Topic"];

/// Rejected event draft.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// Events must be named.
    #[error("event name is required")]
    MissingName,
}

/// Authoritative, published event with a finite seat pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Identity, scoped under the organizer.
    pub key: EventKey,
    /// Display name; also the secondary sort key of every query.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Organizer user id; always equal to `key.organizer`.
    pub organizer_id: UserId,
    /// Topic tags.
    pub topics: BTreeSet<String>,
    /// Host city.
    pub city: String,
    /// First day, if scheduled.
    pub start_date: Option<DateTime<Utc>>,
    /// Last day, if scheduled.
    pub end_date: Option<DateTime<Utc>>,
    /// Month of `start_date` (1-12), `0` when unscheduled.
    pub month: u32,
    /// Seat capacity.
    pub max_attendees: u32,
    /// Seats not yet reserved.
    pub seats_available: u32,
}

/// Organizer-supplied fields for a new event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventDraft {
    /// Required display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Topic tags; defaults apply when empty.
    pub topics: BTreeSet<String>,
    /// Host city; defaults apply when empty.
    pub city: String,
    /// First day.
    pub start_date: Option<DateTime<Utc>>,
    /// Last day.
    pub end_date: Option<DateTime<Utc>>,
    /// Seat capacity.
    pub max_attendees: u32,
}

impl EventDraft {
    /// Draft with just a name and a capacity.
    pub fn new(name: impl Into<String>, max_attendees: u32) -> Self {
        Self {
            name: name.into(),
            max_attendees,
            ..Self::default()
        }
    }

    /// Checks the draft can become a record.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.name.trim().is_empty() {
            return Err(DraftError::MissingName);
        }
        Ok(())
    }

    /// Materializes the record under `key`, filling defaults and derived fields.
    pub fn into_record(self, key: EventKey) -> EventRecord {
        let city = if self.city.is_empty() {
            DEFAULT_CITY.to_string()
        } else {
            self.city
        };
        let topics = if self.topics.is_empty() {
            DEFAULT_TOPICS.iter().map(|t| (*t).to_string()).collect()
        } else {
            self.topics
        };

        EventRecord {
            organizer_id: key.organizer.clone(),
            key,
            name: self.name,
            description: self.description,
            topics,
            city,
            month: self.start_date.map_or(0, |d| d.month()),
            start_date: self.start_date,
            end_date: self.end_date,
            max_attendees: self.max_attendees,
            seats_available: self.max_attendees,
        }
    }
}

impl EventRecord {
    /// Seats currently held by attendees.
    pub fn seats_taken(&self) -> u32 {
        self.max_attendees.saturating_sub(self.seats_available)
    }
}
