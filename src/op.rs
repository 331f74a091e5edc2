//! Journal operations.
//!
//! Every op records the version each record reached when it was applied, so replay
//! can prove it rebuilds exactly the state that was acknowledged.

use serde::{Deserialize, Serialize};

use crate::{
    alert::Alert,
    event::EventRecord,
    profile::UserRecord,
    types::{OpSeq, RecordKey, Version},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 2;

/// Full-record write inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Write {
    /// Replace (or create) a user profile.
    User(UserRecord),
    /// Replace an event.
    Event(EventRecord),
}

impl Write {
    /// Key of the written record.
    pub fn key(&self) -> RecordKey {
        match self {
            Self::User(user) => RecordKey::User(user.user_id.clone()),
            Self::Event(event) => RecordKey::Event(event.key.clone()),
        }
    }
}

/// A committed write and the record version it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournaledWrite {
    /// Version of the record after this write.
    pub version: Version,
    /// The write itself.
    pub write: Write,
}

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// A newly published event, at version 1.
    CreateEvent {
        /// Inserted record.
        event: EventRecord,
    },
    /// A user profile created with defaults on first access, at version 1.
    CreateUser {
        /// Inserted record.
        user: UserRecord,
    },
    /// An atomic multi-record commit.
    Commit {
        /// All writes of the transaction, applied together.
        writes: Vec<JournaledWrite>,
    },
    /// An administrator alert.
    PostAlert {
        /// The alert.
        alert: Alert,
    },
}

impl Op {
    /// Stable journal label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateEvent { .. } => "create_event",
            Self::CreateUser { .. } => "create_user",
            Self::Commit { .. } => "commit",
            Self::PostAlert { .. } => "post_alert",
        }
    }

    /// Every record this op wrote, with the version it left behind.
    pub fn record_versions(&self) -> Vec<(RecordKey, Version)> {
        match self {
            Self::CreateEvent { event } => vec![(RecordKey::Event(event.key.clone()), 1)],
            Self::CreateUser { user } => vec![(RecordKey::User(user.user_id.clone()), 1)],
            Self::Commit { writes } => writes.iter().map(|w| (w.write.key(), w.version)).collect(),
            Self::PostAlert { .. } => Vec::new(),
        }
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Gapless, monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
