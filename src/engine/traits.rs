use async_trait::async_trait;
use thiserror::Error;

use crate::{
    alert::Alert,
    core::{store::Versioned, txn::Transaction},
    event::{EventDraft, EventRecord},
    profile::UserRecord,
    query::QuerySpec,
    types::{EventKey, OpSeq, Principal, RecordKey, UserId},
};

/// Failure reported by a [`Datastore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatastoreError {
    /// A record read by the transaction changed before commit; retrying may succeed.
    #[error("concurrent modification of {0}")]
    Conflict(RecordKey),
    /// The transaction touched a record outside its declared scope.
    #[error("{0} is outside the transaction scope")]
    OutOfScope(RecordKey),
    /// The backend could not serve the request.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// What a backend can do atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Commits may span records owned by different users.
    pub cross_group_commit: bool,
}

/// Transactional key/value store holding users and events.
///
/// Reads return the record version observed, and [`Datastore::commit`] applies a
/// [`Transaction`] only if none of its read versions went stale in the meantime.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Atomicity guarantees of this backend.
    fn capabilities(&self) -> Capabilities;

    /// Point lookup of a user.
    async fn get_user(&self, id: &UserId) -> Result<Option<Versioned<UserRecord>>, DatastoreError>;

    /// Batch lookup of users, positionally aligned with `ids`.
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<Option<UserRecord>>, DatastoreError>;

    /// Point lookup of an event.
    async fn get_event(&self, key: &EventKey) -> Result<Option<Versioned<EventRecord>>, DatastoreError>;

    /// Batch lookup of events, positionally aligned with `keys`.
    async fn get_events(&self, keys: &[EventKey]) -> Result<Vec<Option<EventRecord>>, DatastoreError>;

    /// Returns the user's profile, atomically creating it with defaults if absent.
    async fn ensure_user(&self, principal: &Principal) -> Result<Versioned<UserRecord>, DatastoreError>;

    /// Allocates a key under `organizer` and stores the new event.
    async fn insert_event(&self, organizer: &UserId, draft: EventDraft) -> Result<EventRecord, DatastoreError>;

    /// Events published by `organizer`, in creation order.
    async fn events_by_organizer(&self, organizer: &UserId) -> Result<Vec<EventRecord>, DatastoreError>;

    /// Executes a compiled query.
    async fn query_events(&self, spec: &QuerySpec) -> Result<Vec<EventRecord>, DatastoreError>;

    /// Applies all writes of `txn` atomically, or none of them.
    ///
    /// Returns the journal sequence of the commit, `None` when nothing was written.
    async fn commit(&self, txn: Transaction) -> Result<Option<OpSeq>, DatastoreError>;

    /// Appends an administrator alert.
    async fn post_alert(&self, alert: Alert) -> Result<(), DatastoreError>;

    /// Newest alert by posting time.
    async fn latest_alert(&self) -> Result<Option<Alert>, DatastoreError>;
}

/// Singleton announcement cell; absent and empty are distinct states.
pub trait AnnouncementCache: Send + Sync {
    /// Current value, `None` when absent.
    fn get(&self) -> Option<String>;
    /// Replaces the value.
    fn set(&self, announcement: String);
    /// Removes the value entirely.
    fn delete(&self);
}
