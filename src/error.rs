//! Crate-wide error surface used by [`crate::service::ConferenceService`].

use thiserror::Error;

use crate::{
    config::ConfigError,
    engine::{
        announcement::RefreshError,
        registration::{ConflictReason, RegistrationError},
        traits::DatastoreError,
    },
    event::DraftError,
    query::FilterError,
    types::{EventKey, KeyParseError},
};

/// Coarse classification of a [`ConferenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; retrying the same request fails the same way.
    Validation,
    /// The addressed record does not exist.
    NotFound,
    /// A business rule rejected the change.
    Conflict,
    /// The commit did not apply; nothing was written.
    TransactionAborted,
    /// The backend could not serve the request.
    StoreUnavailable,
}

/// Any failure surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ConferenceError {
    /// Caller filters did not compile.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// Event draft failed validation.
    #[error(transparent)]
    Draft(#[from] DraftError),
    /// Encoded event key was malformed.
    #[error(transparent)]
    Key(#[from] KeyParseError),
    /// No event under this key.
    #[error("no such event: {0}")]
    EventNotFound(EventKey),
    /// Registration failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// Announcement refresh failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("transaction aborted after {attempts} attempt(s): {source}")]
    /// A profile save did not commit.
    TransactionAborted {
        /// Commit attempts made.
        attempts: u32,
        /// Last commit failure.
        source: DatastoreError,
    },
    /// A read or single write failed in the datastore.
    #[error(transparent)]
    Store(#[from] DatastoreError),
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConferenceError {
    /// Classification used to pick a caller-facing status.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Filter(_) | Self::Draft(_) | Self::Key(_) | Self::Config(_) => ErrorKind::Validation,
            Self::EventNotFound(_) => ErrorKind::NotFound,
            Self::Registration(err) => match err {
                RegistrationError::NotFound(_) => ErrorKind::NotFound,
                RegistrationError::Conflict(
                    ConflictReason::AlreadyRegistered | ConflictReason::NoSeatsAvailable,
                ) => ErrorKind::Conflict,
                RegistrationError::TransactionAborted { .. } => ErrorKind::TransactionAborted,
                RegistrationError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            },
            Self::Refresh(RefreshError::Query(_)) => ErrorKind::Validation,
            Self::Refresh(RefreshError::StoreUnavailable(_)) => ErrorKind::StoreUnavailable,
            Self::TransactionAborted { .. } => ErrorKind::TransactionAborted,
            Self::Store(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionAborted
    }
}
