//! Atomic seat reservation and release.
//!
//! A registration change reads the attendee's profile and the event, decides, and
//! commits both records as one [`Transaction`] guarded by the versions it read. Two
//! attendees racing for the last seat both read `seats_available == 1`, but only the
//! first commit applies; the second sees a stale version, re-reads, and reports
//! [`ConflictReason::NoSeatsAvailable`]. Registrations for unrelated events or users
//! never touch the same records and so never contend.

use std::fmt;

use hashbrown::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::RetryPolicy,
    core::txn::{Transaction, TxnScope},
    event::EventRecord,
    op::Write,
    profile::UserRecord,
    types::{EventKey, Principal, RecordKey, UserId},
};

use super::traits::{Datastore, DatastoreError};

/// Business rule that blocked a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The user already holds a seat.
    AlreadyRegistered,
    /// Every seat is taken.
    NoSeatsAvailable,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => f.write_str("already registered"),
            Self::NoSeatsAvailable => f.write_str("no seats available"),
        }
    }
}

/// Registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The event does not exist.
    #[error("no such event: {0}")]
    NotFound(EventKey),
    /// A business rule rejected the change.
    #[error("{0}")]
    Conflict(ConflictReason),
    /// The commit could not be applied; nothing was written and the call may be repeated.
    #[error("transaction aborted after {attempts} attempt(s): {source}")]
    TransactionAborted {
        /// Attempts made.
        attempts: u32,
        /// Last commit failure.
        source: DatastoreError,
    },
    /// The datastore failed while reading.
    #[error("datastore unavailable: {0}")]
    StoreUnavailable(String),
}

/// An attended event with its organizer's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendingEvent {
    /// The event.
    pub event: EventRecord,
    /// Organizer display name, empty when the organizer has no profile.
    pub organizer_display_name: String,
}

enum AttemptError {
    Retry(DatastoreError),
    Abort(DatastoreError),
    Fail(RegistrationError),
}

/// Registers and unregisters users against events.
#[derive(Debug, Clone)]
pub struct RegistrationEngine<D> {
    store: D,
    retry: RetryPolicy,
}

impl<D: Datastore> RegistrationEngine<D> {
    /// Engine over `store`, retrying lost commit races per `retry`.
    pub fn new(store: D, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Underlying datastore.
    pub fn store(&self) -> &D {
        &self.store
    }

    /// Reserves (`want_registered`) or releases one seat for `principal`.
    ///
    /// Returns whether anything changed; releasing a seat the user does not hold is a
    /// no-op returning `false`.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotFound`] for an unknown event, [`RegistrationError::Conflict`]
    /// when already registered or sold out, [`RegistrationError::TransactionAborted`] when
    /// the commit kept losing races or failed, [`RegistrationError::StoreUnavailable`]
    /// when reads fail.
    #[instrument(skip(self, principal, key), fields(user_id = %principal.user_id, event_key = %key))]
    pub async fn set_registration(
        &self,
        principal: &Principal,
        key: &EventKey,
        want_registered: bool,
    ) -> Result<bool, RegistrationError> {
        let mut attempt = 1u32;
        loop {
            match self.try_once(principal, key, want_registered).await {
                Ok(changed) => {
                    if changed {
                        info!(attempt, want_registered, "registration changed");
                    }
                    return Ok(changed);
                }
                Err(AttemptError::Retry(err)) if attempt < self.retry.max_attempts => {
                    debug!(attempt, error = %err, "commit lost a race; retrying");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(AttemptError::Retry(source) | AttemptError::Abort(source)) => {
                    warn!(attempt, error = %source, "registration aborted");
                    return Err(RegistrationError::TransactionAborted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(AttemptError::Fail(err)) => return Err(err),
            }
        }
    }

    async fn try_once(
        &self,
        principal: &Principal,
        key: &EventKey,
        want_registered: bool,
    ) -> Result<bool, AttemptError> {
        let user_key = RecordKey::User(principal.user_id.clone());
        let event_key = RecordKey::Event(key.clone());
        let scope = TxnScope::new([user_key.clone(), event_key.clone()]);
        if scope.is_cross_group() && !self.store.capabilities().cross_group_commit {
            return Err(AttemptError::Fail(RegistrationError::StoreUnavailable(
                "backend cannot commit across ownership groups".to_string(),
            )));
        }

        let (user_version, mut user) = match self
            .store
            .get_user(&principal.user_id)
            .await
            .map_err(read_failure)?
        {
            Some(found) => (found.version, found.record),
            None => (0, UserRecord::with_defaults(principal)),
        };

        let Some(found) = self.store.get_event(key).await.map_err(read_failure)? else {
            return Err(AttemptError::Fail(RegistrationError::NotFound(key.clone())));
        };
        let (event_version, mut event) = (found.version, found.record);

        let changed = match (want_registered, user.attending_position(key)) {
            (true, Some(_)) => {
                return Err(AttemptError::Fail(RegistrationError::Conflict(
                    ConflictReason::AlreadyRegistered,
                )));
            }
            (true, None) => {
                if event.seats_available == 0 {
                    return Err(AttemptError::Fail(RegistrationError::Conflict(
                        ConflictReason::NoSeatsAvailable,
                    )));
                }
                user.attending.push(key.clone());
                event.seats_available -= 1;
                true
            }
            (false, Some(pos)) => {
                user.attending.remove(pos);
                event.seats_available = event.seats_available.saturating_add(1);
                true
            }
            (false, None) => false,
        };

        let txn = Transaction::new(scope)
            .read(user_key, user_version)
            .read(event_key, event_version);
        let txn = if changed {
            txn.write(Write::User(user)).write(Write::Event(event))
        } else if user_version == 0 {
            // First access: persist the default profile even though no seat moved.
            txn.write(Write::User(user))
        } else {
            return Ok(false);
        };

        match self.store.commit(txn).await {
            Ok(_) => Ok(changed),
            Err(err @ DatastoreError::Conflict(_)) => Err(AttemptError::Retry(err)),
            Err(err) => Err(AttemptError::Abort(err)),
        }
    }

    /// Events `user_id` attends, in registration order, with organizer names.
    ///
    /// Keys that no longer resolve are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::StoreUnavailable`] when reads fail.
    pub async fn list_attending(&self, user_id: &UserId) -> Result<Vec<AttendingEvent>, RegistrationError> {
        let Some(user) = self.store.get_user(user_id).await.map_err(unavailable)? else {
            return Ok(Vec::new());
        };
        let keys = user.record.attending;

        let fetched = self.store.get_events(&keys).await.map_err(unavailable)?;
        let mut events = Vec::with_capacity(keys.len());
        for (key, event) in keys.iter().zip(fetched) {
            match event {
                Some(event) => events.push(event),
                None => warn!(user_id = %user_id, event_key = %key, "attending key does not resolve"),
            }
        }

        let mut organizers: Vec<UserId> = events.iter().map(|e| e.organizer_id.clone()).collect();
        organizers.sort();
        organizers.dedup();
        let profiles = self.store.get_users(&organizers).await.map_err(unavailable)?;
        let names: HashMap<UserId, String> = organizers
            .into_iter()
            .zip(profiles)
            .filter_map(|(id, profile)| profile.map(|p| (id, p.display_name)))
            .collect();

        Ok(events
            .into_iter()
            .map(|event| AttendingEvent {
                organizer_display_name: names.get(&event.organizer_id).cloned().unwrap_or_default(),
                event,
            })
            .collect())
    }
}

fn unavailable(err: DatastoreError) -> RegistrationError {
    RegistrationError::StoreUnavailable(err.to_string())
}

fn read_failure(err: DatastoreError) -> AttemptError {
    AttemptError::Fail(unavailable(err))
}
