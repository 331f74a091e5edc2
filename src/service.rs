//! Request-level facade over the engines.

use tracing::{debug, info, instrument, warn};

use crate::{
    alert::Alert,
    config::{ConferenceConfig, RetryPolicy},
    core::txn::{Transaction, TxnScope},
    engine::{
        announcement::ScarcityRefresher,
        registration::{AttendingEvent, RegistrationEngine},
        traits::{AnnouncementCache, Datastore, DatastoreError},
    },
    error::ConferenceError,
    event::{EventDraft, EventRecord},
    op::Write,
    profile::{ProfilePatch, UserRecord},
    query::{Clause, QuerySpec, compile_filters},
    types::{EventKey, Principal, RecordKey},
};

/// An event with its organizer's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventView {
    /// The event.
    pub event: EventRecord,
    /// Organizer display name, empty when the organizer has no profile.
    pub organizer_display_name: String,
}

/// Every caller-facing operation, sharing one datastore and one announcement cache.
#[derive(Debug, Clone)]
pub struct ConferenceService<D, C> {
    store: D,
    registration: RegistrationEngine<D>,
    refresher: ScarcityRefresher<D, C>,
    retry: RetryPolicy,
}

impl<D, C> ConferenceService<D, C>
where
    D: Datastore + Clone,
    C: AnnouncementCache,
{
    /// Service over `store`, publishing announcements to `cache`.
    pub fn new(store: D, cache: C, config: &ConferenceConfig) -> Self {
        Self {
            registration: RegistrationEngine::new(store.clone(), config.retry.clone()),
            refresher: ScarcityRefresher::new(store.clone(), cache),
            retry: config.retry.clone(),
            store,
        }
    }

    /// Underlying datastore.
    pub fn store(&self) -> &D {
        &self.store
    }

    /// Announcement refresher, for spawning the periodic task.
    pub fn refresher(&self) -> &ScarcityRefresher<D, C> {
        &self.refresher
    }

    /// Compiles caller clauses without running them.
    pub fn compile_filters(&self, clauses: &[Clause]) -> Result<QuerySpec, ConferenceError> {
        Ok(compile_filters(clauses)?)
    }

    /// Compiles `clauses` and returns matching events in query order.
    pub async fn query_events(&self, clauses: &[Clause]) -> Result<Vec<EventRecord>, ConferenceError> {
        let spec = compile_filters(clauses)?;
        Ok(self.store.query_events(&spec).await?)
    }

    /// Publishes an event organized by the caller, creating their profile if needed.
    #[instrument(skip(self, principal, draft), fields(user_id = %principal.user_id))]
    pub async fn create_event(&self, principal: &Principal, draft: EventDraft) -> Result<EventRecord, ConferenceError> {
        draft.validate()?;
        self.store.ensure_user(principal).await?;
        let event = self.store.insert_event(&principal.user_id, draft).await?;
        info!(event_key = %event.key, seats = event.max_attendees, "event created");
        Ok(event)
    }

    /// An event plus its organizer's display name.
    pub async fn get_event(&self, key: &EventKey) -> Result<EventView, ConferenceError> {
        let Some(found) = self.store.get_event(key).await? else {
            return Err(ConferenceError::EventNotFound(key.clone()));
        };
        let organizer = self.store.get_user(&found.record.organizer_id).await?;
        Ok(EventView {
            organizer_display_name: organizer.map(|o| o.record.display_name).unwrap_or_default(),
            event: found.record,
        })
    }

    /// Looks up an event by its encoded key.
    pub async fn get_event_by_encoded(&self, encoded: &str) -> Result<EventView, ConferenceError> {
        let key: EventKey = encoded.parse()?;
        self.get_event(&key).await
    }

    /// Events the caller has organized, oldest first.
    pub async fn events_created(&self, principal: &Principal) -> Result<Vec<EventRecord>, ConferenceError> {
        Ok(self.store.events_by_organizer(&principal.user_id).await?)
    }

    /// The caller's profile, created with defaults on first access.
    pub async fn get_profile(&self, principal: &Principal) -> Result<UserRecord, ConferenceError> {
        Ok(self.store.ensure_user(principal).await?.record)
    }

    /// Applies `patch` to the caller's profile under the same retry policy as registration.
    #[instrument(skip(self, principal, patch), fields(user_id = %principal.user_id))]
    pub async fn save_profile(&self, principal: &Principal, patch: ProfilePatch) -> Result<UserRecord, ConferenceError> {
        let key = RecordKey::User(principal.user_id.clone());
        let mut attempt = 1u32;
        loop {
            let (version, mut user) = match self.store.get_user(&principal.user_id).await? {
                Some(found) => (found.version, found.record),
                None => (0, UserRecord::with_defaults(principal)),
            };
            if patch.is_empty() && version > 0 {
                return Ok(user);
            }
            patch.apply_to(&mut user);

            let txn = Transaction::new(TxnScope::new([key.clone()]))
                .read(key.clone(), version)
                .write(Write::User(user.clone()));
            match self.store.commit(txn).await {
                Ok(_) => return Ok(user),
                Err(err @ DatastoreError::Conflict(_)) if attempt < self.retry.max_attempts => {
                    debug!(attempt, error = %err, "profile save lost a race; retrying");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(source) => {
                    warn!(attempt, error = %source, "profile save aborted");
                    return Err(ConferenceError::TransactionAborted {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// See [`RegistrationEngine::set_registration`].
    pub async fn set_registration(
        &self,
        principal: &Principal,
        key: &EventKey,
        want_registered: bool,
    ) -> Result<bool, ConferenceError> {
        Ok(self
            .registration
            .set_registration(principal, key, want_registered)
            .await?)
    }

    /// Takes a seat.
    pub async fn register(&self, principal: &Principal, key: &EventKey) -> Result<bool, ConferenceError> {
        self.set_registration(principal, key, true).await
    }

    /// Releases a seat; `Ok(false)` when the caller held none.
    pub async fn unregister(&self, principal: &Principal, key: &EventKey) -> Result<bool, ConferenceError> {
        self.set_registration(principal, key, false).await
    }

    /// Events the caller attends, with organizer names.
    pub async fn list_attending(&self, principal: &Principal) -> Result<Vec<AttendingEvent>, ConferenceError> {
        Ok(self.registration.list_attending(&principal.user_id).await?)
    }

    /// Recomputes the announcement now.
    pub async fn refresh_announcement(&self) -> Result<Option<String>, ConferenceError> {
        Ok(self.refresher.refresh().await?)
    }

    /// Current announcement, `""` when none is stored.
    pub fn read_announcement(&self) -> String {
        self.refresher.read_announcement()
    }

    /// Posts an alert signed with the caller's email.
    #[instrument(skip(self, principal, content), fields(user_id = %principal.user_id))]
    pub async fn post_alert(&self, principal: &Principal, content: impl Into<String>) -> Result<(), ConferenceError> {
        self.store.post_alert(Alert::now(principal.email.clone(), content)).await?;
        info!("alert posted");
        Ok(())
    }

    /// Content of the newest alert, `""` when none was ever posted.
    pub async fn latest_alert(&self) -> Result<String, ConferenceError> {
        Ok(self
            .store
            .latest_alert()
            .await?
            .map(|alert| alert.content)
            .unwrap_or_default())
    }
}
