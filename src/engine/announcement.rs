//! "Nearly sold out" announcement, recomputed on an external schedule.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::query::{Attribute, Comparator, Filter, FilterError, QuerySpec, Value};

use super::traits::{AnnouncementCache, Datastore, DatastoreError};

/// Events with at most this many (and more than zero) seats left are announced.
pub const SCARCITY_THRESHOLD: u32 = 5;

/// Leading text of every announcement.
pub const ANNOUNCEMENT_PREFIX: &str =
    "Last chance to attend! The following conferences are nearly sold out: ";

/// Refresh failure; the slot is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The scarcity query failed.
    #[error("datastore unavailable: {0}")]
    StoreUnavailable(#[from] DatastoreError),
    /// The scarcity query was rejected.
    #[error("invalid scarcity query: {0}")]
    Query(#[from] FilterError),
}

/// Query for events with `0 < seatsAvailable <= SCARCITY_THRESHOLD`.
pub fn scarcity_query() -> Result<QuerySpec, FilterError> {
    let filters = vec![
        Filter::new(
            Attribute::SeatsAvailable,
            Comparator::Le,
            Value::Int(i64::from(SCARCITY_THRESHOLD)),
        ),
        Filter::new(Attribute::SeatsAvailable, Comparator::Gt, Value::Int(0)),
    ];
    QuerySpec::from_filters(filters)
}

/// Formats the announcement for `names`, or `None` when there is nothing to announce.
pub fn format_announcement<S: AsRef<str>>(names: &[S]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let joined = names.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
    Some(format!("{ANNOUNCEMENT_PREFIX}{joined}"))
}

/// Single writer of the announcement slot.
#[derive(Debug, Clone)]
pub struct ScarcityRefresher<D, C> {
    store: D,
    cache: C,
}

impl<D: Datastore, C: AnnouncementCache> ScarcityRefresher<D, C> {
    /// Refresher reading `store` and writing `cache`.
    pub fn new(store: D, cache: C) -> Self {
        Self { store, cache }
    }

    /// Recomputes the announcement; stores it, or deletes the slot when nothing qualifies.
    ///
    /// Returns the stored announcement.
    ///
    /// # Errors
    ///
    /// [`RefreshError::StoreUnavailable`] when the query fails.
    pub async fn refresh(&self) -> Result<Option<String>, RefreshError> {
        let events = self.store.query_events(&scarcity_query()?).await?;
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();

        match format_announcement(&names) {
            Some(announcement) => {
                info!(events = names.len(), "announcing nearly sold out events");
                self.cache.set(announcement.clone());
                Ok(Some(announcement))
            }
            None => {
                debug!("no nearly sold out events; clearing announcement");
                self.cache.delete();
                Ok(None)
            }
        }
    }

    /// Current announcement, `""` when the slot is absent.
    pub fn read_announcement(&self) -> String {
        self.cache.get().unwrap_or_default()
    }
}

impl<D, C> ScarcityRefresher<D, C>
where
    D: Datastore + 'static,
    C: AnnouncementCache + 'static,
{
    /// Runs [`ScarcityRefresher::refresh`] every `interval` until the handle is aborted.
    ///
    /// Failed refreshes are logged and leave the previous announcement in place.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.refresh().await {
                    warn!(error = %err, "announcement refresh failed");
                }
            }
        })
    }
}
