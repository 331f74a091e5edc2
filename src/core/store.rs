use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    alert::{self, Alert},
    core::{indices::OrganizerIndex, txn::Transaction},
    event::{EventDraft, EventRecord},
    op::{JournaledWrite, Op, StoredOp, Write},
    profile::UserRecord,
    query::QuerySpec,
    types::{EventId, EventKey, OpSeq, Principal, RecordKey, UserId, Version},
};

/// Rejected commit or replay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A read version no longer matches the stored record.
    #[error("stale read of {key}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Record read.
        key: RecordKey,
        /// Version the transaction observed.
        expected: Version,
        /// Version now stored.
        actual: Version,
    },
    /// The transaction touched a record it did not declare.
    #[error("{0} is outside the transaction scope")]
    OutOfScope(RecordKey),
    /// An event write targets an event that does not exist.
    #[error("no such event: {0}")]
    MissingEvent(EventKey),
    /// A create targets a record that already exists.
    #[error("{0} already exists")]
    AlreadyExists(RecordKey),
    /// Replay skipped a sequence number.
    #[error("journal gap: expected op {expected}, found {found}")]
    SequenceGap {
        /// Next sequence the store expected.
        expected: OpSeq,
        /// Sequence found in the journal.
        found: OpSeq,
    },
    /// Replay produced a different record version than the journal recorded.
    #[error("replay of {key} reached version {replayed}, journal recorded {journaled}")]
    VersionDiverged {
        /// Record written.
        key: RecordKey,
        /// Version in the journal.
        journaled: Version,
        /// Version replay produced.
        replayed: Version,
    },
}

/// A record plus the version its last write produced (first write is version 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Write count of the record; `0` is reserved for "absent".
    pub version: Version,
    /// Record body.
    pub record: T,
}

/// Complete, self-contained store image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next event id to allocate.
    pub next_event_id: EventId,
    /// Next journal sequence to assign.
    pub next_op_seq: OpSeq,
    /// Events in creation order.
    pub order: Vec<EventKey>,
    /// Event records, in `order`.
    pub events: Vec<Versioned<EventRecord>>,
    /// User records, sorted by id.
    pub users: Vec<Versioned<UserRecord>>,
    /// Posted alerts, in posting order.
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Authoritative in-memory users, events, and alerts.
///
/// Every mutation yields the [`StoredOp`] that reproduces it, and is also queued on
/// an internal pending list for callers that batch journal writes.
#[derive(Debug, Default)]
pub struct ConferenceStore {
    events: HashMap<EventKey, Versioned<EventRecord>>,
    users: HashMap<UserId, Versioned<UserRecord>>,
    alerts: Vec<Alert>,
    order: Vec<EventKey>,
    by_organizer: OrganizerIndex,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_event_id: EventId,
}

impl ConferenceStore {
    /// Empty store; the first op is sequence 1 and the first event id is 1.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_event_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_event_id: snapshot.next_event_id,
            next_op_seq: snapshot.next_op_seq,
            order: snapshot.order,
            alerts: snapshot.alerts,
            ..Self::default()
        };

        for versioned in snapshot.events {
            let key = versioned.record.key.clone();
            if store.events.contains_key(&key) {
                return Err(StoreError::AlreadyExists(RecordKey::Event(key)));
            }
            store.index_event(&versioned.record);
            store.events.insert(key, versioned);
        }

        for versioned in snapshot.users {
            store
                .users
                .insert(versioned.record.user_id.clone(), versioned);
        }

        Ok(store)
    }

    /// Deterministic image of the current state.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let events = self
            .order
            .iter()
            .filter_map(|key| self.events.get(key).cloned())
            .collect();

        let mut users: Vec<Versioned<UserRecord>> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.record.user_id.cmp(&b.record.user_id));

        StoreSnapshotV1 {
            next_event_id: self.next_event_id,
            next_op_seq: self.next_op_seq,
            order: self.order.clone(),
            events,
            users,
            alerts: self.alerts.clone(),
        }
    }

    /// Allocates an id under `organizer` and publishes the event.
    pub fn insert_event(&mut self, organizer: &UserId, draft: EventDraft) -> (EventRecord, StoredOp) {
        let key = EventKey::new(organizer.clone(), self.next_event_id);
        self.next_event_id += 1;

        let event = draft.into_record(key);
        self.put_new_event(event.clone());
        let stored = self.record(Op::CreateEvent {
            event: event.clone(),
        });
        (event, stored)
    }

    /// Upsert-with-defaults: returns the existing profile, or creates one for `principal`.
    pub fn ensure_user(&mut self, principal: &Principal) -> (Versioned<UserRecord>, Option<StoredOp>) {
        if let Some(existing) = self.users.get(&principal.user_id) {
            return (existing.clone(), None);
        }

        let user = UserRecord::with_defaults(principal);
        let versioned = Versioned {
            version: 1,
            record: user.clone(),
        };
        self.users
            .insert(principal.user_id.clone(), versioned.clone());
        let stored = self.record(Op::CreateUser { user });
        (versioned, Some(stored))
    }

    /// Validates every read version and scope, then applies all writes or none.
    ///
    /// Returns `None` for a transaction with no writes.
    pub fn commit(&mut self, txn: Transaction) -> Result<Option<StoredOp>, StoreError> {
        self.validate(&txn)?;
        if txn.is_read_only() {
            return Ok(None);
        }

        let writes = txn
            .writes
            .into_iter()
            .map(|write| JournaledWrite {
                version: self.apply_write(&write),
                write,
            })
            .collect();
        Ok(Some(self.record(Op::Commit { writes })))
    }

    /// Appends an alert to the feed.
    pub fn post_alert(&mut self, alert: Alert) -> StoredOp {
        self.alerts.push(alert.clone());
        self.record(Op::PostAlert { alert })
    }

    /// Newest alert by posting time.
    pub fn latest_alert(&self) -> Option<&Alert> {
        alert::newest(&self.alerts)
    }

    /// Re-applies a journaled op.
    ///
    /// Ops must arrive gaplessly in sequence order, and every record must land on the
    /// version the journal recorded for it.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        if stored.seq != self.next_op_seq {
            return Err(StoreError::SequenceGap {
                expected: self.next_op_seq,
                found: stored.seq,
            });
        }

        match stored.op {
            Op::CreateEvent { event } => {
                if self.events.contains_key(&event.key) {
                    return Err(StoreError::AlreadyExists(RecordKey::Event(event.key)));
                }
                self.next_event_id = self.next_event_id.max(event.key.id.saturating_add(1));
                self.put_new_event(event);
            }
            Op::CreateUser { user } => {
                if self.users.contains_key(&user.user_id) {
                    return Err(StoreError::AlreadyExists(RecordKey::User(user.user_id)));
                }
                self.users.insert(
                    user.user_id.clone(),
                    Versioned {
                        version: 1,
                        record: user,
                    },
                );
            }
            Op::Commit { writes } => {
                for journaled in &writes {
                    if let Write::Event(event) = &journaled.write {
                        if !self.events.contains_key(&event.key) {
                            return Err(StoreError::MissingEvent(event.key.clone()));
                        }
                    }
                }
                for journaled in writes {
                    let replayed = self.apply_write(&journaled.write);
                    if replayed != journaled.version {
                        return Err(StoreError::VersionDiverged {
                            key: journaled.write.key(),
                            journaled: journaled.version,
                            replayed,
                        });
                    }
                }
            }
            Op::PostAlert { alert } => self.alerts.push(alert),
        }
        self.next_op_seq += 1;
        Ok(())
    }

    /// Event by key.
    pub fn get_event(&self, key: &EventKey) -> Option<&Versioned<EventRecord>> {
        self.events.get(key)
    }

    /// User by id.
    pub fn get_user(&self, id: &str) -> Option<&Versioned<UserRecord>> {
        self.users.get(id)
    }

    /// Current version of `key`, `0` when absent.
    pub fn version_of(&self, key: &RecordKey) -> Version {
        match key {
            RecordKey::User(id) => self.users.get(id).map_or(0, |v| v.version),
            RecordKey::Event(key) => self.events.get(key).map_or(0, |v| v.version),
        }
    }

    /// Events created by `organizer`, oldest first.
    pub fn events_by_organizer(&self, organizer: &str) -> Vec<&EventRecord> {
        self.by_organizer
            .get(organizer)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|key| self.events.get(key))
            .map(|v| &v.record)
            .collect()
    }

    /// Runs a compiled query over every event.
    pub fn query(&self, spec: &QuerySpec) -> Vec<EventRecord> {
        spec.execute(
            self.order
                .iter()
                .filter_map(|key| self.events.get(key))
                .map(|v| &v.record),
        )
    }

    /// Number of events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of user profiles.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Takes the ops recorded since the last drain.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Sequence of the most recent op, `0` before any.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn validate(&self, txn: &Transaction) -> Result<(), StoreError> {
        for (key, expected) in &txn.reads {
            if !txn.scope.contains(key) {
                return Err(StoreError::OutOfScope(key.clone()));
            }
            let actual = self.version_of(key);
            if actual != *expected {
                return Err(StoreError::VersionConflict {
                    key: key.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        for write in &txn.writes {
            let key = write.key();
            if !txn.scope.contains(&key) {
                return Err(StoreError::OutOfScope(key));
            }
            if let RecordKey::Event(event_key) = &key {
                if !self.events.contains_key(event_key) {
                    return Err(StoreError::MissingEvent(event_key.clone()));
                }
            }
        }
        Ok(())
    }

    /// Applies one write and returns the record's new version.
    fn apply_write(&mut self, write: &Write) -> Version {
        let slot = match write {
            Write::User(user) => {
                let slot = self
                    .users
                    .entry(user.user_id.clone())
                    .or_insert_with(|| Versioned {
                        version: 0,
                        record: user.clone(),
                    });
                slot.record = user.clone();
                &mut slot.version
            }
            Write::Event(event) => match self.events.get_mut(&event.key) {
                Some(slot) => {
                    slot.record = event.clone();
                    &mut slot.version
                }
                None => return 0,
            },
        };
        *slot += 1;
        *slot
    }

    fn record(&mut self, op: Op) -> StoredOp {
        let stored = StoredOp {
            seq: self.next_op_seq,
            ts_ms: now_ms(),
            op,
        };
        self.next_op_seq += 1;
        self.pending_ops.push(stored.clone());
        stored
    }

    fn put_new_event(&mut self, event: EventRecord) {
        let key = event.key.clone();
        self.index_event(&event);
        self.order.push(key.clone());
        self.events.insert(
            key,
            Versioned {
                version: 1,
                record: event,
            },
        );
    }

    fn index_event(&mut self, event: &EventRecord) {
        self.by_organizer
            .entry(event.key.organizer.clone())
            .or_default()
            .push(event.key.clone());
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::txn::TxnScope, types::Principal};

    #[test]
    fn commits_journal_the_versions_they_produce() {
        let mut store = ConferenceStore::new();
        let (event, _) = store.insert_event(&"org".to_string(), EventDraft::new("Conf", 3));
        let key = RecordKey::Event(event.key.clone());

        let mut updated = event.clone();
        updated.seats_available = 2;
        let txn = Transaction::new(TxnScope::new([key.clone()]))
            .read(key.clone(), 1)
            .write(Write::Event(updated));
        let stored = store.commit(txn).unwrap().unwrap();

        assert_eq!(stored.seq, 2);
        assert_eq!(stored.op.record_versions(), vec![(key.clone(), 2)]);
        assert_eq!(store.version_of(&key), 2);
    }

    #[test]
    fn replay_rejects_gaps_and_diverging_versions() {
        let mut source = ConferenceStore::new();
        let (event, create) = source.insert_event(&"org".to_string(), EventDraft::new("Conf", 3));
        source.ensure_user(&Principal::new("u", "u@example.com"));

        let mut replica = ConferenceStore::new();
        let skipped = StoredOp { seq: 2, ..create.clone() };
        assert_eq!(
            replica.apply_replayed_op(skipped),
            Err(StoreError::SequenceGap { expected: 1, found: 2 })
        );

        replica.apply_replayed_op(create).unwrap();
        let forged = StoredOp {
            seq: 2,
            ts_ms: 0,
            op: Op::Commit {
                writes: vec![JournaledWrite {
                    version: 7,
                    write: Write::Event(event.clone()),
                }],
            },
        };
        assert_eq!(
            replica.apply_replayed_op(forged),
            Err(StoreError::VersionDiverged {
                key: RecordKey::Event(event.key),
                journaled: 7,
                replayed: 2,
            })
        );
    }

    #[test]
    fn latest_alert_survives_snapshots() {
        let mut store = ConferenceStore::new();
        assert_eq!(store.latest_alert(), None);
        store.post_alert(Alert::now("admin@example.com", "Doors open at nine"));

        let restored = ConferenceStore::from_snapshot(store.export_snapshot()).unwrap();
        assert_eq!(
            restored.latest_alert().map(|a| a.content.as_str()),
            Some("Doors open at nine")
        );
    }
}
