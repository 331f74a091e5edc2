use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use confcentral::{
    config::RetryPolicy,
    core::store::{ConferenceStore, StoreSnapshotV1},
    engine::{
        registration::RegistrationEngine,
        traits::{Datastore, DatastoreError},
    },
    event::EventDraft,
    op::StoredOp,
    persist::{JournalSink, PersistError, PersistResult, sqlite::SqliteJournal},
    runtime::handle::{RuntimeConfig, RuntimeError, spawn_conference},
    types::{OpSeq, Principal, RecordKey},
};

/// SQLite journal whose first `fail_appends` appends are refused.
struct FlakyJournal {
    inner: SqliteJournal,
    fail_appends: usize,
    appends: Arc<AtomicUsize>,
}

impl JournalSink for FlakyJournal {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if self.appends.fetch_add(1, Ordering::SeqCst) < self.fail_appends {
            return Err(PersistError::Message("disk full".to_string()));
        }
        self.inner.append_ops(ops)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.inner.flush()
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        self.inner.write_snapshot(snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        self.inner.compact_through(seq)
    }
}

/// Writes only when asked to flush.
fn buffered() -> RuntimeConfig {
    RuntimeConfig {
        flush_on_commit: false,
        batch_max_ops: 1024,
        batch_max_latency_ms: 60_000,
        snapshot_every_ops: 0,
        ..RuntimeConfig::default()
    }
}

fn principal(id: &str) -> Principal {
    Principal::new(id, format!("{id}@example.com"))
}

#[tokio::test]
async fn failed_append_is_kept_and_retried_on_the_next_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("journal.db");
    let appends = Arc::new(AtomicUsize::new(0));
    let journal = FlakyJournal {
        inner: SqliteJournal::open(&path).expect("open"),
        fail_appends: 1,
        appends: Arc::clone(&appends),
    };

    let handle = spawn_conference(ConferenceStore::new(), Some(Box::new(journal)), buffered());
    let event = handle
        .insert_event(&"org".to_string(), EventDraft::new("Retried", 10))
        .await
        .expect("insert");
    let engine = RegistrationEngine::new(handle.clone(), RetryPolicy::default());
    assert_eq!(engine.set_registration(&principal("a"), &event.key, true).await, Ok(true));

    let err = handle.flush().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(PersistError::Message(_))));
    assert!(handle.journal_failure().is_some());

    let refused = handle
        .insert_event(&"org".to_string(), EventDraft::new("Refused", 10))
        .await;
    assert!(matches!(refused, Err(DatastoreError::Unavailable(_))));
    assert_eq!(handle.snapshot().expect("snapshot").events.len(), 1);

    assert_eq!(handle.flush().await.expect("retry"), 2);
    assert_eq!(handle.journal_failure(), None);
    assert_eq!(appends.load(Ordering::SeqCst), 2);
    handle
        .insert_event(&"org".to_string(), EventDraft::new("Accepted", 10))
        .await
        .expect("accepted after recovery");
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteJournal::open(&path).expect("reopen");
    let restored = reopened.load_store().expect("load");
    assert_eq!(restored.latest_op_seq(), 3);
    assert_eq!(restored.get_event(&event.key).expect("event").record.seats_available, 9);
    let attendee = restored.get_user("a").expect("attendee");
    assert_eq!(attendee.record.attending, vec![event.key.clone()]);
    assert_eq!(
        reopened.record_history(&RecordKey::Event(event.key)).expect("history"),
        vec![(1, 1), (2, 2)]
    );
}

#[tokio::test]
async fn broken_journal_refuses_mutations_and_fails_shutdown() {
    let journal = FlakyJournal {
        inner: SqliteJournal::open_in_memory().expect("open"),
        fail_appends: usize::MAX,
        appends: Arc::new(AtomicUsize::new(0)),
    };
    let handle = spawn_conference(ConferenceStore::new(), Some(Box::new(journal)), RuntimeConfig::default());

    handle
        .insert_event(&"org".to_string(), EventDraft::new("Accepted", 10))
        .await
        .expect("first op is accepted before the write fails");
    assert!(matches!(handle.flush().await, Err(RuntimeError::Persist(_))));

    let refused = handle.ensure_user(&principal("org")).await;
    assert!(matches!(refused, Err(DatastoreError::Unavailable(_))));
    assert_eq!(handle.get_user(&"org".to_string()).await, Ok(None));
    assert!(handle.journal_failure().is_some_and(|reason| reason.contains("disk full")));

    assert!(handle.shutdown().await.is_err());
}
