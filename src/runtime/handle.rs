use std::sync::{
    Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    alert::Alert,
    core::{
        store::{ConferenceStore, StoreError, StoreSnapshotV1, Versioned},
        txn::Transaction,
    },
    engine::traits::{Capabilities, Datastore, DatastoreError},
    event::{EventDraft, EventRecord},
    op::{Op, StoredOp},
    persist::{JournalSink, PersistError, PersistResult},
    profile::UserRecord,
    query::QuerySpec,
    types::{EventKey, OpSeq, Principal, RecordKey, UserId},
};

use super::events::ConferenceEvent;

/// Failure of a runtime control call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The journal rejected a write, snapshot, or flush.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
    /// The journal writer has stopped.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Journal batching and checkpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Write and flush the journal after every op.
    pub flush_on_commit: bool,
    /// Largest batch buffered before a write.
    pub batch_max_ops: usize,
    /// Longest an op waits in the buffer; also the retry interval after a failed write.
    pub batch_max_latency_ms: u64,
    /// Capacity of the journal queue; a full queue rejects mutations.
    pub persist_queue_bound: usize,
    /// Ops between automatic checkpoints, `0` to disable.
    pub snapshot_every_ops: usize,
    /// Drop journal rows covered by each checkpoint.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_commit: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable datastore over one shared [`ConferenceStore`].
///
/// Reads take a shared lock; mutations take the exclusive lock only to validate and
/// apply, then hand the journal op to the journal writer. Once a journal write fails,
/// mutations are refused until a retry succeeds.
///
/// All commits serialize on the one write guard, including commits over unrelated
/// records; the guard is never held across I/O or an `.await`.
#[derive(Clone)]
pub struct ConferenceHandle {
    store: Arc<RwLock<ConferenceStore>>,
    journal: Option<JournalLink>,
    events_tx: broadcast::Sender<ConferenceEvent>,
    config: RuntimeConfig,
}

#[derive(Clone)]
struct JournalLink {
    tx: mpsc::Sender<JournalCmd>,
    health: Arc<JournalHealth>,
    since_checkpoint: Arc<AtomicUsize>,
}

enum JournalCmd {
    Append(StoredOp),
    Flush {
        resp: oneshot::Sender<PersistResult<OpSeq>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: Option<oneshot::Sender<PersistResult<()>>>,
    },
    Shutdown {
        resp: oneshot::Sender<PersistResult<()>>,
    },
}

/// Latched reason of the last failed journal write, cleared by the next good one.
#[derive(Debug, Default)]
struct JournalHealth {
    failure: StdMutex<Option<String>>,
}

impl JournalHealth {
    fn check(&self) -> Result<(), DatastoreError> {
        match self.reason() {
            Some(reason) => Err(DatastoreError::Unavailable(format!("journal write failed: {reason}"))),
            None => Ok(()),
        }
    }

    fn reason(&self) -> Option<String> {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn fail(&self, err: &PersistError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }

    fn clear(&self) {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Starts a runtime over `store`, journaling to `sink` when one is given.
///
/// `store` must already reflect everything in `sink`, as returned by
/// [`crate::persist::sqlite::SqliteJournal::load_store`].
pub fn spawn_conference(
    store: ConferenceStore,
    sink: Option<Box<dyn JournalSink>>,
    config: RuntimeConfig,
) -> ConferenceHandle {
    let (events_tx, _) = broadcast::channel::<ConferenceEvent>(1024);

    let journal = sink.map(|sink| {
        let (tx, rx) = mpsc::channel::<JournalCmd>(config.persist_queue_bound.max(1));
        let health = Arc::new(JournalHealth::default());
        let writer = JournalWriter {
            sink: Some(sink),
            pending: Vec::new(),
            durable: store.latest_op_seq(),
            health: Arc::clone(&health),
            events_tx: events_tx.clone(),
            config: config.clone(),
        };
        tokio::spawn(writer.run(rx));
        JournalLink {
            tx,
            health,
            since_checkpoint: Arc::new(AtomicUsize::new(0)),
        }
    });

    ConferenceHandle {
        store: Arc::new(RwLock::new(store)),
        journal,
        events_tx,
        config,
    }
}

impl ConferenceHandle {
    /// Stream of applied mutations and durability progress.
    pub fn subscribe(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events_tx.subscribe()
    }

    /// Copy of the current store state.
    pub fn snapshot(&self) -> Result<StoreSnapshotV1, RuntimeError> {
        Ok(self.read().map_err(|_| RuntimeError::Poisoned)?.export_snapshot())
    }

    /// Reason the journal is refusing writes, if it is.
    pub fn journal_failure(&self) -> Option<String> {
        self.journal.as_ref().and_then(|link| link.health.reason())
    }

    /// Writes every queued op and returns the highest durable sequence.
    ///
    /// Ops whose write failed earlier are retried first; if they fail again the error
    /// is returned and they stay queued.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let Some(link) = &self.journal else {
            return Ok(self.read().map_err(|_| RuntimeError::Poisoned)?.latest_op_seq());
        };
        let (resp, rx) = oneshot::channel();
        link.tx
            .send(JournalCmd::Flush { resp })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    /// Writes a checkpoint of the current state.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let Some(link) = &self.journal else {
            return Ok(());
        };
        let (snapshot, last_seq) = {
            let store = self.read().map_err(|_| RuntimeError::Poisoned)?;
            (store.export_snapshot(), store.latest_op_seq())
        };
        let (resp, rx) = oneshot::channel();
        link.tx
            .send(JournalCmd::Checkpoint {
                snapshot,
                last_seq,
                compact: self.config.compact_after_snapshot,
                resp: Some(resp),
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        link.since_checkpoint.store(0, Ordering::Relaxed);
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    /// Writes queued ops and stops the journal writer.
    ///
    /// Fails when queued ops could not be written; they are then lost with the writer.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let Some(link) = &self.journal else {
            return Ok(());
        };
        let (resp, rx) = oneshot::channel();
        link.tx
            .send(JournalCmd::Shutdown { resp })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ConferenceStore>, DatastoreError> {
        self.store
            .read()
            .map_err(|_| DatastoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ConferenceStore>, DatastoreError> {
        self.store
            .write()
            .map_err(|_| DatastoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Runs `f` under the exclusive lock and journals the op it yields.
    ///
    /// The journal must be healthy and have a free queue slot before `f` runs, so a
    /// refused mutation never touches the store.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ConferenceStore) -> Result<(T, Option<StoredOp>), DatastoreError>,
    ) -> Result<T, DatastoreError> {
        let permit = match &self.journal {
            Some(link) => {
                link.health.check()?;
                Some(link.tx.try_reserve().map_err(|err| {
                    DatastoreError::Unavailable(format!("journal queue: {err}"))
                })?)
            }
            None => None,
        };

        let mut store = self.write()?;
        let (out, stored) = f(&mut store)?;
        let Some(stored) = stored else {
            return Ok(out);
        };
        store.drain_pending_ops();

        let op_seq = stored.seq;
        self.events_tx.send(event_for(&stored)).ok();
        match permit {
            Some(permit) => permit.send(JournalCmd::Append(stored)),
            None => {
                self.events_tx.send(ConferenceEvent::DurableUpTo { op_seq }).ok();
            }
        }
        self.maybe_auto_checkpoint(&store);
        Ok(out)
    }

    fn maybe_auto_checkpoint(&self, store: &ConferenceStore) {
        let Some(link) = &self.journal else {
            return;
        };
        let every = self.config.snapshot_every_ops;
        let count = link.since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1;
        if every == 0 || count < every {
            return;
        }

        let cmd = JournalCmd::Checkpoint {
            snapshot: store.export_snapshot(),
            last_seq: store.latest_op_seq(),
            compact: self.config.compact_after_snapshot,
            resp: None,
        };
        match link.tx.try_send(cmd) {
            Ok(()) => {
                debug!(ops = count, "auto checkpoint queued");
                link.since_checkpoint.store(0, Ordering::Relaxed);
            }
            Err(err) => debug!(error = %err, "auto checkpoint deferred"),
        }
    }
}

#[async_trait]
impl Datastore for ConferenceHandle {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            cross_group_commit: true,
        }
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<Versioned<UserRecord>>, DatastoreError> {
        Ok(self.read()?.get_user(id).cloned())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<Option<UserRecord>>, DatastoreError> {
        let store = self.read()?;
        Ok(ids
            .iter()
            .map(|id| store.get_user(id).map(|v| v.record.clone()))
            .collect())
    }

    async fn get_event(&self, key: &EventKey) -> Result<Option<Versioned<EventRecord>>, DatastoreError> {
        Ok(self.read()?.get_event(key).cloned())
    }

    async fn get_events(&self, keys: &[EventKey]) -> Result<Vec<Option<EventRecord>>, DatastoreError> {
        let store = self.read()?;
        Ok(keys
            .iter()
            .map(|key| store.get_event(key).map(|v| v.record.clone()))
            .collect())
    }

    async fn ensure_user(&self, principal: &Principal) -> Result<Versioned<UserRecord>, DatastoreError> {
        if let Some(existing) = self.read()?.get_user(&principal.user_id) {
            return Ok(existing.clone());
        }
        self.mutate(|store| Ok(store.ensure_user(principal)))
    }

    async fn insert_event(&self, organizer: &UserId, draft: EventDraft) -> Result<EventRecord, DatastoreError> {
        self.mutate(|store| {
            let (event, stored) = store.insert_event(organizer, draft);
            Ok((event, Some(stored)))
        })
    }

    async fn events_by_organizer(&self, organizer: &UserId) -> Result<Vec<EventRecord>, DatastoreError> {
        Ok(self
            .read()?
            .events_by_organizer(organizer)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn query_events(&self, spec: &QuerySpec) -> Result<Vec<EventRecord>, DatastoreError> {
        Ok(self.read()?.query(spec))
    }

    async fn commit(&self, txn: Transaction) -> Result<Option<OpSeq>, DatastoreError> {
        self.mutate(|store| {
            let stored = store.commit(txn).map_err(commit_error)?;
            Ok((stored.as_ref().map(|s| s.seq), stored))
        })
    }

    async fn post_alert(&self, alert: Alert) -> Result<(), DatastoreError> {
        self.mutate(|store| Ok(((), Some(store.post_alert(alert)))))
    }

    async fn latest_alert(&self) -> Result<Option<Alert>, DatastoreError> {
        Ok(self.read()?.latest_alert().cloned())
    }
}

fn commit_error(err: StoreError) -> DatastoreError {
    match err {
        StoreError::VersionConflict { key, .. } => DatastoreError::Conflict(key),
        StoreError::MissingEvent(key) => DatastoreError::Conflict(RecordKey::Event(key)),
        StoreError::OutOfScope(key) => DatastoreError::OutOfScope(key),
        other => DatastoreError::Unavailable(other.to_string()),
    }
}

fn event_for(stored: &StoredOp) -> ConferenceEvent {
    match &stored.op {
        Op::CreateEvent { event } => ConferenceEvent::EventCreated {
            key: event.key.clone(),
        },
        Op::CreateUser { user } => ConferenceEvent::UserCreated {
            user_id: user.user_id.clone(),
        },
        Op::Commit { writes } => ConferenceEvent::Committed {
            op_seq: stored.seq,
            keys: writes.iter().map(|w| w.write.key()).collect(),
        },
        Op::PostAlert { .. } => ConferenceEvent::AlertPosted { op_seq: stored.seq },
    }
}

/// Owns the sink and the ops not yet written to it.
///
/// `pending` is only cleared by a successful append, so a failed batch is retried
/// ahead of anything queued after it.
struct JournalWriter {
    sink: Option<Box<dyn JournalSink>>,
    pending: Vec<StoredOp>,
    durable: OpSeq,
    health: Arc<JournalHealth>,
    events_tx: broadcast::Sender<ConferenceEvent>,
    config: RuntimeConfig,
}

impl JournalWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<JournalCmd>) {
        let latency = Duration::from_millis(self.config.batch_max_latency_ms);
        let mut deadline = Instant::now() + latency;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else {
                        if let Err(err) = self.write_pending(true).await {
                            warn!(error = %err, lost = self.pending.len(), "journal closed with unwritten ops");
                        }
                        break;
                    };

                    match cmd {
                        JournalCmd::Append(stored) => {
                            self.pending.push(stored);
                            if self.config.flush_on_commit || self.pending.len() >= self.config.batch_max_ops {
                                self.write_pending(true).await.ok();
                                deadline = Instant::now() + latency;
                            }
                        }
                        JournalCmd::Flush { resp } => {
                            let result = self.write_pending(true).await.map(|()| self.durable);
                            resp.send(result).ok();
                            deadline = Instant::now() + latency;
                        }
                        JournalCmd::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let result = self.checkpoint(snapshot, last_seq, compact).await;
                            if let Some(resp) = resp {
                                resp.send(result).ok();
                            }
                            deadline = Instant::now() + latency;
                        }
                        JournalCmd::Shutdown { resp } => {
                            let result = self.write_pending(true).await;
                            resp.send(result).ok();
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !self.pending.is_empty() => {
                    self.write_pending(false).await.ok();
                    deadline = Instant::now() + latency;
                }
            }
        }
        debug!(durable = self.durable, "journal writer stopped");
    }

    /// Appends `pending` and optionally flushes; any failure latches the health flag.
    async fn write_pending(&mut self, sync: bool) -> PersistResult<()> {
        let result = self.try_write_pending(sync).await;
        match &result {
            Ok(()) => {
                if self.health.reason().is_some() {
                    info!(durable = self.durable, "journal recovered");
                }
                self.health.clear();
            }
            Err(err) => {
                warn!(error = %err, pending = self.pending.len(), "journal write failed");
                self.health.fail(err);
            }
        }
        result
    }

    async fn try_write_pending(&mut self, sync: bool) -> PersistResult<()> {
        if !self.pending.is_empty() {
            let batch = self.pending.clone();
            let written = self
                .on_sink(move |sink| {
                    let seq = sink.append_ops(&batch)?;
                    if sync {
                        sink.flush()?;
                    }
                    Ok(seq)
                })
                .await?;
            self.pending.clear();
            self.durable = self.durable.max(written);
            self.events_tx
                .send(ConferenceEvent::DurableUpTo { op_seq: self.durable })
                .ok();
        } else if sync {
            self.on_sink(|sink| sink.flush()).await?;
        }
        Ok(())
    }

    async fn checkpoint(&mut self, snapshot: StoreSnapshotV1, last_seq: OpSeq, compact: bool) -> PersistResult<()> {
        self.write_pending(true).await?;
        let result = self
            .on_sink(move |sink| {
                sink.write_snapshot(&snapshot, last_seq)?;
                if compact {
                    let dropped = sink.compact_through(last_seq)?;
                    debug!(last_seq, dropped, "journal compacted");
                }
                Ok(())
            })
            .await;
        if let Err(err) = &result {
            warn!(error = %err, last_seq, "checkpoint failed");
        }
        result
    }

    /// Runs `f` on the blocking pool with the sink moved in and back out.
    ///
    /// A panic inside `f` loses the sink for good.
    async fn on_sink<T, F>(&mut self, f: F) -> PersistResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn JournalSink) -> PersistResult<T> + Send + 'static,
    {
        let Some(mut sink) = self.sink.take() else {
            return Err(PersistError::Message("journal sink lost".to_string()));
        };
        match tokio::task::spawn_blocking(move || {
            let out = f(sink.as_mut());
            (sink, out)
        })
        .await
        {
            Ok((sink, out)) => {
                self.sink = Some(sink);
                out
            }
            Err(err) => Err(PersistError::Message(format!("journal task failed: {err}"))),
        }
    }
}
