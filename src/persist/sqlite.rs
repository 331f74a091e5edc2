//! SQLite journal: one row per op, one row per record version, periodic checkpoints.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::store::{ConferenceStore, StoreSnapshotV1},
    op::{OP_FORMAT_VERSION, StoredOp, StoredOpEnvelope},
    types::{OpSeq, RecordKey, Version},
};

use super::{JournalSink, PersistError, PersistResult};

const CHECKPOINT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointEnvelope {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// SQLite implementation of [`JournalSink`].
///
/// Appends are gapless: each batch must start right after [`SqliteJournal::head`].
pub struct SqliteJournal {
    conn: Connection,
}

impl SqliteJournal {
    /// Opens or creates a journal at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Journal that lives only as long as this value.
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Highest sequence covered by the journal or its latest checkpoint.
    pub fn head(&self) -> PersistResult<OpSeq> {
        let head: i64 = self.conn.query_row(
            "SELECT MAX(
                 COALESCE((SELECT MAX(seq) FROM journal), 0),
                 COALESCE((SELECT MAX(last_seq) FROM checkpoints), 0))",
            [],
            |row| row.get(0),
        )?;
        Ok(head as OpSeq)
    }

    /// Rebuilds the store from the latest checkpoint plus the ops after it.
    ///
    /// Fails on a missing op or on a record whose replayed version differs from the
    /// journaled one.
    pub fn load_store(&self) -> PersistResult<ConferenceStore> {
        let mut store = match self.latest_checkpoint()? {
            Some(snapshot) => ConferenceStore::from_snapshot(snapshot)?,
            None => ConferenceStore::new(),
        };

        let ops = self.ops_after(store.latest_op_seq())?;
        debug!(from = store.latest_op_seq(), replayed = ops.len(), "replaying journal");
        for op in ops {
            store.apply_replayed_op(op)?;
        }
        Ok(store)
    }

    /// Ops strictly after `seq`, in order.
    pub fn ops_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, payload FROM journal WHERE seq > ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![seq as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, payload)| decode_op(seq as OpSeq, &payload))
            .collect()
    }

    /// Every journaled version of `key` with the op that produced it, oldest first.
    ///
    /// Compaction drops the history it covers.
    pub fn record_history(&self, key: &RecordKey) -> PersistResult<Vec<(Version, OpSeq)>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, seq FROM record_versions WHERE record_key = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![key.to_string()], |row| {
            Ok((row.get::<_, i64>(0)? as Version, row.get::<_, i64>(1)? as OpSeq))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn latest_checkpoint(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM checkpoints ORDER BY last_seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: CheckpointEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(PersistError::Corrupt(format!(
                "unsupported checkpoint format {}",
                env.format_version
            )));
        }
        Ok(Some(env.snapshot))
    }
}

impl JournalSink for SqliteJournal {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let head = self.head()?;
        let Some(first) = ops.first() else {
            return Ok(head);
        };
        if first.seq != head + 1 {
            return Err(PersistError::Gap {
                expected: head + 1,
                found: first.seq,
            });
        }

        let tx = self.conn.transaction()?;
        {
            let mut journal =
                tx.prepare("INSERT INTO journal(seq, ts_ms, kind, payload) VALUES (?1, ?2, ?3, ?4)")?;
            let mut versions = tx
                .prepare("INSERT INTO record_versions(record_key, version, seq) VALUES (?1, ?2, ?3)")?;

            let mut expected = first.seq;
            for stored in ops {
                if stored.seq != expected {
                    return Err(PersistError::Gap {
                        expected,
                        found: stored.seq,
                    });
                }
                expected += 1;

                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                journal.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.op.kind(),
                    payload
                ])?;
                for (key, version) in stored.op.record_versions() {
                    versions.execute(params![key.to_string(), version as i64, stored.seq as i64])?;
                }
            }
        }
        tx.commit()?;

        Ok(ops.last().map_or(head, |o| o.seq))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        let payload = serde_json::to_vec(&CheckpointEnvelope {
            format_version: CHECKPOINT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        })?;
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![last_seq as i64, now_ms() as i64, payload],
        )?;
        Ok(())
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM record_versions WHERE seq <= ?1", params![seq as i64])?;
        let dropped = tx.execute("DELETE FROM journal WHERE seq <= ?1", params![seq as i64])?;
        tx.commit()?;
        Ok(dropped)
    }
}

fn decode_op(seq: OpSeq, payload: &[u8]) -> PersistResult<StoredOp> {
    let env: StoredOpEnvelope = serde_json::from_slice(payload)
        .map_err(|err| PersistError::Corrupt(format!("op {seq}: {err}")))?;
    if env.format_version != OP_FORMAT_VERSION {
        return Err(PersistError::Corrupt(format!(
            "op {seq}: unsupported format {}",
            env.format_version
        )));
    }
    if env.stored.seq != seq {
        return Err(PersistError::Corrupt(format!(
            "row {seq} holds op {}",
            env.stored.seq
        )));
    }
    Ok(env.stored)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
