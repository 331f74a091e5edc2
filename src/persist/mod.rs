//! Durable journal of store ops.

/// SQLite journal backend.
pub mod sqlite;

use thiserror::Error;

use crate::{
    core::store::{StoreError, StoreSnapshotV1},
    op::StoredOp,
    types::OpSeq,
};

/// Journal failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Underlying database error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization error.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Journaled ops do not rebuild a consistent store.
    #[error("replay: {0}")]
    Replay(#[from] StoreError),
    /// An append would leave a hole in the journal.
    #[error("journal gap: expected op {expected}, got {found}")]
    Gap {
        /// Next sequence the journal accepts.
        expected: OpSeq,
        /// First sequence offered.
        found: OpSeq,
    },
    /// A stored row does not decode to the op it claims to be.
    #[error("corrupt journal: {0}")]
    Corrupt(String),
    /// Anything else, such as a lost worker task.
    #[error("{0}")]
    Message(String),
}

/// Result alias for journal operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for journaled ops; called only from the journal writer.
pub trait JournalSink: Send {
    /// Appends `ops`, which must continue the journal without a gap.
    ///
    /// All-or-nothing: on error nothing from `ops` is stored and the same batch may be
    /// offered again. Returns the highest sequence written.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;

    /// Makes appended ops durable.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }

    /// Stores a checkpoint covering every op up to `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }

    /// Drops journal rows covered by a checkpoint; returns how many went.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
