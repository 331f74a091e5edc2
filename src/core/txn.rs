use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    op::Write,
    types::{RecordKey, Version},
};

/// Explicit set of records a transaction may read and write.
///
/// A scope covering records of more than one ownership group needs a backend able
/// to commit atomically across groups.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxnScope {
    keys: BTreeSet<RecordKey>,
}

impl TxnScope {
    /// Scope over exactly `keys`.
    pub fn new(keys: impl IntoIterator<Item = RecordKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Returns true when `key` is covered.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    /// Distinct ownership groups touched.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.keys.iter().map(RecordKey::group).collect()
    }

    /// Returns true when more than one ownership group is touched.
    pub fn is_cross_group(&self) -> bool {
        self.groups().len() > 1
    }

    /// Covered keys.
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.keys.iter()
    }
}

/// Optimistic transaction: versions observed while reading, writes to apply on commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Records this transaction covers.
    pub scope: TxnScope,
    /// Observed `(key, version)` pairs; version `0` asserts the record is still absent.
    pub reads: Vec<(RecordKey, Version)>,
    /// Full-record writes applied together.
    pub writes: Vec<Write>,
}

impl Transaction {
    /// Empty transaction over `scope`.
    pub fn new(scope: TxnScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    /// Records an observed version.
    pub fn read(mut self, key: RecordKey, version: Version) -> Self {
        self.reads.push((key, version));
        self
    }

    /// Queues a write.
    pub fn write(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Returns true when nothing would be written.
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}
