//! In-memory authoritative store, transactions, and the announcement slot.

/// Helper index aliases.
pub mod indices;
/// Singleton announcement cache cell.
pub mod slot;
/// Authoritative user/event store with versioned optimistic commits.
pub mod store;
/// Transaction scope, read set, and write set.
pub mod txn;
