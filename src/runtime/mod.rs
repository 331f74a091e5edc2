//! Shared store handle, journal writer, and event stream.

/// Event stream types emitted by the runtime.
pub mod events;
/// Datastore handle and journal writer.
pub mod handle;
