//! Registration and announcement engines over the datastore seam.

/// Scarcity announcement refresher.
pub mod announcement;
/// Atomic registration engine.
pub mod registration;
/// Datastore and cache traits the engines depend on.
pub mod traits;
