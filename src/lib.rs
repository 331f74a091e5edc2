//! Conference seat registration over an optimistic transactional store, with
//! append-only SQLite journaling.
//!
//! # Examples
//!
//! Compiling caller filters into a query:
//! ```
//! use confcentral::query::{Attribute, Clause, compile_filters};
//!
//! let spec = compile_filters(&[
//!     Clause::new("CITY", "EQ", "Chicago"),
//!     Clause::new("MAX_ATTENDEES", "GT", "50"),
//! ])
//! .expect("valid filters");
//! assert_eq!(spec.range_field(), Some(Attribute::MaxAttendees));
//! ```
//!
//! Registering through the service with a SQLite journal:
//! ```no_run
//! use confcentral::{
//!     config::ConferenceConfig,
//!     core::slot::AnnouncementSlot,
//!     event::EventDraft,
//!     persist::sqlite::SqliteJournal,
//!     runtime::handle::spawn_conference,
//!     service::ConferenceService,
//!     types::Principal,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ConferenceConfig::default();
//! let journal = SqliteJournal::open("confcentral.db").expect("open sqlite");
//! let store = journal.load_store().expect("replay journal");
//! let handle = spawn_conference(store, Some(Box::new(journal)), config.runtime.clone());
//! let service = ConferenceService::new(handle.clone(), AnnouncementSlot::new(), &config);
//!
//! let organizer = Principal::new("org-1", "org@example.com");
//! let event = service
//!     .create_event(&organizer, EventDraft::new("RustConf", 100))
//!     .await
//!     .expect("create");
//! let attendee = Principal::new("user-1", "user@example.com");
//! service.register(&attendee, &event.key).await.expect("register");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Administrator alerts.
pub mod alert;
/// Runtime, retry, and refresh configuration.
pub mod config;
/// In-memory authoritative store, transactions, and the announcement slot.
pub mod core;
/// Registration and announcement engines plus their collaborator traits.
pub mod engine;
/// Crate-wide error classification.
pub mod error;
/// Event records and creation drafts.
pub mod event;
/// Journal op model.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// User profiles and profile patches.
pub mod profile;
/// Filter compilation and query execution.
pub mod query;
/// Shared-store runtime handle and events.
pub mod runtime;
/// Caller-facing facade.
pub mod service;
/// Shared primitive types and enums.
pub mod types;
