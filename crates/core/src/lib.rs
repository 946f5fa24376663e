//! Core ledger engine for Tallyhall.
//!
//! This crate contains the business logic with ZERO web or database dependencies.
//! Storage is reached through the traits in [`store`]; an in-memory backend
//! ships here and the Postgres backend lives in `tallyhall-db`.
//!
//! # Modules
//!
//! - `ledger` - Entities, entries, floor policy and running-balance replay
//! - `workflow` - Source documents, status transitions and line dispatch
//! - `reports` - Dashboard and movement report aggregation with redaction
//! - `store` - Storage traits and the in-memory backend
//! - `engine` - Atomic mutator, synchronization hook, repair job, reporter

pub mod engine;
pub mod ledger;
pub mod reports;
pub mod store;
pub mod workflow;

pub use engine::LedgerEngine;
pub use ledger::{LedgerError, LedgerResult};
pub use store::{LedgerStore, MemoryStore, StoreSession};
