//! Storage abstraction for the ledger engine.
//!
//! The engine talks to storage through two traits:
//! - [`LedgerStore`] - read access and the entry point for units of work
//! - [`StoreSession`] - one unit of work holding exclusive row locks until
//!   `commit` or `rollback`
//!
//! Every lock taken through a session is held for the rest of the session.
//! Dropping a session without committing discards its writes.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tallyhall_shared::types::{DocumentId, EntityId};

use crate::ledger::{EntityFilter, EntryKey, LedgerEntry, LedgerResult, OwningEntity};
use crate::workflow::{DocumentStatus, SourceDocument, WorkflowAction};

pub use memory::MemoryStore;

/// Durable storage for entities, entries and source documents.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Unit-of-work type.
    type Session: StoreSession;

    /// Opens a unit of work.
    async fn begin(&self) -> LedgerResult<Self::Session>;

    /// Reads an entity's current cache without locking.
    async fn find_entity(&self, id: EntityId) -> LedgerResult<Option<OwningEntity>>;

    /// Lists entities matching `filter`, ordered by name.
    async fn list_entities(&self, filter: &EntityFilter) -> LedgerResult<Vec<OwningEntity>>;

    /// Reads a document without locking.
    async fn find_document(&self, id: DocumentId) -> LedgerResult<Option<SourceDocument>>;

    /// Lists documents in any of `statuses`, oldest first.
    async fn list_documents(&self, statuses: &[DocumentStatus])
    -> LedgerResult<Vec<SourceDocument>>;

    /// An entity's entries ordered by `(occurred_at, created_at, sequence)`.
    async fn entries_for_entity(&self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>>;

    /// Entries of matching entities with `from <= occurred_at < to`.
    async fn entries_between(
        &self,
        filter: &EntityFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    /// Σ(increase − decrease) per matching entity over entries with
    /// `occurred_at < at`. Entities without such entries are omitted.
    async fn opening_balances(
        &self,
        filter: &EntityFilter,
        at: DateTime<Utc>,
    ) -> LedgerResult<HashMap<EntityId, Decimal>>;
}

/// One atomic unit of work.
#[async_trait]
pub trait StoreSession: Send {
    /// Inserts a new entity.
    async fn insert_entity(&mut self, entity: &OwningEntity) -> LedgerResult<()>;

    /// Takes the exclusive per-entity lock and returns the locked row.
    ///
    /// Fails with `EntityNotFound` if the entity does not exist and with
    /// `LockTimeout` if the wait exceeds the configured timeout.
    async fn lock_entity(&mut self, id: EntityId) -> LedgerResult<OwningEntity>;

    /// Writes the balance cache of a locked entity.
    async fn update_entity_balances(&mut self, entity: &OwningEntity) -> LedgerResult<()>;

    /// Appends an entry; the store assigns and returns the sequence.
    ///
    /// Fails with `DuplicateEntry` if a document-sourced entry with the same
    /// key exists.
    async fn append_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry>;

    /// All entries of a locked entity, ordered by `(occurred_at, created_at, sequence)`.
    async fn entity_entries(&mut self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>>;

    /// Overwrites the running-balance snapshots of the given entries.
    async fn update_running_balances(&mut self, entries: &[LedgerEntry]) -> LedgerResult<()>;

    /// Returns true if an entry with `key` exists.
    async fn entry_exists(&mut self, key: &EntryKey) -> LedgerResult<bool>;

    /// Inserts a new document with its lines.
    async fn insert_document(&mut self, document: &SourceDocument) -> LedgerResult<()>;

    /// Takes the exclusive per-document lock and returns the locked row.
    async fn lock_document(&mut self, id: DocumentId) -> LedgerResult<SourceDocument>;

    /// Applies `action` only if the document's status is still `from`.
    ///
    /// Returns false when the guard did not match; nothing is written then.
    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: DocumentStatus,
        action: &WorkflowAction,
    ) -> LedgerResult<bool>;

    /// Makes every write visible and releases all locks.
    async fn commit(self) -> LedgerResult<()>;

    /// Discards every write and releases all locks.
    async fn rollback(self) -> LedgerResult<()>;
}
