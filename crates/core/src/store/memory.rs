//! In-process ledger store.
//!
//! Each entity and document row has a working copy behind an async mutex and
//! a committed snapshot behind a read-write lock. A session holds the owned
//! mutex guards it acquired until it commits or rolls back, which gives the
//! same per-row exclusive locking as `SELECT ... FOR UPDATE`. Plain reads
//! only see committed snapshots and never wait on a row lock.
//! Rollback restores the working copy taken when each row was first locked.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tallyhall_shared::config::EngineConfig;
use tallyhall_shared::types::{DocumentId, EntityId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerStore, StoreSession};
use crate::ledger::{
    EntityFilter, EntryKey, LedgerEntry, LedgerError, LedgerResult, OwningEntity,
};
use crate::workflow::{DocumentStatus, SourceDocument, WorkflowAction, WorkflowService};

/// Default wait before a lock acquisition fails with `LockTimeout`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct EntityCell {
    entity: OwningEntity,
    entries: Vec<LedgerEntry>,
}

/// One stored row. `committed` is `None` until the inserting session commits.
#[derive(Debug)]
struct Row<T> {
    working: Arc<Mutex<T>>,
    committed: RwLock<Option<T>>,
}

impl<T> Row<T> {
    fn uncommitted(value: T) -> Self {
        Self {
            working: Arc::new(Mutex::new(value)),
            committed: RwLock::new(None),
        }
    }

    fn is_committed(&self) -> bool {
        self.committed.read().is_some()
    }

    fn read<R>(&self, read: impl FnOnce(&T) -> R) -> Option<R> {
        self.committed.read().as_ref().map(read)
    }
}

#[derive(Debug)]
struct Inner {
    entities: DashMap<EntityId, Arc<Row<EntityCell>>>,
    documents: DashMap<DocumentId, Arc<Row<SourceDocument>>>,
    entry_keys: DashMap<EntryKey, EntityId>,
    sequence: AtomicI64,
    lock_timeout: Duration,
    /// Multi-row reads share it; commits take it exclusively while publishing.
    publish: RwLock<()>,
}

/// Ledger store kept entirely in memory.
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store with a custom lock timeout.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entities: DashMap::new(),
                documents: DashMap::new(),
                entry_keys: DashMap::new(),
                sequence: AtomicI64::new(0),
                lock_timeout,
                publish: RwLock::new(()),
            }),
        }
    }

    /// Creates an empty store using `engine.lock_timeout_ms`.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_lock_timeout(Duration::from_millis(config.lock_timeout_ms))
    }

    fn read_entity<R>(&self, id: EntityId, read: impl FnOnce(&EntityCell) -> R) -> Option<R> {
        let row = self.inner.entities.get(&id).map(|r| Arc::clone(r.value()))?;
        row.read(read)
    }

    /// Applies `read` to every committed entity under one publish snapshot.
    fn scan_entities<R>(&self, mut read: impl FnMut(&EntityCell) -> Option<R>) -> Vec<R> {
        let rows: Vec<_> = self
            .inner
            .entities
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        let _snapshot = self.inner.publish.read();
        rows.iter()
            .filter_map(|row| row.read(&mut read).flatten())
            .collect()
    }

    fn scan_documents(&self, statuses: &[DocumentStatus]) -> Vec<SourceDocument> {
        let rows: Vec<_> = self
            .inner
            .documents
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        let _snapshot = self.inner.publish.read();
        rows.iter()
            .filter_map(|row| {
                row.read(|d| statuses.contains(&d.status).then(|| d.clone()))
                    .flatten()
            })
            .collect()
    }
}

async fn acquire<T>(
    cell: Arc<Mutex<T>>,
    timeout: Duration,
    what: &str,
) -> LedgerResult<OwnedMutexGuard<T>> {
    tokio::time::timeout(timeout, cell.lock_owned())
        .await
        .map_err(|_| LedgerError::LockTimeout(format!("{what} lock not acquired within {timeout:?}")))
}

fn sorted_entries(entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(LedgerEntry::order_key);
    sorted
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> LedgerResult<MemorySession> {
        Ok(MemorySession {
            inner: Arc::clone(&self.inner),
            entities: HashMap::new(),
            documents: HashMap::new(),
            new_entities: Vec::new(),
            new_documents: Vec::new(),
            appended_keys: Vec::new(),
            finished: false,
        })
    }

    async fn find_entity(&self, id: EntityId) -> LedgerResult<Option<OwningEntity>> {
        Ok(self.read_entity(id, |c| c.entity.clone()))
    }

    async fn list_entities(&self, filter: &EntityFilter) -> LedgerResult<Vec<OwningEntity>> {
        let mut entities =
            self.scan_entities(|c| filter.matches(&c.entity).then(|| c.entity.clone()));
        entities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(entities)
    }

    async fn find_document(&self, id: DocumentId) -> LedgerResult<Option<SourceDocument>> {
        let row = self.inner.documents.get(&id).map(|d| Arc::clone(d.value()));
        Ok(row.and_then(|row| row.read(SourceDocument::clone)))
    }

    async fn list_documents(
        &self,
        statuses: &[DocumentStatus],
    ) -> LedgerResult<Vec<SourceDocument>> {
        let mut documents = self.scan_documents(statuses);
        documents.sort_by_key(|d| (d.created_at, d.id));
        Ok(documents)
    }

    async fn entries_for_entity(&self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>> {
        self.read_entity(id, |c| sorted_entries(&c.entries))
            .ok_or(LedgerError::EntityNotFound(id))
    }

    async fn entries_between(
        &self,
        filter: &EntityFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .scan_entities(|c| {
                filter.matches(&c.entity).then(|| {
                    c.entries
                        .iter()
                        .filter(|e| e.occurred_at >= from && e.occurred_at < to)
                        .cloned()
                        .collect::<Vec<_>>()
                })
            })
            .into_iter()
            .flatten()
            .collect();
        entries.sort_by_key(LedgerEntry::order_key);
        Ok(entries)
    }

    async fn opening_balances(
        &self,
        filter: &EntityFilter,
        at: DateTime<Utc>,
    ) -> LedgerResult<HashMap<EntityId, Decimal>> {
        let balances = self.scan_entities(|c| {
            if !filter.matches(&c.entity) {
                return None;
            }
            let mut prior = c.entries.iter().filter(|e| e.occurred_at < at).peekable();
            prior.peek()?;
            Some((
                c.entity.id,
                prior.fold(Decimal::ZERO, |acc, e| acc.saturating_add(e.net())),
            ))
        });
        Ok(balances.into_iter().collect())
    }
}

struct LockedEntity {
    row: Arc<Row<EntityCell>>,
    guard: OwnedMutexGuard<EntityCell>,
    original: OwningEntity,
    original_len: usize,
    original_entries: Option<Vec<LedgerEntry>>,
}

struct LockedDocument {
    row: Arc<Row<SourceDocument>>,
    guard: OwnedMutexGuard<SourceDocument>,
    original: SourceDocument,
}

/// Unit of work over a [`MemoryStore`].
pub struct MemorySession {
    inner: Arc<Inner>,
    entities: HashMap<EntityId, LockedEntity>,
    documents: HashMap<DocumentId, LockedDocument>,
    new_entities: Vec<EntityId>,
    new_documents: Vec<SourceDocument>,
    appended_keys: Vec<EntryKey>,
    finished: bool,
}

impl MemorySession {
    fn locked_entity(&mut self, id: EntityId) -> LedgerResult<&mut LockedEntity> {
        self.entities
            .get_mut(&id)
            .ok_or_else(|| LedgerError::Storage(format!("entity {id} is not locked by this session")))
    }

    fn restore(&mut self) {
        for (_, mut locked) in self.entities.drain() {
            locked.guard.entity = locked.original;
            match locked.original_entries.take() {
                Some(entries) => locked.guard.entries = entries,
                None => locked.guard.entries.truncate(locked.original_len),
            }
        }
        for (_, mut locked) in self.documents.drain() {
            *locked.guard = locked.original;
        }
        for id in self.new_entities.drain(..) {
            self.inner.entities.remove(&id);
        }
        for document in self.new_documents.drain(..) {
            self.inner.documents.remove(&document.id);
        }
        for key in self.appended_keys.drain(..) {
            self.inner.entry_keys.remove(&key);
        }
    }

    /// Copies every working row this session touched into its committed
    /// snapshot. Readers holding the publish lock see all or none of it.
    fn publish(&mut self) {
        let _publishing = self.inner.publish.write();
        for document in self.new_documents.drain(..) {
            if let Some(row) = self.inner.documents.get(&document.id) {
                *row.committed.write() = Some(document);
            }
        }
        for locked in self.entities.values() {
            *locked.row.committed.write() = Some((*locked.guard).clone());
        }
        for locked in self.documents.values() {
            *locked.row.committed.write() = Some((*locked.guard).clone());
        }
    }

    fn release(&mut self) {
        self.entities.clear();
        self.documents.clear();
        self.new_entities.clear();
        self.new_documents.clear();
        self.appended_keys.clear();
    }

    fn is_new_document(&self, id: DocumentId) -> bool {
        self.new_documents.iter().any(|d| d.id == id)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.finished {
            self.restore();
        }
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn insert_entity(&mut self, entity: &OwningEntity) -> LedgerResult<()> {
        let row = Arc::new(Row::uncommitted(EntityCell {
            entity: entity.clone(),
            entries: Vec::new(),
        }));
        let guard = Arc::clone(&row.working)
            .try_lock_owned()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        match self.inner.entities.entry(entity.id) {
            Entry::Occupied(_) => {
                return Err(LedgerError::Storage(format!(
                    "entity {} already exists",
                    entity.id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&row));
            }
        }

        self.new_entities.push(entity.id);
        self.entities.insert(
            entity.id,
            LockedEntity {
                row,
                guard,
                original: entity.clone(),
                original_len: 0,
                original_entries: None,
            },
        );
        Ok(())
    }

    async fn lock_entity(&mut self, id: EntityId) -> LedgerResult<OwningEntity> {
        if let Some(locked) = self.entities.get(&id) {
            return Ok(locked.guard.entity.clone());
        }

        let row = self
            .inner
            .entities
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LedgerError::EntityNotFound(id))?;
        let guard = acquire(Arc::clone(&row.working), self.inner.lock_timeout, "entity").await?;
        // The inserting session may have rolled back while we waited.
        if !row.is_committed() {
            return Err(LedgerError::EntityNotFound(id));
        }

        let entity = guard.entity.clone();
        self.entities.insert(
            id,
            LockedEntity {
                row,
                original: entity.clone(),
                original_len: guard.entries.len(),
                original_entries: None,
                guard,
            },
        );
        Ok(entity)
    }

    async fn update_entity_balances(&mut self, entity: &OwningEntity) -> LedgerResult<()> {
        let locked = self.locked_entity(entity.id)?;
        locked.guard.entity = entity.clone();
        Ok(())
    }

    async fn append_entry(&mut self, mut entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        self.locked_entity(entry.entity_id)?;

        if let Some(key) = entry.key() {
            match self.inner.entry_keys.entry(key) {
                Entry::Occupied(_) => return Err(LedgerError::DuplicateEntry(key)),
                Entry::Vacant(slot) => {
                    slot.insert(entry.entity_id);
                }
            }
            self.appended_keys.push(key);
        }

        entry.sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let locked = self.locked_entity(entry.entity_id)?;
        locked.guard.entries.push(entry.clone());
        Ok(entry)
    }

    async fn entity_entries(&mut self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>> {
        let locked = self.locked_entity(id)?;
        Ok(sorted_entries(&locked.guard.entries))
    }

    async fn update_running_balances(&mut self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        for entry in entries {
            let locked = self.locked_entity(entry.entity_id)?;
            if locked.original_entries.is_none() {
                locked.original_entries = Some(locked.guard.entries.clone());
            }
            let stored = locked
                .guard
                .entries
                .iter_mut()
                .find(|e| e.id == entry.id)
                .ok_or_else(|| LedgerError::Storage(format!("entry {} not found", entry.id)))?;
            stored.balance_before = entry.balance_before;
            stored.running_balance = entry.running_balance;
            stored.secondary_running_balance = entry.secondary_running_balance;
        }
        Ok(())
    }

    async fn entry_exists(&mut self, key: &EntryKey) -> LedgerResult<bool> {
        Ok(self.inner.entry_keys.contains_key(key))
    }

    async fn insert_document(&mut self, document: &SourceDocument) -> LedgerResult<()> {
        let row = Arc::new(Row::uncommitted(document.clone()));
        match self.inner.documents.entry(document.id) {
            Entry::Occupied(_) => Err(LedgerError::Storage(format!(
                "document {} already exists",
                document.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(row);
                self.new_documents.push(document.clone());
                Ok(())
            }
        }
    }

    async fn lock_document(&mut self, id: DocumentId) -> LedgerResult<SourceDocument> {
        if let Some(locked) = self.documents.get(&id) {
            return Ok(locked.guard.clone());
        }

        let row = self
            .inner
            .documents
            .get(&id)
            .map(|d| Arc::clone(d.value()))
            .ok_or(LedgerError::DocumentNotFound(id))?;
        let guard =
            acquire(Arc::clone(&row.working), self.inner.lock_timeout, "document").await?;
        if !row.is_committed() && !self.is_new_document(id) {
            return Err(LedgerError::DocumentNotFound(id));
        }

        let document = guard.clone();
        self.documents.insert(
            id,
            LockedDocument {
                row,
                original: document.clone(),
                guard,
            },
        );
        Ok(document)
    }

    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: DocumentStatus,
        action: &WorkflowAction,
    ) -> LedgerResult<bool> {
        WorkflowService::ensure_transition(from, action)?;
        self.lock_document(id).await?;
        let locked = self
            .documents
            .get_mut(&id)
            .ok_or(LedgerError::DocumentNotFound(id))?;
        if locked.guard.status != from {
            return Ok(false);
        }
        locked.guard.apply(action);
        Ok(true)
    }

    async fn commit(mut self) -> LedgerResult<()> {
        self.publish();
        self.finished = true;
        self.release();
        Ok(())
    }

    async fn rollback(mut self) -> LedgerResult<()> {
        self.restore();
        self.finished = true;
        Ok(())
    }
}
