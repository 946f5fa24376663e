//! The ledger engine.
//!
//! `LedgerEngine` wires the store to the four engine services:
//! - `mutator` - the only sanctioned way to change a balance
//! - `hook` - document creation and approve/void/reject transitions
//! - `repair` - running-balance recompute, backfill and cache resync
//! - `reporter` - cached dashboard summaries and movement reports

mod hook;
mod mutator;
mod repair;
mod reporter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tallyhall_shared::config::ReportingConfig;
use tallyhall_shared::types::{DocumentId, EntityId};
use tracing::warn;

use crate::ledger::{LedgerEntry, LedgerError, LedgerResult, OwningEntity};
use crate::reports::{DashboardSummary, PrivilegeLevel, ReportRange};
use crate::store::{LedgerStore, StoreSession};
use crate::workflow::SourceDocument;

pub use hook::{AppliedLine, ApprovalResult, VoidResult};
pub use repair::{
    BackfillOutcome, CacheDrift, RecomputeOutcome, RepairFailure, RepairOptions, RepairReport,
};

type DashboardKey = (ReportRange, PrivilegeLevel);

/// Transactional ledger engine over a [`LedgerStore`].
pub struct LedgerEngine<S: LedgerStore> {
    store: S,
    dashboard_cache: Cache<DashboardKey, Arc<DashboardSummary>>,
    /// Bumped after every commit; summaries computed across a bump are dropped.
    write_generation: AtomicU64,
    low_stock_limit: usize,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Creates an engine with default reporting settings.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_config(store, &ReportingConfig::default())
    }

    /// Creates an engine with explicit reporting settings.
    #[must_use]
    pub fn with_config(store: S, reporting: &ReportingConfig) -> Self {
        let dashboard_cache = Cache::builder()
            .max_capacity(reporting.cache_capacity)
            .time_to_live(Duration::from_secs(reporting.cache_ttl_secs))
            .build();

        Self {
            store,
            dashboard_cache,
            write_generation: AtomicU64::new(0),
            low_stock_limit: reporting.low_stock_limit,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads an entity's current cache.
    pub async fn entity(&self, id: EntityId) -> LedgerResult<OwningEntity> {
        self.store
            .find_entity(id)
            .await?
            .ok_or(LedgerError::EntityNotFound(id))
    }

    /// Reads an entity's entries in ledger order.
    pub async fn entries(&self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>> {
        self.store.entries_for_entity(id).await
    }

    /// Reads a source document.
    pub async fn document(&self, id: DocumentId) -> LedgerResult<SourceDocument> {
        self.store
            .find_document(id)
            .await?
            .ok_or(LedgerError::DocumentNotFound(id))
    }

    fn generation(&self) -> u64 {
        self.write_generation.load(Ordering::SeqCst)
    }

    /// Caches `summary` unless a write committed since `generation` was read.
    fn cache_summary(&self, key: DashboardKey, summary: &Arc<DashboardSummary>, generation: u64) {
        if self.generation() != generation {
            return;
        }
        self.dashboard_cache.insert(key, Arc::clone(summary));
        // A commit may have invalidated between the check and the insert.
        if self.generation() != generation {
            self.dashboard_cache.invalidate(&key);
        }
    }

    /// Commits on success and rolls back on failure.
    async fn finish<T>(
        &self,
        session: S::Session,
        result: LedgerResult<T>,
    ) -> LedgerResult<T> {
        match result {
            Ok(value) => {
                session.commit().await?;
                self.write_generation.fetch_add(1, Ordering::SeqCst);
                self.dashboard_cache.invalidate_all();
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after {}", err.error_code());
                }
                Err(err)
            }
        }
    }
}
