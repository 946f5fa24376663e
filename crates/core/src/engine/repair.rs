//! Recomputation job.
//!
//! Three passes, all taking the same per-entity lock as the mutator:
//! - backfill: synthesize entries missing for approved/voided documents
//! - recompute: rewrite running-balance snapshots from the ordered history
//! - resync: set the balance cache to the sum of the entity's entries
//!
//! Each entity (and each document during backfill) is repaired in its own
//! session, so a failure never leaves one half recomputed and the job moves
//! on to the next one.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tallyhall_shared::types::{DocumentId, EntityId, LedgerEntryId};
use tracing::{debug, info, instrument, warn};

use super::LedgerEngine;
use crate::ledger::{
    EntityFilter, EntrySource, FloorPolicy, LedgerEntry, LedgerError, LedgerResult, OwningEntity,
    ReplayTotals, replay_running_balances, split_signed,
};
use crate::store::{LedgerStore, StoreSession};
use crate::workflow::{DispatchPhase, DispatchService, DocumentStatus, SourceDocument};

/// Options of a repair run.
#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Restrict the run to these entities.
    pub entity_ids: Option<Vec<EntityId>>,
}

/// Difference between an entity's cache and its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheDrift {
    /// Entity whose cache drifted.
    pub entity_id: EntityId,
    /// Balance held in the cache before resync.
    pub cached_balance: Decimal,
    /// Balance implied by the entries.
    pub ledger_balance: Decimal,
    /// Secondary bucket held in the cache before resync.
    pub cached_secondary: Decimal,
    /// Secondary bucket implied by the entries.
    pub ledger_secondary: Decimal,
}

/// Result of recomputing one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeOutcome {
    /// Entity recomputed.
    pub entity_id: EntityId,
    /// Entries replayed.
    pub entries: usize,
    /// Entries whose running-balance snapshot changed.
    pub rewritten: usize,
    /// Set when the cache did not match the ledger.
    pub drift: Option<CacheDrift>,
    /// True when the ledger implies negative stock; the cache is floored.
    pub negative_stock: bool,
}

/// Result of a backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillOutcome {
    /// Approved and voided documents examined.
    pub documents_scanned: usize,
    /// Entries synthesized for missing keys.
    pub entries_backfilled: usize,
    /// Entities that received synthesized entries.
    pub touched: BTreeSet<EntityId>,
    /// Documents that could not be backfilled.
    pub failures: Vec<RepairFailure>,
}

/// One document or entity the job could not repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairFailure {
    /// Document being backfilled, if any.
    pub document_id: Option<DocumentId>,
    /// Entity being recomputed, if any.
    pub entity_id: Option<EntityId>,
    /// Stable code of the underlying error.
    pub error_code: &'static str,
    /// Error message.
    pub message: String,
}

/// Summary of a full repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// True if nothing was written.
    pub dry_run: bool,
    /// Approved and voided documents examined by backfill.
    pub documents_scanned: usize,
    /// Entries synthesized by backfill.
    pub entries_backfilled: usize,
    /// Entities recomputed.
    pub entities_scanned: usize,
    /// Running-balance snapshots rewritten.
    pub entries_rewritten: usize,
    /// Entities whose cache did not match the ledger.
    pub drifted: Vec<CacheDrift>,
    /// Stock entities whose ledger sums below zero.
    pub anomalies: Vec<EntityId>,
    /// Documents and entities that could not be repaired.
    pub failures: Vec<RepairFailure>,
}

impl RepairReport {
    /// Returns true if nothing needed repair and nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries_backfilled == 0
            && self.entries_rewritten == 0
            && self.drifted.is_empty()
            && self.anomalies.is_empty()
            && self.failures.is_empty()
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Recomputes running balances and resyncs the cache of one entity.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn recompute_entity(&self, entity_id: EntityId) -> LedgerResult<RecomputeOutcome> {
        self.recompute(entity_id, false).await
    }

    /// Synthesizes missing entries for approved and voided documents.
    ///
    /// Synthesized entries carry placeholder snapshots and do not touch the
    /// cache; a recompute of the touched entities settles both.
    #[instrument(skip(self))]
    pub async fn backfill(&self, dry_run: bool) -> LedgerResult<BackfillOutcome> {
        self.backfill_matching(&EntityFilter::all(), dry_run).await
    }

    /// Backfill, then recompute and resync every matching entity.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run_repair(&self, options: RepairOptions) -> LedgerResult<RepairReport> {
        let filter = options
            .entity_ids
            .clone()
            .map_or_else(EntityFilter::all, EntityFilter::ids);

        let backfill = self.backfill_matching(&filter, options.dry_run).await?;
        let mut report = RepairReport {
            dry_run: options.dry_run,
            documents_scanned: backfill.documents_scanned,
            entries_backfilled: backfill.entries_backfilled,
            failures: backfill.failures,
            ..RepairReport::default()
        };

        let entities = self.store.list_entities(&filter).await?;
        for entity in entities {
            report.entities_scanned += 1;
            match self.recompute(entity.id, options.dry_run).await {
                Ok(outcome) => {
                    report.entries_rewritten += outcome.rewritten;
                    if outcome.negative_stock {
                        report.anomalies.push(entity.id);
                    }
                    if let Some(drift) = outcome.drift {
                        report.drifted.push(drift);
                    }
                }
                Err(err) => {
                    warn!(entity_id = %entity.id, error = %err, "Entity repair failed, skipping");
                    report.failures.push(RepairFailure {
                        document_id: None,
                        entity_id: Some(entity.id),
                        error_code: err.error_code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            dry_run = report.dry_run,
            entities = report.entities_scanned,
            backfilled = report.entries_backfilled,
            rewritten = report.entries_rewritten,
            drifted = report.drifted.len(),
            failures = report.failures.len(),
            "Repair finished"
        );
        Ok(report)
    }

    async fn recompute(&self, entity_id: EntityId, dry_run: bool) -> LedgerResult<RecomputeOutcome> {
        let mut session = self.store.begin().await?;
        let result = async {
            let entity = session.lock_entity(entity_id).await?;
            let stored = session.entity_entries(entity_id).await?;
            let originals: HashMap<LedgerEntryId, LedgerEntry> =
                stored.iter().map(|e| (e.id, e.clone())).collect();

            let mut entries = stored;
            let totals = replay_running_balances(&mut entries);
            let changed: Vec<LedgerEntry> = entries
                .into_iter()
                .filter(|entry| {
                    originals.get(&entry.id).is_none_or(|original| {
                        original.balance_before != entry.balance_before
                            || original.running_balance != entry.running_balance
                            || original.secondary_running_balance
                                != entry.secondary_running_balance
                    })
                })
                .collect();
            if !changed.is_empty() {
                session.update_running_balances(&changed).await?;
            }

            let (resynced, negative_stock) = resync(&entity, &totals);
            let drift = (resynced.balance != entity.balance
                || resynced.secondary_balance != entity.secondary_balance)
                .then(|| CacheDrift {
                    entity_id,
                    cached_balance: entity.balance,
                    ledger_balance: resynced.balance,
                    cached_secondary: entity.secondary_balance,
                    ledger_secondary: resynced.secondary_balance,
                });
            if resynced != entity {
                session.update_entity_balances(&resynced).await?;
            }

            if negative_stock {
                warn!(entity_id = %entity_id, implied = %totals.balance, "Ledger implies negative stock");
            }
            Ok(RecomputeOutcome {
                entity_id,
                entries: totals.entry_count,
                rewritten: changed.len(),
                drift,
                negative_stock,
            })
        }
        .await;

        if dry_run {
            session.rollback().await?;
            return result;
        }
        let outcome = self.finish(session, result).await?;
        debug!(
            entity_id = %entity_id,
            rewritten = outcome.rewritten,
            drifted = outcome.drift.is_some(),
            "Entity recomputed"
        );
        Ok(outcome)
    }

    async fn backfill_matching(
        &self,
        filter: &EntityFilter,
        dry_run: bool,
    ) -> LedgerResult<BackfillOutcome> {
        let documents = self
            .store
            .list_documents(&[DocumentStatus::Approved, DocumentStatus::Voided])
            .await?;
        let mut outcome = BackfillOutcome::default();

        for document in documents {
            outcome.documents_scanned += 1;
            match self.backfill_document(document.id, filter, dry_run).await {
                Ok(touched) => {
                    outcome.entries_backfilled += touched.len();
                    outcome.touched.extend(touched);
                }
                Err(err) => {
                    warn!(document_id = %document.id, error = %err, "Document backfill failed, skipping");
                    outcome.failures.push(RepairFailure {
                        document_id: Some(document.id),
                        entity_id: None,
                        error_code: err.error_code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if outcome.entries_backfilled > 0 {
            info!(
                dry_run,
                documents = outcome.documents_scanned,
                entries = outcome.entries_backfilled,
                "Backfilled missing ledger entries"
            );
        }
        Ok(outcome)
    }

    /// Returns one entity id per synthesized entry.
    async fn backfill_document(
        &self,
        document_id: DocumentId,
        filter: &EntityFilter,
        dry_run: bool,
    ) -> LedgerResult<Vec<EntityId>> {
        let mut session = self.store.begin().await?;
        let result = async {
            let document = session.lock_document(document_id).await?;
            let mut touched = Vec::new();
            for phase in phases(&document) {
                for planned in DispatchService::plan(&document, phase) {
                    if filter
                        .ids
                        .as_ref()
                        .is_some_and(|ids| !ids.contains(&planned.entity_id))
                    {
                        continue;
                    }
                    let entity = session.lock_entity(planned.entity_id).await?;
                    if entity.kind != planned.expected_kind {
                        return Err(LedgerError::EntityKindMismatch {
                            entity_id: entity.id,
                            expected: planned.expected_kind,
                            actual: entity.kind,
                        });
                    }
                    if !filter.matches(&entity) || session.entry_exists(&planned.key()).await? {
                        continue;
                    }

                    let (increase, decrease) = split_signed(planned.delta);
                    let (secondary_increase, secondary_decrease) =
                        split_signed(planned.secondary_delta);
                    session
                        .append_entry(LedgerEntry {
                            id: LedgerEntryId::new(),
                            entity_id: entity.id,
                            kind: planned.entry_kind,
                            increase,
                            decrease,
                            secondary_increase,
                            secondary_decrease,
                            source: Some(EntrySource {
                                document_id,
                                line_no: planned.line_no,
                            }),
                            description: planned.description,
                            occurred_at: planned.occurred_at,
                            created_at: Utc::now(),
                            sequence: 0,
                            balance_before: entity.balance,
                            running_balance: entity.balance,
                            secondary_running_balance: entity.secondary_balance,
                        })
                        .await?;
                    touched.push(entity.id);
                }
            }
            Ok(touched)
        }
        .await;

        if dry_run {
            session.rollback().await?;
            return result;
        }
        self.finish(session, result).await
    }
}

/// Dispatch phases whose entries a document in its current status must have.
fn phases(document: &SourceDocument) -> Vec<DispatchPhase> {
    match document.status {
        DocumentStatus::Approved => vec![DispatchPhase::Approval],
        DocumentStatus::Voided => vec![DispatchPhase::Approval, DispatchPhase::Reversal],
        DocumentStatus::Pending | DocumentStatus::Rejected => Vec::new(),
    }
}

/// Cache values implied by the ledger. Floored entities never cache a
/// negative balance; the flag reports when flooring happened.
fn resync(entity: &OwningEntity, totals: &ReplayTotals) -> (OwningEntity, bool) {
    let floored = entity.kind.floor_policy() == FloorPolicy::FloorAtZero;
    let negative_stock =
        floored && (totals.balance < Decimal::ZERO || totals.secondary_balance < Decimal::ZERO);

    let mut resynced = entity.clone();
    resynced.balance = if floored {
        totals.balance.max(Decimal::ZERO)
    } else {
        totals.balance
    };
    resynced.secondary_balance = totals.secondary_balance.max(Decimal::ZERO);
    resynced.lifetime_increase = totals.lifetime_increase;
    resynced.lifetime_decrease = totals.lifetime_decrease;
    if resynced != *entity {
        resynced.updated_at = Utc::now();
    }
    (resynced, negative_stock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntityKind;
    use rust_decimal_macros::dec;

    fn totals(balance: Decimal, secondary: Decimal) -> ReplayTotals {
        ReplayTotals {
            balance,
            secondary_balance: secondary,
            lifetime_increase: balance.max(Decimal::ZERO),
            lifetime_decrease: Decimal::ZERO,
            entry_count: 1,
            rewritten: 0,
        }
    }

    fn entity(kind: EntityKind, balance: Decimal) -> OwningEntity {
        let now = Utc::now();
        OwningEntity {
            id: EntityId::new(),
            kind,
            name: kind.to_string(),
            balance,
            secondary_balance: Decimal::ZERO,
            reorder_level: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
            lifetime_increase: balance.max(Decimal::ZERO),
            lifetime_decrease: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_resync_floors_negative_stock() {
        let sku = entity(EntityKind::StockUnit, dec!(0));
        let (resynced, negative) = resync(&sku, &totals(dec!(-4), dec!(0)));
        assert!(negative);
        assert_eq!(resynced.balance, Decimal::ZERO);
    }

    #[test]
    fn test_resync_keeps_signed_accounts() {
        let vendor = entity(EntityKind::Account, dec!(0));
        let (resynced, negative) = resync(&vendor, &totals(dec!(-250), dec!(0)));
        assert!(!negative);
        assert_eq!(resynced.balance, dec!(-250));
    }

    #[test]
    fn test_resync_matching_cache_is_untouched() {
        let sku = entity(EntityKind::StockUnit, dec!(12));
        let (resynced, negative) = resync(&sku, &totals(dec!(12), dec!(0)));
        assert!(!negative);
        assert_eq!(resynced, sku);
    }

    #[test]
    fn test_report_is_clean() {
        assert!(RepairReport::default().is_clean());
        let report = RepairReport {
            entries_rewritten: 1,
            ..RepairReport::default()
        };
        assert!(!report.is_clean());
    }
}
