//! Aggregation reporter: reads through the store, never writes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use super::LedgerEngine;
use crate::ledger::{EntityFilter, LedgerResult};
use crate::reports::{
    DashboardInput, DashboardSummary, MovementReport, RedactionPolicy, ReportRange, ReportService,
    ViewerRole,
};
use crate::store::LedgerStore;

impl<S: LedgerStore> LedgerEngine<S> {
    /// Dashboard for `range` as seen by `role`.
    ///
    /// Summaries are cached per window and privilege level until the next
    /// successful write or the configured TTL.
    #[instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub async fn dashboard_summary(
        &self,
        range: ReportRange,
        role: ViewerRole,
    ) -> LedgerResult<Arc<DashboardSummary>> {
        let policy = RedactionPolicy::for_role(role);
        let key = (range, policy.level());
        if let Some(cached) = self.dashboard_cache.get(&key) {
            debug!("Dashboard cache hit");
            return Ok(cached);
        }

        let generation = self.generation();
        let all = EntityFilter::all();
        let previous = range.previous();
        let entities = self.store.list_entities(&all).await?;
        let current_entries = self.store.entries_between(&all, range.start, range.end).await?;
        let previous_entries = self
            .store
            .entries_between(&all, previous.start, previous.end)
            .await?;

        let summary = Arc::new(ReportService::dashboard(&DashboardInput {
            range,
            entities: &entities,
            current_entries: &current_entries,
            previous_entries: &previous_entries,
            policy,
            low_stock_limit: self.low_stock_limit,
            now: Utc::now(),
        }));
        self.cache_summary(key, &summary, generation);
        Ok(summary)
    }

    /// Dashboard rendered as JSON, financial figures redacted per `role`.
    pub async fn dashboard_json(
        &self,
        range: ReportRange,
        role: ViewerRole,
    ) -> LedgerResult<serde_json::Value> {
        Ok(self.dashboard_summary(range, role).await?.to_json())
    }

    /// Opening, in, out and closing per matching entity.
    #[instrument(skip(self, filter), fields(start = %range.start, end = %range.end))]
    pub async fn movement_report(
        &self,
        range: ReportRange,
        filter: &EntityFilter,
    ) -> LedgerResult<MovementReport> {
        let entities = self.store.list_entities(filter).await?;
        let openings = self.store.opening_balances(filter, range.start).await?;
        let entries = self
            .store
            .entries_between(filter, range.start, range.end)
            .await?;
        Ok(ReportService::movement_report(
            range, &entities, &openings, &entries,
        ))
    }
}
