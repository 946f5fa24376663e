//! Report generation service.
//!
//! Pure functions over entity snapshots and entry slices; nothing here
//! touches storage.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tallyhall_shared::types::EntityId;

use super::redaction::RedactionPolicy;
use super::types::{
    DashboardSummary, DashboardTotals, Figure, Granularity, LowStockItem, MovementReport,
    MovementReportRow, MovementTotal, ReportRange, TimeSeriesPoint,
};
use crate::ledger::{EntityKind, EntryKind, LedgerEntry, OwningEntity};

/// Inputs of a dashboard computation.
#[derive(Debug, Clone, Copy)]
pub struct DashboardInput<'a> {
    /// Reporting window.
    pub range: ReportRange,
    /// Every entity (cache values).
    pub entities: &'a [OwningEntity],
    /// Entries inside `range`.
    pub current_entries: &'a [LedgerEntry],
    /// Entries inside `range.previous()`.
    pub previous_entries: &'a [LedgerEntry],
    /// Viewer policy.
    pub policy: RedactionPolicy,
    /// Maximum rows in the low-stock list.
    pub low_stock_limit: usize,
    /// Timestamp stamped on the summary.
    pub now: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Net {
    count: usize,
    net: Decimal,
}

/// Service for generating dashboard and movement reports.
pub struct ReportService;

impl ReportService {
    /// Builds the dashboard summary.
    #[must_use]
    pub fn dashboard(input: &DashboardInput<'_>) -> DashboardSummary {
        let policy = input.policy;
        let kinds: HashMap<EntityId, EntityKind> =
            input.entities.iter().map(|e| (e.id, e.kind)).collect();

        let totals = Self::totals(input.entities, policy);
        let movements = Self::movements(&kinds, input.current_entries, input.previous_entries, policy);
        let low_stock = Self::low_stock(input.entities, input.low_stock_limit);
        let granularity = Granularity::for_span(input.range.span());
        let series = Self::series(input.range, granularity, &kinds, input.current_entries, policy);

        let redacted = totals.inventory_value.is_redacted()
            || totals.vendor_payable.is_redacted()
            || movements.iter().any(|m| m.current.is_redacted());

        DashboardSummary {
            range: input.range,
            previous_range: input.range.previous(),
            granularity,
            totals,
            movements,
            low_stock,
            series,
            redacted,
            generated_at: input.now,
        }
    }

    /// Balance totals; money figures go through the policy.
    #[must_use]
    pub fn totals(entities: &[OwningEntity], policy: RedactionPolicy) -> DashboardTotals {
        let mut stock_units = Decimal::ZERO;
        let mut damaged_units = Decimal::ZERO;
        let mut inventory_value = Decimal::ZERO;
        let mut vendor_payable = Decimal::ZERO;

        for entity in entities {
            match entity.kind {
                EntityKind::StockUnit => {
                    stock_units = stock_units.saturating_add(entity.balance);
                    damaged_units = damaged_units.saturating_add(entity.secondary_balance);
                    inventory_value = inventory_value.saturating_add(entity.valuation());
                }
                EntityKind::Account => {
                    vendor_payable = vendor_payable.saturating_add(entity.balance);
                }
            }
        }

        DashboardTotals {
            stock_units,
            damaged_units,
            inventory_value: policy.financial(inventory_value),
            vendor_payable: policy.financial(vendor_payable),
        }
    }

    /// Net movement per (entity kind, entry kind), current vs previous window.
    ///
    /// Stock rows are unit counts and stay visible; account rows are money.
    #[must_use]
    pub fn movements(
        kinds: &HashMap<EntityId, EntityKind>,
        current: &[LedgerEntry],
        previous: &[LedgerEntry],
        policy: RedactionPolicy,
    ) -> Vec<MovementTotal> {
        let current = Self::group(kinds, current);
        let previous = Self::group(kinds, previous);

        let mut keys: Vec<(EntityKind, EntryKind)> =
            current.keys().chain(previous.keys()).copied().collect();
        keys.sort_by_key(|(entity_kind, entry_kind)| (entity_kind.as_str(), *entry_kind));
        keys.dedup();

        keys.into_iter()
            .map(|key| {
                let cur = current.get(&key).copied().unwrap_or_default();
                let prev = previous.get(&key).copied().unwrap_or_default();
                let figure = |value: Decimal| match key.0 {
                    EntityKind::StockUnit => Figure::Visible(value),
                    EntityKind::Account => policy.financial(value),
                };
                MovementTotal {
                    entity_kind: key.0,
                    entry_kind: key.1,
                    current_count: cur.count,
                    current: figure(cur.net),
                    previous: figure(prev.net),
                    change_percent: Self::change_percent(cur.net, prev.net).map(figure),
                }
            })
            .collect()
    }

    /// `(current − previous) / |previous| × 100`, rounded to 2 places.
    #[must_use]
    pub fn change_percent(current: Decimal, previous: Decimal) -> Option<Decimal> {
        if previous.is_zero() {
            return None;
        }
        current
            .checked_sub(previous)?
            .checked_div(previous.abs())?
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|pct| pct.round_dp(2))
    }

    /// Stock units strictly under their reorder level, largest shortfall first.
    #[must_use]
    pub fn low_stock(entities: &[OwningEntity], limit: usize) -> Vec<LowStockItem> {
        let mut items: Vec<LowStockItem> = entities
            .iter()
            .filter(|e| e.is_below_reorder_level())
            .map(|e| LowStockItem {
                entity_id: e.id,
                name: e.name.clone(),
                balance: e.balance,
                reorder_level: e.reorder_level,
                shortfall: e.reorder_level - e.balance,
            })
            .collect();
        items.sort_by(|a, b| b.shortfall.cmp(&a.shortfall).then_with(|| a.name.cmp(&b.name)));
        items.truncate(limit);
        items
    }

    /// Bucketed in/out series over the window.
    #[must_use]
    pub fn series(
        range: ReportRange,
        granularity: Granularity,
        kinds: &HashMap<EntityId, EntityKind>,
        entries: &[LedgerEntry],
        policy: RedactionPolicy,
    ) -> Vec<TimeSeriesPoint> {
        // (stock_in, stock_out, payable_in, payable_out) per bucket start
        let mut buckets: BTreeMap<DateTime<Utc>, [Decimal; 4]> = BTreeMap::new();
        let mut cursor = granularity.bucket_start(range.start);
        while cursor < range.end {
            buckets.insert(cursor, [Decimal::ZERO; 4]);
            cursor += granularity.step();
        }

        for entry in entries.iter().filter(|e| range.contains(e.occurred_at)) {
            let Some(kind) = kinds.get(&entry.entity_id) else {
                continue;
            };
            let Some(sums) = buckets.get_mut(&granularity.bucket_start(entry.occurred_at)) else {
                continue;
            };
            let offset = match kind {
                EntityKind::StockUnit => 0,
                EntityKind::Account => 2,
            };
            sums[offset] = sums[offset].saturating_add(entry.increase);
            sums[offset + 1] = sums[offset + 1].saturating_add(entry.decrease);
        }

        buckets
            .into_iter()
            .map(|(bucket_start, [stock_in, stock_out, payable_in, payable_out])| {
                TimeSeriesPoint {
                    bucket_start,
                    stock_in,
                    stock_out,
                    payable_in: policy.financial(payable_in),
                    payable_out: policy.financial(payable_out),
                }
            })
            .collect()
    }

    /// Opening/in/out/closing per entity.
    ///
    /// `openings` holds Σ net before the window; entities missing from it
    /// open at zero.
    #[must_use]
    pub fn movement_report(
        range: ReportRange,
        entities: &[OwningEntity],
        openings: &HashMap<EntityId, Decimal>,
        entries: &[LedgerEntry],
    ) -> MovementReport {
        let mut flows: HashMap<EntityId, (Decimal, Decimal)> = HashMap::new();
        for entry in entries.iter().filter(|e| range.contains(e.occurred_at)) {
            let flow = flows.entry(entry.entity_id).or_default();
            flow.0 = flow.0.saturating_add(entry.increase);
            flow.1 = flow.1.saturating_add(entry.decrease);
        }

        let mut rows: Vec<MovementReportRow> = entities
            .iter()
            .map(|entity| {
                let opening = openings.get(&entity.id).copied().unwrap_or_default();
                let (inflow, outflow) = flows.get(&entity.id).copied().unwrap_or_default();
                MovementReportRow {
                    entity_id: entity.id,
                    name: entity.name.clone(),
                    kind: entity.kind,
                    opening,
                    inflow,
                    outflow,
                    closing: opening.saturating_add(inflow).saturating_sub(outflow),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.entity_id.cmp(&b.entity_id)));

        MovementReport { range, rows }
    }

    fn group(
        kinds: &HashMap<EntityId, EntityKind>,
        entries: &[LedgerEntry],
    ) -> HashMap<(EntityKind, EntryKind), Net> {
        let mut groups: HashMap<(EntityKind, EntryKind), Net> = HashMap::new();
        for entry in entries {
            if let Some(kind) = kinds.get(&entry.entity_id) {
                let group = groups.entry((*kind, entry.kind)).or_default();
                group.count += 1;
                group.net = group.net.saturating_add(entry.net());
            }
        }
        groups
    }
}
