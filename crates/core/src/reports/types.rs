//! Report data types.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tallyhall_shared::types::EntityId;

use crate::ledger::{EntityKind, EntryKind, LedgerError};

/// Text that replaces a financial figure the viewer may not see.
pub const REDACTED_SENTINEL: &str = "***";

/// Half-open reporting window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReportRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl ReportRange {
    /// Creates a range; `start` must be before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, LedgerError> {
        if start >= end {
            return Err(LedgerError::InvalidDocument(format!(
                "report range start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the window.
    #[must_use]
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// The equally long window immediately before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - self.span(),
            end: self.start,
        }
    }

    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Time-series bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per hour.
    Hourly,
    /// One bucket per UTC day.
    Daily,
    /// One bucket per ISO week, starting Monday 00:00 UTC.
    Weekly,
}

impl Granularity {
    /// Hourly up to 48 hours, daily up to 14 days, weekly beyond.
    #[must_use]
    pub fn for_span(span: Duration) -> Self {
        if span <= Duration::hours(48) {
            Self::Hourly
        } else if span <= Duration::days(14) {
            Self::Daily
        } else {
            Self::Weekly
        }
    }

    /// Bucket width.
    #[must_use]
    pub fn step(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    /// Start of the bucket containing `at`.
    #[must_use]
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let start = match self {
            Self::Hourly => date.and_hms_opt(at.hour(), 0, 0),
            Self::Daily => date.and_hms_opt(0, 0, 0),
            Self::Weekly => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_hms_opt(0, 0, 0)
            }
        };
        start.map_or(at, |naive| naive.and_utc())
    }
}

/// A financial value that may be hidden from the viewer.
///
/// Serializes as the decimal string when visible and as
/// [`REDACTED_SENTINEL`] when redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    /// The viewer may see the value.
    Visible(Decimal),
    /// The value is hidden.
    Redacted,
}

impl Figure {
    /// Returns the value if visible.
    #[must_use]
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Visible(value) => Some(*value),
            Self::Redacted => None,
        }
    }

    /// Returns true if the value is hidden.
    #[must_use]
    pub fn is_redacted(&self) -> bool {
        matches!(self, Self::Redacted)
    }
}

impl Serialize for Figure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Visible(value) => Serialize::serialize(value, serializer),
            Self::Redacted => serializer.serialize_str(REDACTED_SENTINEL),
        }
    }
}

/// Balance totals across all entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardTotals {
    /// Σ fresh stock over stock units.
    pub stock_units: Decimal,
    /// Σ damaged stock over stock units.
    pub damaged_units: Decimal,
    /// Σ(stock × unit cost).
    pub inventory_value: Figure,
    /// Σ vendor balances.
    pub vendor_payable: Figure,
}

/// Period-over-period movement for one (entity kind, entry kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementTotal {
    /// Entity kind.
    pub entity_kind: EntityKind,
    /// Entry kind.
    pub entry_kind: EntryKind,
    /// Entries in the current window.
    pub current_count: usize,
    /// Net movement in the current window.
    pub current: Figure,
    /// Net movement in the previous window.
    pub previous: Figure,
    /// `(current − previous) / |previous| × 100`; absent when previous is zero.
    pub change_percent: Option<Figure>,
}

/// A stock unit strictly under its reorder level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockItem {
    /// Entity ID.
    pub entity_id: EntityId,
    /// SKU.
    pub name: String,
    /// Fresh stock.
    pub balance: Decimal,
    /// Reorder level.
    pub reorder_level: Decimal,
    /// `reorder_level − balance`.
    pub shortfall: Decimal,
}

/// One time-series bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeriesPoint {
    /// Bucket start.
    pub bucket_start: DateTime<Utc>,
    /// Σ stock increases.
    pub stock_in: Decimal,
    /// Σ stock decreases.
    pub stock_out: Decimal,
    /// Σ vendor balance increases.
    pub payable_in: Figure,
    /// Σ vendor balance decreases.
    pub payable_out: Figure,
}

/// Dashboard response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// Current window.
    pub range: ReportRange,
    /// Comparison window.
    pub previous_range: ReportRange,
    /// Series bucket size.
    pub granularity: Granularity,
    /// Balance totals.
    pub totals: DashboardTotals,
    /// Movement totals by entity kind and entry kind.
    pub movements: Vec<MovementTotal>,
    /// Stock units under their reorder level, largest shortfall first.
    pub low_stock: Vec<LowStockItem>,
    /// Movement time series.
    pub series: Vec<TimeSeriesPoint>,
    /// True if any financial figure was hidden.
    pub redacted: bool,
    /// When the summary was computed.
    pub generated_at: DateTime<Utc>,
}

impl DashboardSummary {
    /// Renders the summary as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One row of the movement report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementReportRow {
    /// Entity ID.
    pub entity_id: EntityId,
    /// SKU or vendor name.
    pub name: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Balance implied by entries before the window.
    pub opening: Decimal,
    /// Σ increase inside the window.
    pub inflow: Decimal,
    /// Σ decrease inside the window.
    pub outflow: Decimal,
    /// `opening + inflow − outflow`.
    pub closing: Decimal,
}

/// Per-entity movement report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementReport {
    /// Reporting window.
    pub range: ReportRange,
    /// One row per matching entity, ordered by name.
    pub rows: Vec<MovementReportRow>,
}
