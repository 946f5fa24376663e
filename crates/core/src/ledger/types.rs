//! Ledger domain types for owning entities and their movement history.
//!
//! Two kinds of owning entity share one engine: stock units (product
//! variants, floored at zero, with a second "damaged" bucket) and vendor
//! accounts (signed money balances).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tallyhall_shared::types::{DocumentId, EntityId, LedgerEntryId};

/// The kind of thing a balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A product variant whose balance is a stock count.
    StockUnit,
    /// A vendor whose balance is money owed (positive = payable).
    Account,
}

impl EntityKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockUnit => "stock_unit",
            Self::Account => "account",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stock_unit" => Some(Self::StockUnit),
            "account" => Some(Self::Account),
            _ => None,
        }
    }

    /// Returns the floor policy applied to this kind's balances.
    #[must_use]
    pub fn floor_policy(&self) -> FloorPolicy {
        match self {
            Self::StockUnit => FloorPolicy::FloorAtZero,
            Self::Account => FloorPolicy::Signed,
        }
    }

    /// Returns true if this kind carries a secondary (damaged) bucket.
    #[must_use]
    pub fn has_secondary_bucket(&self) -> bool {
        matches!(self, Self::StockUnit)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a balance reacts to a delta that would take it below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorPolicy {
    /// `new = max(0, current + delta)`.
    FloorAtZero,
    /// Balance may go negative.
    Signed,
}

/// Classification of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Starting balance recorded when the entity was registered.
    Opening,
    /// Goods received / vendor bill from a purchase.
    Purchase,
    /// Goods sent back to the vendor.
    PurchaseReturn,
    /// Stock written off as damaged.
    Damage,
    /// Stock count correction with a non-negative net.
    AdjustmentIn,
    /// Stock count correction with a negative net.
    AdjustmentOut,
    /// Money paid to a vendor.
    Payment,
    /// Direct balance adjustment not tied to a document.
    Manual,
    /// Compensating entry written when a document is voided.
    Reversal,
}

impl EntryKind {
    /// All entry kinds, in reporting order.
    pub const ALL: [Self; 9] = [
        Self::Opening,
        Self::Purchase,
        Self::PurchaseReturn,
        Self::Damage,
        Self::AdjustmentIn,
        Self::AdjustmentOut,
        Self::Payment,
        Self::Manual,
        Self::Reversal,
    ];

    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Purchase => "purchase",
            Self::PurchaseReturn => "purchase_return",
            Self::Damage => "damage",
            Self::AdjustmentIn => "adjustment_in",
            Self::AdjustmentOut => "adjustment_out",
            Self::Payment => "payment",
            Self::Manual => "manual",
            Self::Reversal => "reversal",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_lowercase())
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An owning entity together with its Balance Cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwningEntity {
    /// Entity ID.
    pub id: EntityId,
    /// Stock unit or vendor account.
    pub kind: EntityKind,
    /// SKU or vendor name.
    pub name: String,
    /// Cached primary balance (fresh stock or vendor payable).
    pub balance: Decimal,
    /// Cached secondary balance (damaged stock; always zero for accounts).
    pub secondary_balance: Decimal,
    /// Stock level at or above which no reorder is needed.
    pub reorder_level: Decimal,
    /// Unit cost used to value stock.
    pub unit_cost: Decimal,
    /// Sum of all recorded increases.
    pub lifetime_increase: Decimal,
    /// Sum of all recorded decreases.
    pub lifetime_decrease: Decimal,
    /// When the entity was registered.
    pub created_at: DateTime<Utc>,
    /// When the cache last changed.
    pub updated_at: DateTime<Utc>,
}

impl OwningEntity {
    /// Returns the value of the primary balance at the entity's unit cost.
    #[must_use]
    pub fn valuation(&self) -> Decimal {
        self.balance
            .checked_mul(self.unit_cost)
            .unwrap_or(Decimal::MAX)
    }

    /// Returns true if fresh stock is strictly under the reorder level.
    #[must_use]
    pub fn is_below_reorder_level(&self) -> bool {
        self.kind == EntityKind::StockUnit && self.balance < self.reorder_level
    }
}

/// Input for registering a new owning entity.
#[derive(Debug, Clone)]
pub struct NewEntity {
    /// Stock unit or vendor account.
    pub kind: EntityKind,
    /// SKU or vendor name.
    pub name: String,
    /// Starting primary balance, recorded as an opening entry.
    pub opening_balance: Decimal,
    /// Starting damaged stock, recorded on the same opening entry.
    pub opening_secondary: Decimal,
    /// Reorder level (stock only).
    pub reorder_level: Decimal,
    /// Unit cost (stock only).
    pub unit_cost: Decimal,
}

impl NewEntity {
    /// A stock unit with the given starting count and no cost data.
    #[must_use]
    pub fn stock_unit(name: impl Into<String>, opening_balance: Decimal) -> Self {
        Self {
            kind: EntityKind::StockUnit,
            name: name.into(),
            opening_balance,
            opening_secondary: Decimal::ZERO,
            reorder_level: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
        }
    }

    /// A vendor account with the given starting balance.
    #[must_use]
    pub fn account(name: impl Into<String>, opening_balance: Decimal) -> Self {
        Self {
            kind: EntityKind::Account,
            name: name.into(),
            opening_balance,
            opening_secondary: Decimal::ZERO,
            reorder_level: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
        }
    }

    /// Sets the reorder level.
    #[must_use]
    pub fn with_reorder_level(mut self, reorder_level: Decimal) -> Self {
        self.reorder_level = reorder_level;
        self
    }

    /// Sets the unit cost.
    #[must_use]
    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = unit_cost;
        self
    }
}

/// Where a ledger entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntrySource {
    /// The source document.
    pub document_id: DocumentId,
    /// The document line (0 = the document's counterparty posting).
    pub line_no: i32,
}

/// Uniqueness key for document-sourced entries.
///
/// At most one entry exists per key; backfill relies on this to stay
/// dedup-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    /// The source document.
    pub document_id: DocumentId,
    /// The document line.
    pub line_no: i32,
    /// The entry kind.
    pub kind: EntryKind,
}

/// Immutable audit record of one balance-changing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID.
    pub id: LedgerEntryId,
    /// The owning entity.
    pub entity_id: EntityId,
    /// Entry classification.
    pub kind: EntryKind,
    /// Primary bucket increase (non-negative).
    pub increase: Decimal,
    /// Primary bucket decrease (non-negative).
    pub decrease: Decimal,
    /// Secondary bucket increase (non-negative).
    pub secondary_increase: Decimal,
    /// Secondary bucket decrease (non-negative).
    pub secondary_decrease: Decimal,
    /// Source document reference, if any.
    pub source: Option<EntrySource>,
    /// Human-readable description.
    pub description: String,
    /// Event time used for ordering.
    pub occurred_at: DateTime<Utc>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Store-assigned insertion sequence, breaks ordering ties.
    pub sequence: i64,
    /// Primary balance before this entry.
    pub balance_before: Decimal,
    /// Primary balance after this entry.
    pub running_balance: Decimal,
    /// Secondary balance after this entry.
    pub secondary_running_balance: Decimal,
}

impl LedgerEntry {
    /// Net primary movement (`increase - decrease`).
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.increase - self.decrease
    }

    /// Net secondary movement.
    #[must_use]
    pub fn secondary_net(&self) -> Decimal {
        self.secondary_increase - self.secondary_decrease
    }

    /// Returns the uniqueness key if the entry is document-sourced.
    #[must_use]
    pub fn key(&self) -> Option<EntryKey> {
        self.source.map(|source| EntryKey {
            document_id: source.document_id,
            line_no: source.line_no,
            kind: self.kind,
        })
    }

    /// Ordering key: event time, then insertion time, then sequence.
    #[must_use]
    pub fn order_key(&self) -> (DateTime<Utc>, DateTime<Utc>, i64) {
        (self.occurred_at, self.created_at, self.sequence)
    }
}

/// Before/after pair returned by a single-bucket mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Balance before the mutation.
    pub before: Decimal,
    /// Balance after the mutation.
    pub after: Decimal,
}

impl BalanceChange {
    /// The applied (possibly clamped) delta.
    #[must_use]
    pub fn applied_delta(&self) -> Decimal {
        self.after - self.before
    }
}

/// Before/after pairs returned by a two-bucket mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoBucketChange {
    /// Fresh stock before.
    pub before_a: Decimal,
    /// Fresh stock after.
    pub after_a: Decimal,
    /// Damaged stock before.
    pub before_b: Decimal,
    /// Damaged stock after.
    pub after_b: Decimal,
}

/// Selects owning entities for reads and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntityFilter {
    /// Only entities of this kind.
    pub kind: Option<EntityKind>,
    /// Only these entities.
    pub ids: Option<Vec<EntityId>>,
}

impl EntityFilter {
    /// Matches every entity.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches entities of one kind.
    #[must_use]
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ids: None,
        }
    }

    /// Matches an explicit id list.
    #[must_use]
    pub fn ids(ids: Vec<EntityId>) -> Self {
        Self {
            kind: None,
            ids: Some(ids),
        }
    }

    /// Returns true if the entity passes the filter.
    #[must_use]
    pub fn matches(&self, entity: &OwningEntity) -> bool {
        self.kind.is_none_or(|kind| entity.kind == kind)
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&entity.id))
    }
}
