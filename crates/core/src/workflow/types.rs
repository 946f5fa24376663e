//! Workflow domain types for source document lifecycle management.
//!
//! This module defines source documents, their line items, and the
//! status transitions that drive ledger writes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tallyhall_shared::types::{DocumentId, EntityId, UserId};

use crate::ledger::EntityKind;

/// Source document status in the approval workflow.
///
/// The valid transitions are:
/// - Pending → Approved (approve, writes ledger entries)
/// - Pending → Rejected (reject, no ledger writes)
/// - Approved → Voided (void, writes compensating entries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Document has been recorded and awaits a decision.
    Pending,
    /// Document has been approved and its effects are on the ledger.
    Approved,
    /// Approved document whose effects have been reversed (terminal).
    Voided,
    /// Document was rejected before approval (terminal).
    Rejected,
}

impl DocumentStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Voided => "voided",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "voided" => Some(Self::Voided),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Voided | Self::Rejected)
    }

    /// Returns true if ledger entries derived from this document exist (or should).
    #[must_use]
    pub fn has_ledger_effect(&self) -> bool {
        matches!(self, Self::Approved | Self::Voided)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Goods received from a vendor.
    Purchase,
    /// Goods returned to a vendor.
    PurchaseReturn,
    /// Stock written off as damaged.
    Damage,
    /// Stock count correction.
    Adjustment,
    /// Money paid to vendors.
    Payment,
}

impl DocumentKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::PurchaseReturn => "purchase_return",
            Self::Damage => "damage",
            Self::Adjustment => "adjustment",
            Self::Payment => "payment",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purchase" => Some(Self::Purchase),
            "purchase_return" => Some(Self::PurchaseReturn),
            "damage" => Some(Self::Damage),
            "adjustment" => Some(Self::Adjustment),
            "payment" => Some(Self::Payment),
            _ => None,
        }
    }

    /// The entity kind every line item must reference.
    #[must_use]
    pub fn line_entity_kind(&self) -> EntityKind {
        match self {
            Self::Payment => EntityKind::Account,
            Self::Purchase | Self::PurchaseReturn | Self::Damage | Self::Adjustment => {
                EntityKind::StockUnit
            }
        }
    }

    /// Returns true if the document may name a vendor counterparty.
    #[must_use]
    pub fn allows_counterparty(&self) -> bool {
        matches!(self, Self::Purchase | Self::PurchaseReturn)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line number, unique and positive within the document.
    pub line_no: i32,
    /// The owning entity this line moves.
    pub entity_id: EntityId,
    /// Primary magnitude: units for stock lines, money for payment lines.
    /// For adjustments this is the increase.
    pub quantity: Decimal,
    /// Adjustment decrease (zero for every other kind).
    pub decrease_quantity: Decimal,
    /// Unit cost, required on purchase lines that bill a counterparty.
    pub unit_cost: Option<Decimal>,
}

impl LineItem {
    /// A line with a single magnitude.
    #[must_use]
    pub fn new(line_no: i32, entity_id: EntityId, quantity: Decimal) -> Self {
        Self {
            line_no,
            entity_id,
            quantity,
            decrease_quantity: Decimal::ZERO,
            unit_cost: None,
        }
    }

    /// An adjustment line carrying both increase and decrease.
    #[must_use]
    pub fn adjustment(line_no: i32, entity_id: EntityId, increase: Decimal, decrease: Decimal) -> Self {
        Self {
            line_no,
            entity_id,
            quantity: increase,
            decrease_quantity: decrease,
            unit_cost: None,
        }
    }

    /// Sets the unit cost.
    #[must_use]
    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    /// `quantity × unit_cost`, saturating; zero without a cost.
    #[must_use]
    pub fn extended_cost(&self) -> Decimal {
        self.unit_cost
            .map_or(Decimal::ZERO, |cost| self.quantity.saturating_mul(cost))
    }
}

/// Input for recording a new source document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Document kind.
    pub kind: DocumentKind,
    /// Vendor account billed or credited by a purchase/purchase return.
    pub counterparty_id: Option<EntityId>,
    /// External reference (PO number, note).
    pub reference: String,
    /// Line items.
    pub lines: Vec<LineItem>,
    /// Who recorded the document.
    pub created_by: Option<UserId>,
}

/// A source document and its audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Document ID.
    pub id: DocumentId,
    /// Document kind.
    pub kind: DocumentKind,
    /// Current status.
    pub status: DocumentStatus,
    /// Vendor counterparty, if any.
    pub counterparty_id: Option<EntityId>,
    /// External reference.
    pub reference: String,
    /// Line items, ordered by line number.
    pub lines: Vec<LineItem>,
    /// Who recorded the document.
    pub created_by: Option<UserId>,
    /// Who approved it.
    pub approved_by: Option<UserId>,
    /// When it was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// When it was voided.
    pub voided_at: Option<DateTime<Utc>>,
    /// Why it was voided.
    pub void_reason: Option<String>,
    /// When it was rejected.
    pub rejected_at: Option<DateTime<Utc>>,
    /// Why it was rejected.
    pub rejection_reason: Option<String>,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
    /// When it last changed.
    pub updated_at: DateTime<Utc>,
}

impl SourceDocument {
    /// Builds a pending document from validated input.
    #[must_use]
    pub fn pending(input: NewDocument, now: DateTime<Utc>) -> Self {
        let mut lines = input.lines;
        lines.sort_by_key(|line| line.line_no);
        Self {
            id: DocumentId::new(),
            kind: input.kind,
            status: DocumentStatus::Pending,
            counterparty_id: input.counterparty_id,
            reference: input.reference,
            lines,
            created_by: input.created_by,
            approved_by: None,
            approved_at: None,
            voided_at: None,
            void_reason: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a validated transition's status and audit fields.
    pub fn apply(&mut self, action: &WorkflowAction) {
        self.status = action.new_status();
        match action {
            WorkflowAction::Approve {
                approved_by,
                approved_at,
                ..
            } => {
                self.approved_by = Some(*approved_by);
                self.approved_at = Some(*approved_at);
                self.updated_at = *approved_at;
            }
            WorkflowAction::Void {
                voided_at,
                void_reason,
                ..
            } => {
                self.voided_at = Some(*voided_at);
                self.void_reason = Some(void_reason.clone());
                self.updated_at = *voided_at;
            }
            WorkflowAction::Reject {
                rejected_at,
                rejection_reason,
                ..
            } => {
                self.rejected_at = Some(*rejected_at);
                self.rejection_reason.clone_from(rejection_reason);
                self.updated_at = *rejected_at;
            }
        }
    }

    /// Event time for approval entries.
    #[must_use]
    pub fn approval_time(&self) -> DateTime<Utc> {
        self.approved_at.unwrap_or(self.created_at)
    }

    /// Event time for reversal entries.
    #[must_use]
    pub fn void_time(&self) -> DateTime<Utc> {
        self.voided_at.unwrap_or(self.updated_at)
    }
}

/// Workflow action representing a state transition with audit data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowAction {
    /// Approve a pending document.
    Approve {
        /// The new status after approval.
        new_status: DocumentStatus,
        /// The user who approved the document.
        approved_by: UserId,
        /// When the document was approved.
        approved_at: DateTime<Utc>,
    },
    /// Void an approved document.
    Void {
        /// The new status after voiding.
        new_status: DocumentStatus,
        /// When the document was voided.
        voided_at: DateTime<Utc>,
        /// The reason for voiding.
        void_reason: String,
    },
    /// Reject a pending document.
    Reject {
        /// The new status after rejection.
        new_status: DocumentStatus,
        /// When the document was rejected.
        rejected_at: DateTime<Utc>,
        /// Optional reason.
        rejection_reason: Option<String>,
    },
}

impl WorkflowAction {
    /// Returns the new status resulting from this action.
    #[must_use]
    pub fn new_status(&self) -> DocumentStatus {
        match self {
            Self::Approve { new_status, .. }
            | Self::Void { new_status, .. }
            | Self::Reject { new_status, .. } => *new_status,
        }
    }

    /// Returns the status the document must currently hold.
    #[must_use]
    pub fn expected_status(&self) -> DocumentStatus {
        match self {
            Self::Approve { .. } | Self::Reject { .. } => DocumentStatus::Pending,
            Self::Void { .. } => DocumentStatus::Approved,
        }
    }
}
