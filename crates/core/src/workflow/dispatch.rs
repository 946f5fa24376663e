//! Translation of document transitions into balance mutations.
//!
//! Per line (quantity `q`):
//! - purchase: `+q` fresh; counterparty `+Σ(q × unit_cost)`
//! - purchase return: `−q` fresh; counterparty `−Σ(q × unit_cost)`
//! - damage: `−q` fresh and `+q` damaged in one two-bucket mutation
//! - adjustment: `increase − decrease`, labelled in/out by the sign of the net
//! - payment: `−q` payable
//!
//! Voiding plans the same mutations negated, labelled `reversal`. The plan is
//! pure; the hook executes it and backfill replays it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tallyhall_shared::types::{DocumentId, EntityId};

use crate::ledger::{EntityKind, EntryKey, EntryKind};
use crate::workflow::types::{DocumentKind, LineItem, SourceDocument};

/// Line number used for the counterparty posting of a document.
pub const COUNTERPARTY_LINE_NO: i32 = 0;

/// Which transition a plan is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPhase {
    /// `pending → approved`.
    Approval,
    /// `approved → voided`.
    Reversal,
}

/// One mutation the hook must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMutation {
    /// Source document.
    pub document_id: DocumentId,
    /// Document line (0 for the counterparty).
    pub line_no: i32,
    /// Target entity.
    pub entity_id: EntityId,
    /// Kind the target entity must have.
    pub expected_kind: EntityKind,
    /// Entry kind to record.
    pub entry_kind: EntryKind,
    /// Signed primary delta.
    pub delta: Decimal,
    /// Signed secondary (damaged) delta.
    pub secondary_delta: Decimal,
    /// Event time.
    pub occurred_at: DateTime<Utc>,
    /// Entry description.
    pub description: String,
}

impl PlannedMutation {
    /// Uniqueness key of the entry this mutation writes.
    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey {
            document_id: self.document_id,
            line_no: self.line_no,
            kind: self.entry_kind,
        }
    }

    /// Returns true if the mutation moves both stock buckets.
    #[must_use]
    pub fn is_two_bucket(&self) -> bool {
        !self.secondary_delta.is_zero()
    }
}

/// Stateless planner for document transitions.
pub struct DispatchService;

impl DispatchService {
    /// Plans every mutation for `phase` of `document`, in lock order:
    /// line items by line number, then the counterparty.
    #[must_use]
    pub fn plan(document: &SourceDocument, phase: DispatchPhase) -> Vec<PlannedMutation> {
        let occurred_at = match phase {
            DispatchPhase::Approval => document.approval_time(),
            DispatchPhase::Reversal => document.void_time(),
        };

        let mut lines: Vec<&LineItem> = document.lines.iter().collect();
        lines.sort_by_key(|line| line.line_no);

        let mut plan: Vec<PlannedMutation> = lines
            .into_iter()
            .map(|line| {
                let (entry_kind, delta, secondary_delta) = Self::line_effect(document.kind, line);
                Self::planned(
                    document,
                    phase,
                    line.line_no,
                    line.entity_id,
                    document.kind.line_entity_kind(),
                    entry_kind,
                    delta,
                    secondary_delta,
                    occurred_at,
                )
            })
            .collect();

        if let Some(counterparty_id) = document.counterparty_id {
            let total = document
                .lines
                .iter()
                .fold(Decimal::ZERO, |acc, line| acc.saturating_add(line.extended_cost()));
            let (entry_kind, delta) = match document.kind {
                DocumentKind::PurchaseReturn => (EntryKind::PurchaseReturn, -total),
                _ => (EntryKind::Purchase, total),
            };
            plan.push(Self::planned(
                document,
                phase,
                COUNTERPARTY_LINE_NO,
                counterparty_id,
                EntityKind::Account,
                entry_kind,
                delta,
                Decimal::ZERO,
                occurred_at,
            ));
        }

        plan
    }

    /// Approval effect of one line: `(entry kind, delta, secondary delta)`.
    #[must_use]
    pub fn line_effect(kind: DocumentKind, line: &LineItem) -> (EntryKind, Decimal, Decimal) {
        match kind {
            DocumentKind::Purchase => (EntryKind::Purchase, line.quantity, Decimal::ZERO),
            DocumentKind::PurchaseReturn => {
                (EntryKind::PurchaseReturn, -line.quantity, Decimal::ZERO)
            }
            DocumentKind::Damage => (EntryKind::Damage, -line.quantity, line.quantity),
            DocumentKind::Adjustment => {
                let net = line.quantity - line.decrease_quantity;
                let entry_kind = if net.is_sign_negative() && !net.is_zero() {
                    EntryKind::AdjustmentOut
                } else {
                    EntryKind::AdjustmentIn
                };
                (entry_kind, net, Decimal::ZERO)
            }
            DocumentKind::Payment => (EntryKind::Payment, -line.quantity, Decimal::ZERO),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn planned(
        document: &SourceDocument,
        phase: DispatchPhase,
        line_no: i32,
        entity_id: EntityId,
        expected_kind: EntityKind,
        entry_kind: EntryKind,
        delta: Decimal,
        secondary_delta: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> PlannedMutation {
        let target = if line_no == COUNTERPARTY_LINE_NO {
            "vendor".to_string()
        } else {
            format!("line {line_no}")
        };
        match phase {
            DispatchPhase::Approval => PlannedMutation {
                document_id: document.id,
                line_no,
                entity_id,
                expected_kind,
                entry_kind,
                delta,
                secondary_delta,
                occurred_at,
                description: format!("{} {} {target}", document.kind, document.reference),
            },
            DispatchPhase::Reversal => PlannedMutation {
                document_id: document.id,
                line_no,
                entity_id,
                expected_kind,
                entry_kind: EntryKind::Reversal,
                delta: -delta,
                secondary_delta: -secondary_delta,
                occurred_at,
                description: format!(
                    "void {} {} {target}: {}",
                    document.kind,
                    document.reference,
                    document.void_reason.as_deref().unwrap_or_default()
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{DocumentStatus, NewDocument};
    use rust_decimal_macros::dec;

    fn document(kind: DocumentKind, lines: Vec<LineItem>, counterparty: Option<EntityId>) -> SourceDocument {
        let mut doc = SourceDocument::pending(
            NewDocument {
                kind,
                counterparty_id: counterparty,
                reference: "DOC-7".to_string(),
                lines,
                created_by: None,
            },
            Utc::now(),
        );
        doc.status = DocumentStatus::Approved;
        doc.approved_at = Some(Utc::now());
        doc
    }

    #[test]
    fn test_purchase_plans_lines_then_vendor() {
        let (a, b, vendor) = (EntityId::new(), EntityId::new(), EntityId::new());
        let doc = document(
            DocumentKind::Purchase,
            vec![
                LineItem::new(2, b, dec!(5)).with_unit_cost(dec!(10)),
                LineItem::new(1, a, dec!(20)).with_unit_cost(dec!(20)),
            ],
            Some(vendor),
        );

        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);

        assert_eq!(plan.len(), 3);
        assert_eq!((plan[0].entity_id, plan[0].delta), (a, dec!(20)));
        assert_eq!((plan[1].entity_id, plan[1].delta), (b, dec!(5)));
        assert_eq!(plan[2].entity_id, vendor);
        assert_eq!(plan[2].line_no, COUNTERPARTY_LINE_NO);
        assert_eq!(plan[2].expected_kind, EntityKind::Account);
        assert_eq!(plan[2].delta, dec!(450));
        assert!(plan.iter().all(|m| m.entry_kind == EntryKind::Purchase));
        assert_eq!(plan[0].occurred_at, doc.approval_time());
    }

    #[test]
    fn test_purchase_return_credits_vendor() {
        let vendor = EntityId::new();
        let doc = document(
            DocumentKind::PurchaseReturn,
            vec![LineItem::new(1, EntityId::new(), dec!(2)).with_unit_cost(dec!(30))],
            Some(vendor),
        );
        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);
        assert_eq!(plan[0].delta, dec!(-2));
        assert_eq!(plan[1].delta, dec!(-60));
        assert_eq!(plan[1].entry_kind, EntryKind::PurchaseReturn);
    }

    #[test]
    fn test_damage_is_two_bucket() {
        let doc = document(
            DocumentKind::Damage,
            vec![LineItem::new(1, EntityId::new(), dec!(3))],
            None,
        );
        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].is_two_bucket());
        assert_eq!((plan[0].delta, plan[0].secondary_delta), (dec!(-3), dec!(3)));
    }

    #[test]
    fn test_adjustment_labels_by_net_sign() {
        let e = EntityId::new();
        let doc = document(
            DocumentKind::Adjustment,
            vec![
                LineItem::adjustment(1, e, dec!(5), dec!(2)),
                LineItem::adjustment(2, e, dec!(1), dec!(4)),
                LineItem::adjustment(3, e, dec!(2), dec!(2)),
            ],
            None,
        );
        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);
        assert_eq!((plan[0].entry_kind, plan[0].delta), (EntryKind::AdjustmentIn, dec!(3)));
        assert_eq!((plan[1].entry_kind, plan[1].delta), (EntryKind::AdjustmentOut, dec!(-3)));
        assert_eq!((plan[2].entry_kind, plan[2].delta), (EntryKind::AdjustmentIn, dec!(0)));
    }

    #[test]
    fn test_payment_reduces_payable() {
        let vendor = EntityId::new();
        let doc = document(
            DocumentKind::Payment,
            vec![LineItem::new(1, vendor, dec!(200))],
            None,
        );
        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);
        assert_eq!(plan[0].expected_kind, EntityKind::Account);
        assert_eq!(plan[0].delta, dec!(-200));
    }

    #[test]
    fn test_reversal_negates_every_delta() {
        let vendor = EntityId::new();
        let mut doc = document(
            DocumentKind::Purchase,
            vec![LineItem::new(1, EntityId::new(), dec!(20)).with_unit_cost(dec!(25))],
            Some(vendor),
        );
        doc.voided_at = Some(Utc::now());
        doc.void_reason = Some("duplicate".to_string());

        let approval = DispatchService::plan(&doc, DispatchPhase::Approval);
        let reversal = DispatchService::plan(&doc, DispatchPhase::Reversal);

        assert_eq!(approval.len(), reversal.len());
        for (a, r) in approval.iter().zip(&reversal) {
            assert_eq!(r.entry_kind, EntryKind::Reversal);
            assert_eq!(r.delta, -a.delta);
            assert_eq!(r.secondary_delta, -a.secondary_delta);
            assert_eq!((r.entity_id, r.line_no), (a.entity_id, a.line_no));
            assert_ne!(r.key(), a.key());
        }
        assert!(reversal[0].description.ends_with("duplicate"));
    }
}
