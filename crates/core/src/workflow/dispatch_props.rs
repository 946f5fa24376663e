//! Property-based tests for dispatch planning.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tallyhall_shared::types::EntityId;

use crate::ledger::{EntryKind, FloorPolicy, apply_delta};
use crate::workflow::dispatch::{DispatchPhase, DispatchService};
use crate::workflow::types::{DocumentKind, LineItem, NewDocument, SourceDocument};

fn arb_kind() -> impl Strategy<Value = DocumentKind> {
    prop_oneof![
        Just(DocumentKind::Purchase),
        Just(DocumentKind::PurchaseReturn),
        Just(DocumentKind::Damage),
        Just(DocumentKind::Adjustment),
        Just(DocumentKind::Payment),
    ]
}

fn arb_magnitude() -> impl Strategy<Value = Decimal> {
    (0i64..10_000i64).prop_map(|n| Decimal::new(n, 1))
}

fn arb_lines() -> impl Strategy<Value = Vec<(Decimal, Decimal, Decimal)>> {
    prop::collection::vec((arb_magnitude(), arb_magnitude(), arb_magnitude()), 1..8)
}

fn build(kind: DocumentKind, raw: &[(Decimal, Decimal, Decimal)], with_vendor: bool) -> SourceDocument {
    let lines = raw
        .iter()
        .zip(1..)
        .map(|((q, d, cost), line_no)| {
            let mut line = LineItem::new(line_no, EntityId::new(), *q).with_unit_cost(*cost);
            if kind == DocumentKind::Adjustment {
                line.decrease_quantity = *d;
            }
            line
        })
        .collect();
    let mut doc = SourceDocument::pending(
        NewDocument {
            kind,
            counterparty_id: (with_vendor && kind.allows_counterparty()).then(EntityId::new),
            reference: "prop".to_string(),
            lines,
            created_by: None,
        },
        Utc::now(),
    );
    doc.approved_at = Some(Utc::now());
    doc.voided_at = Some(Utc::now());
    doc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Reversal is the exact negation of approval**
    ///
    /// Same targets, same keys except the kind, negated deltas.
    #[test]
    fn prop_reversal_negates_approval(
        kind in arb_kind(),
        raw in arb_lines(),
        with_vendor in any::<bool>(),
    ) {
        let doc = build(kind, &raw, with_vendor);
        let approval = DispatchService::plan(&doc, DispatchPhase::Approval);
        let reversal = DispatchService::plan(&doc, DispatchPhase::Reversal);

        prop_assert_eq!(approval.len(), reversal.len());
        for (a, r) in approval.iter().zip(&reversal) {
            prop_assert_eq!(r.entity_id, a.entity_id);
            prop_assert_eq!(r.line_no, a.line_no);
            prop_assert_eq!(r.delta, -a.delta);
            prop_assert_eq!(r.secondary_delta, -a.secondary_delta);
            prop_assert_eq!(r.entry_kind, EntryKind::Reversal);
        }
    }

    /// **Keys within one plan are unique**
    #[test]
    fn prop_plan_keys_unique(kind in arb_kind(), raw in arb_lines(), with_vendor in any::<bool>()) {
        let doc = build(kind, &raw, with_vendor);
        let plan = DispatchService::plan(&doc, DispatchPhase::Approval);
        let mut keys: Vec<_> = plan.iter().map(|m| m.key()).collect();
        let before = keys.len();
        keys.sort_by_key(|k| (k.line_no, k.kind));
        keys.dedup();
        prop_assert_eq!(keys.len(), before);
    }

    /// **Approve then void restores signed balances**
    ///
    /// For unclamped (signed) targets, applying the approval plan then the
    /// reversal plan returns every entity to its starting balance.
    #[test]
    fn prop_approve_then_void_is_identity_when_unclamped(
        kind in arb_kind(),
        raw in arb_lines(),
        start in (-1_000i64..1_000i64).prop_map(Decimal::from),
    ) {
        let doc = build(kind, &raw, true);
        let approval = DispatchService::plan(&doc, DispatchPhase::Approval);
        let reversal = DispatchService::plan(&doc, DispatchPhase::Reversal);

        for (a, r) in approval.iter().zip(&reversal) {
            let after_approve = apply_delta(start, a.delta, FloorPolicy::Signed).after;
            let after_void = apply_delta(after_approve, r.delta, FloorPolicy::Signed).after;
            prop_assert_eq!(after_void, start);
        }
    }
}
