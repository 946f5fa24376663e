//! Workflow service for source document state transitions.
//!
//! This module implements the state machine that gates every ledger write
//! caused by a document, plus validation of new documents.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tallyhall_shared::types::{DocumentId, UserId};

use crate::ledger::LedgerError;
use crate::workflow::types::{DocumentKind, DocumentStatus, NewDocument, WorkflowAction};

/// Stateless service for managing document workflow transitions.
///
/// All methods are associated functions that validate a transition and
/// return the `WorkflowAction` carrying its audit trail.
pub struct WorkflowService;

impl WorkflowService {
    /// Approve a pending document.
    ///
    /// # Returns
    /// * `Ok(WorkflowAction::Approve)` if the transition is valid
    /// * `Err(LedgerError::DocumentNotPending)` otherwise
    pub fn approve(
        document_id: DocumentId,
        current_status: DocumentStatus,
        approved_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<WorkflowAction, LedgerError> {
        match current_status {
            DocumentStatus::Pending => Ok(WorkflowAction::Approve {
                new_status: DocumentStatus::Approved,
                approved_by,
                approved_at: now,
            }),
            status => Err(LedgerError::DocumentNotPending {
                document_id,
                status,
            }),
        }
    }

    /// Void an approved document.
    ///
    /// # Returns
    /// * `Ok(WorkflowAction::Void)` if the transition is valid
    /// * `Err(LedgerError::VoidReasonRequired)` if the reason is blank
    /// * `Err(LedgerError::DocumentNotApproved)` if not in Approved status
    pub fn void(
        document_id: DocumentId,
        current_status: DocumentStatus,
        void_reason: String,
        now: DateTime<Utc>,
    ) -> Result<WorkflowAction, LedgerError> {
        if void_reason.trim().is_empty() {
            return Err(LedgerError::VoidReasonRequired);
        }

        match current_status {
            DocumentStatus::Approved => Ok(WorkflowAction::Void {
                new_status: DocumentStatus::Voided,
                voided_at: now,
                void_reason,
            }),
            status => Err(LedgerError::DocumentNotApproved {
                document_id,
                status,
            }),
        }
    }

    /// Reject a pending document.
    pub fn reject(
        document_id: DocumentId,
        current_status: DocumentStatus,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<WorkflowAction, LedgerError> {
        match current_status {
            DocumentStatus::Pending => Ok(WorkflowAction::Reject {
                new_status: DocumentStatus::Rejected,
                rejected_at: now,
                rejection_reason: rejection_reason.filter(|r| !r.trim().is_empty()),
            }),
            status => Err(LedgerError::DocumentNotPending {
                document_id,
                status,
            }),
        }
    }

    /// Check if a status transition is valid.
    ///
    /// Valid transitions:
    /// - Pending → Approved (approve)
    /// - Pending → Rejected (reject)
    /// - Approved → Voided (void)
    #[must_use]
    pub fn is_valid_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
        matches!(
            (from, to),
            (
                DocumentStatus::Pending,
                DocumentStatus::Approved | DocumentStatus::Rejected
            ) | (DocumentStatus::Approved, DocumentStatus::Voided)
        )
    }

    /// Checks that `action` moves a document out of `from` along a valid edge.
    ///
    /// Stores call this before applying a guarded status update, so an
    /// action assembled by hand cannot skip a state.
    pub fn ensure_transition(
        from: DocumentStatus,
        action: &WorkflowAction,
    ) -> Result<(), LedgerError> {
        let to = action.new_status();
        if from != action.expected_status() || !Self::is_valid_transition(from, to) {
            return Err(LedgerError::InvalidDocument(format!(
                "cannot move a document from {from} to {to}"
            )));
        }
        Ok(())
    }

    /// Validates the shape of a new document.
    ///
    /// Entity existence and kind checks need the store and happen in the
    /// hook; this covers everything decidable from the input alone.
    pub fn validate_new_document(input: &NewDocument) -> Result<(), LedgerError> {
        if input.lines.is_empty() {
            return Err(LedgerError::InvalidDocument(
                "document must have at least one line".to_string(),
            ));
        }

        if input.counterparty_id.is_some() && !input.kind.allows_counterparty() {
            return Err(LedgerError::InvalidDocument(format!(
                "{} documents cannot name a counterparty",
                input.kind
            )));
        }

        let mut seen = HashSet::with_capacity(input.lines.len());
        for line in &input.lines {
            if line.line_no <= 0 {
                return Err(LedgerError::InvalidDocument(format!(
                    "line number must be positive, got {}",
                    line.line_no
                )));
            }
            if !seen.insert(line.line_no) {
                return Err(LedgerError::InvalidDocument(format!(
                    "duplicate line number {}",
                    line.line_no
                )));
            }
            if line.quantity < Decimal::ZERO || line.decrease_quantity < Decimal::ZERO {
                return Err(LedgerError::InvalidDocument(format!(
                    "line {} has a negative magnitude",
                    line.line_no
                )));
            }
            if input.kind != DocumentKind::Adjustment && !line.decrease_quantity.is_zero() {
                return Err(LedgerError::InvalidDocument(format!(
                    "line {} carries a decrease on a {} document",
                    line.line_no, input.kind
                )));
            }
            if let Some(cost) = line.unit_cost {
                if cost < Decimal::ZERO {
                    return Err(LedgerError::InvalidDocument(format!(
                        "line {} has a negative unit cost",
                        line.line_no
                    )));
                }
            } else if input.counterparty_id.is_some() {
                return Err(LedgerError::InvalidDocument(format!(
                    "line {} needs a unit cost to bill the counterparty",
                    line.line_no
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::LineItem;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use tallyhall_shared::types::EntityId;

    fn purchase(lines: Vec<LineItem>, counterparty: bool) -> NewDocument {
        NewDocument {
            kind: DocumentKind::Purchase,
            counterparty_id: counterparty.then(EntityId::new),
            reference: "PO-1".to_string(),
            lines,
            created_by: None,
        }
    }

    #[test]
    fn test_approve_from_pending() {
        let user = UserId::new();
        let action =
            WorkflowService::approve(DocumentId::new(), DocumentStatus::Pending, user, Utc::now())
                .unwrap();
        assert_eq!(action.new_status(), DocumentStatus::Approved);
        assert!(matches!(action, WorkflowAction::Approve { approved_by, .. } if approved_by == user));
    }

    #[rstest]
    #[case(DocumentStatus::Approved)]
    #[case(DocumentStatus::Voided)]
    #[case(DocumentStatus::Rejected)]
    fn test_approve_from_non_pending_fails(#[case] status: DocumentStatus) {
        let result =
            WorkflowService::approve(DocumentId::new(), status, UserId::new(), Utc::now());
        assert!(matches!(
            result,
            Err(LedgerError::DocumentNotPending { status: s, .. }) if s == status
        ));
    }

    #[rstest]
    #[case(DocumentStatus::Pending)]
    #[case(DocumentStatus::Voided)]
    #[case(DocumentStatus::Rejected)]
    fn test_void_from_non_approved_fails(#[case] status: DocumentStatus) {
        let result =
            WorkflowService::void(DocumentId::new(), status, "dup".to_string(), Utc::now());
        assert!(matches!(result, Err(LedgerError::DocumentNotApproved { .. })));
    }

    #[test]
    fn test_void_requires_reason() {
        let result = WorkflowService::void(
            DocumentId::new(),
            DocumentStatus::Approved,
            "   ".to_string(),
            Utc::now(),
        );
        assert!(matches!(result, Err(LedgerError::VoidReasonRequired)));
    }

    #[test]
    fn test_reject_blank_reason_is_dropped() {
        let action = WorkflowService::reject(
            DocumentId::new(),
            DocumentStatus::Pending,
            Some(" ".to_string()),
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(
            action,
            WorkflowAction::Reject { rejection_reason: None, .. }
        ));
    }

    #[rstest]
    #[case(DocumentStatus::Pending, DocumentStatus::Approved, true)]
    #[case(DocumentStatus::Pending, DocumentStatus::Rejected, true)]
    #[case(DocumentStatus::Approved, DocumentStatus::Voided, true)]
    #[case(DocumentStatus::Pending, DocumentStatus::Voided, false)]
    #[case(DocumentStatus::Voided, DocumentStatus::Approved, false)]
    #[case(DocumentStatus::Rejected, DocumentStatus::Pending, false)]
    fn test_transition_table(
        #[case] from: DocumentStatus,
        #[case] to: DocumentStatus,
        #[case] expected: bool,
    ) {
        assert_eq!(WorkflowService::is_valid_transition(from, to), expected);
    }

    #[test]
    fn test_ensure_transition_rejects_hand_built_skip() {
        let approve =
            WorkflowService::approve(DocumentId::new(), DocumentStatus::Pending, UserId::new(), Utc::now())
                .unwrap();
        assert!(WorkflowService::ensure_transition(DocumentStatus::Pending, &approve).is_ok());
        assert!(WorkflowService::ensure_transition(DocumentStatus::Approved, &approve).is_err());

        let skip = WorkflowAction::Approve {
            new_status: DocumentStatus::Voided,
            approved_by: UserId::new(),
            approved_at: Utc::now(),
        };
        assert!(matches!(
            WorkflowService::ensure_transition(DocumentStatus::Pending, &skip),
            Err(LedgerError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_validate_accepts_purchase_with_costs() {
        let input = purchase(
            vec![
                LineItem::new(1, EntityId::new(), dec!(20)).with_unit_cost(dec!(25)),
                LineItem::new(2, EntityId::new(), dec!(0)).with_unit_cost(dec!(1)),
            ],
            true,
        );
        assert!(WorkflowService::validate_new_document(&input).is_ok());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::zero_line_no(vec![LineItem::new(0, EntityId::new(), dec!(1))])]
    #[case::negative(vec![LineItem::new(1, EntityId::new(), dec!(-1))])]
    #[case::duplicate(vec![
        LineItem::new(1, EntityId::new(), dec!(1)),
        LineItem::new(1, EntityId::new(), dec!(2)),
    ])]
    #[case::decrease_outside_adjustment(vec![
        LineItem::adjustment(1, EntityId::new(), dec!(1), dec!(1)),
    ])]
    fn test_validate_rejects_bad_lines(#[case] lines: Vec<LineItem>) {
        let result = WorkflowService::validate_new_document(&purchase(lines, false));
        assert!(matches!(result, Err(LedgerError::InvalidDocument(_))));
    }

    #[test]
    fn test_validate_counterparty_needs_unit_cost() {
        let input = purchase(vec![LineItem::new(1, EntityId::new(), dec!(3))], true);
        assert!(matches!(
            WorkflowService::validate_new_document(&input),
            Err(LedgerError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_validate_counterparty_only_on_purchases() {
        let mut input = purchase(
            vec![LineItem::new(1, EntityId::new(), dec!(3)).with_unit_cost(dec!(1))],
            true,
        );
        input.kind = DocumentKind::Damage;
        assert!(matches!(
            WorkflowService::validate_new_document(&input),
            Err(LedgerError::InvalidDocument(_))
        ));
    }
}
