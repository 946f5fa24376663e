//! Property-based tests for WorkflowService.

use chrono::Utc;
use proptest::prelude::*;
use tallyhall_shared::types::{DocumentId, UserId};
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::workflow::service::WorkflowService;
use crate::workflow::types::{DocumentStatus, WorkflowAction};

/// Strategy for generating random DocumentStatus values.
fn arb_status() -> impl Strategy<Value = DocumentStatus> {
    prop_oneof![
        Just(DocumentStatus::Pending),
        Just(DocumentStatus::Approved),
        Just(DocumentStatus::Voided),
        Just(DocumentStatus::Rejected),
    ]
}

/// Strategy for generating random user ids.
fn arb_user() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating non-blank reasons.
fn arb_reason() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 ]{0,60}".prop_map(|s| s.trim().to_string())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Valid transitions carry their audit fields
    // =========================================================================

    /// Pending + approve → Approved with the approver recorded
    #[test]
    fn prop_approve_from_pending_succeeds(user_id in arb_user()) {
        let action = WorkflowService::approve(
            DocumentId::new(),
            DocumentStatus::Pending,
            user_id,
            Utc::now(),
        );
        prop_assert!(action.is_ok());
        let action = action.unwrap();
        prop_assert_eq!(action.new_status(), DocumentStatus::Approved);
        prop_assert_eq!(action.expected_status(), DocumentStatus::Pending);

        if let WorkflowAction::Approve { approved_by, .. } = action {
            prop_assert_eq!(approved_by, user_id);
        } else {
            prop_assert!(false, "Expected Approve action");
        }
    }

    /// Approved + void → Voided with the reason recorded
    #[test]
    fn prop_void_from_approved_succeeds(reason in arb_reason()) {
        let action = WorkflowService::void(
            DocumentId::new(),
            DocumentStatus::Approved,
            reason.clone(),
            Utc::now(),
        );
        prop_assert!(action.is_ok());
        let action = action.unwrap();
        prop_assert_eq!(action.new_status(), DocumentStatus::Voided);

        if let WorkflowAction::Void { void_reason, .. } = action {
            prop_assert_eq!(void_reason, reason);
        } else {
            prop_assert!(false, "Expected Void action");
        }
    }

    // =========================================================================
    // Invalid transitions are rejected with the current status
    // =========================================================================

    /// Approve from anything but Pending fails with DocumentNotPending
    #[test]
    fn prop_approve_from_non_pending_fails(status in arb_status(), user_id in arb_user()) {
        prop_assume!(status != DocumentStatus::Pending);
        let document_id = DocumentId::new();

        match WorkflowService::approve(document_id, status, user_id, Utc::now()) {
            Err(LedgerError::DocumentNotPending { document_id: id, status: s }) => {
                prop_assert_eq!(id, document_id);
                prop_assert_eq!(s, status);
            }
            _ => prop_assert!(false, "Expected DocumentNotPending error"),
        }
    }

    /// Void from anything but Approved fails with DocumentNotApproved
    #[test]
    fn prop_void_from_non_approved_fails(status in arb_status(), reason in arb_reason()) {
        prop_assume!(status != DocumentStatus::Approved);

        match WorkflowService::void(DocumentId::new(), status, reason, Utc::now()) {
            Err(LedgerError::DocumentNotApproved { status: s, .. }) => prop_assert_eq!(s, status),
            _ => prop_assert!(false, "Expected DocumentNotApproved error"),
        }
    }

    /// Reject from anything but Pending fails with DocumentNotPending
    #[test]
    fn prop_reject_from_non_pending_fails(status in arb_status()) {
        prop_assume!(status != DocumentStatus::Pending);
        let result = WorkflowService::reject(DocumentId::new(), status, None, Utc::now());
        let is_not_pending = matches!(result, Err(LedgerError::DocumentNotPending { .. }));
        prop_assert!(is_not_pending);
    }

    /// is_valid_transition agrees with the service functions
    #[test]
    fn prop_is_valid_transition_consistency(
        from in arb_status(),
        user_id in arb_user(),
        reason in arb_reason(),
    ) {
        let id = DocumentId::new();
        let now = Utc::now();
        prop_assert_eq!(
            WorkflowService::approve(id, from, user_id, now).is_ok(),
            WorkflowService::is_valid_transition(from, DocumentStatus::Approved)
        );
        prop_assert_eq!(
            WorkflowService::void(id, from, reason, now).is_ok(),
            WorkflowService::is_valid_transition(from, DocumentStatus::Voided)
        );
        prop_assert_eq!(
            WorkflowService::reject(id, from, None, now).is_ok(),
            WorkflowService::is_valid_transition(from, DocumentStatus::Rejected)
        );
    }
}

// =========================================================================
// Unit tests for edge cases
// =========================================================================

#[cfg(test)]
mod edge_case_tests {
    use super::*;

    #[test]
    fn test_void_blank_reasons_fail() {
        for reason in ["", "   ", "\t\t", "\n\n"] {
            let result = WorkflowService::void(
                DocumentId::new(),
                DocumentStatus::Approved,
                reason.to_string(),
                Utc::now(),
            );
            assert!(matches!(result, Err(LedgerError::VoidReasonRequired)));
        }
    }

    #[test]
    fn test_terminal_statuses_cannot_transition() {
        let statuses = [
            DocumentStatus::Pending,
            DocumentStatus::Approved,
            DocumentStatus::Voided,
            DocumentStatus::Rejected,
        ];

        for from in [DocumentStatus::Voided, DocumentStatus::Rejected] {
            for to in &statuses {
                assert!(
                    !WorkflowService::is_valid_transition(from, *to),
                    "{from:?} should not transition to {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_same_status_transitions_invalid() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Approved,
            DocumentStatus::Voided,
            DocumentStatus::Rejected,
        ] {
            assert!(!WorkflowService::is_valid_transition(status, status));
        }
    }
}
