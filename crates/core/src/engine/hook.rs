//! Synchronization hook.
//!
//! The status update and every balance mutation it causes run in one
//! session: if any line fails, the document keeps its previous status and
//! no entry is written. This is the single place where documents are
//! dispatched onto the ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tallyhall_shared::types::{DocumentId, EntityId, LedgerEntryId, UserId};
use tracing::{info, instrument};

use super::LedgerEngine;
use super::mutator::{MutationRequest, mutate};
use crate::ledger::{BalanceChange, EntryKind, EntrySource, LedgerError, LedgerResult};
use crate::store::{LedgerStore, StoreSession};
use crate::workflow::{
    DispatchPhase, DispatchService, DocumentStatus, NewDocument, SourceDocument, WorkflowAction,
    WorkflowService,
};

/// One line's effect on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedLine {
    /// Document line (0 for the counterparty).
    pub line_no: i32,
    /// Target entity.
    pub entity_id: EntityId,
    /// Entry written.
    pub entry_id: LedgerEntryId,
    /// Entry kind written.
    pub entry_kind: EntryKind,
    /// Signed delta the document asked for.
    pub requested_delta: Decimal,
    /// Primary bucket before/after.
    pub change: BalanceChange,
    /// Damaged bucket before/after, for two-bucket lines.
    pub secondary_change: Option<BalanceChange>,
}

impl AppliedLine {
    /// Returns true if the floor reduced the requested delta.
    #[must_use]
    pub fn was_clamped(&self) -> bool {
        self.change.applied_delta() != self.requested_delta
    }
}

/// Result of approving a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalResult {
    /// The document.
    pub document_id: DocumentId,
    /// Status after the call.
    pub status: DocumentStatus,
    /// One item per mutation, in lock order.
    pub applied_line_items: Vec<AppliedLine>,
}

/// Result of voiding a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoidResult {
    /// The document.
    pub document_id: DocumentId,
    /// Status after the call.
    pub status: DocumentStatus,
    /// One compensating item per original mutation, in lock order.
    pub reversed_line_items: Vec<AppliedLine>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Validates and records a `pending` document.
    #[instrument(skip(self, input), fields(kind = %input.kind, lines = input.lines.len()))]
    pub async fn create_document(&self, input: NewDocument) -> LedgerResult<SourceDocument> {
        WorkflowService::validate_new_document(&input)?;

        let line_kind = input.kind.line_entity_kind();
        let targets = input
            .lines
            .iter()
            .map(|line| (line.entity_id, line_kind))
            .chain(
                input
                    .counterparty_id
                    .map(|id| (id, crate::ledger::EntityKind::Account)),
            );
        for (entity_id, expected) in targets {
            let entity = self.entity(entity_id).await?;
            if entity.kind != expected {
                return Err(LedgerError::EntityKindMismatch {
                    entity_id,
                    expected,
                    actual: entity.kind,
                });
            }
        }

        let document = SourceDocument::pending(input, Utc::now());
        let mut session = self.store.begin().await?;
        let result = session.insert_document(&document).await;
        self.finish(session, result).await?;

        info!(document_id = %document.id, reference = %document.reference, "Document recorded");
        Ok(document)
    }

    /// `pending → approved`: applies every line to the ledger.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn approve_document(
        &self,
        document_id: DocumentId,
        approver_id: UserId,
    ) -> LedgerResult<ApprovalResult> {
        let mut session = self.store.begin().await?;
        let result = async {
            let document = session.lock_document(document_id).await?;
            let action =
                WorkflowService::approve(document_id, document.status, approver_id, Utc::now())?;
            let document = Self::transition(&mut session, document, &action).await?;
            let applied_line_items =
                Self::dispatch(&mut session, &document, DispatchPhase::Approval).await?;
            Ok(ApprovalResult {
                document_id,
                status: document.status,
                applied_line_items,
            })
        }
        .await;

        let approved = self.finish(session, result).await?;
        info!(
            document_id = %document_id,
            approver_id = %approver_id,
            lines = approved.applied_line_items.len(),
            "Document approved"
        );
        Ok(approved)
    }

    /// `approved → voided`: writes compensating entries for every line.
    #[instrument(skip(self, reason), fields(document_id = %document_id))]
    pub async fn void_document(
        &self,
        document_id: DocumentId,
        reason: impl Into<String> + Send,
    ) -> LedgerResult<VoidResult> {
        let reason = reason.into();
        let mut session = self.store.begin().await?;
        let result = async {
            let document = session.lock_document(document_id).await?;
            let action = WorkflowService::void(document_id, document.status, reason, Utc::now())?;
            let document = Self::transition(&mut session, document, &action).await?;
            let reversed_line_items =
                Self::dispatch(&mut session, &document, DispatchPhase::Reversal).await?;
            Ok(VoidResult {
                document_id,
                status: document.status,
                reversed_line_items,
            })
        }
        .await;

        let voided = self.finish(session, result).await?;
        info!(
            document_id = %document_id,
            lines = voided.reversed_line_items.len(),
            "Document voided"
        );
        Ok(voided)
    }

    /// `pending → rejected`: no ledger writes.
    #[instrument(skip(self, reason), fields(document_id = %document_id))]
    pub async fn reject_document(
        &self,
        document_id: DocumentId,
        reason: Option<String>,
    ) -> LedgerResult<SourceDocument> {
        let mut session = self.store.begin().await?;
        let result = async {
            let document = session.lock_document(document_id).await?;
            let action =
                WorkflowService::reject(document_id, document.status, reason, Utc::now())?;
            Self::transition(&mut session, document, &action).await
        }
        .await;

        let rejected = self.finish(session, result).await?;
        info!(document_id = %document_id, "Document rejected");
        Ok(rejected)
    }

    /// Guarded status update; the guard failing means another writer got
    /// there first.
    async fn transition(
        session: &mut S::Session,
        mut document: SourceDocument,
        action: &WorkflowAction,
    ) -> LedgerResult<SourceDocument> {
        let from = action.expected_status();
        if !session.transition_document(document.id, from, action).await? {
            let current = session.lock_document(document.id).await?.status;
            return Err(match action {
                WorkflowAction::Void { .. } => LedgerError::DocumentNotApproved {
                    document_id: document.id,
                    status: current,
                },
                WorkflowAction::Approve { .. } | WorkflowAction::Reject { .. } => {
                    LedgerError::DocumentNotPending {
                        document_id: document.id,
                        status: current,
                    }
                }
            });
        }
        document.apply(action);
        Ok(document)
    }

    /// Runs the planned mutations for `phase`, one lock per line in line order.
    async fn dispatch(
        session: &mut S::Session,
        document: &SourceDocument,
        phase: DispatchPhase,
    ) -> LedgerResult<Vec<AppliedLine>> {
        let plan = DispatchService::plan(document, phase);
        let mut applied = Vec::with_capacity(plan.len());

        for planned in plan {
            let two_bucket = planned.is_two_bucket();
            let outcome = mutate(
                session,
                MutationRequest {
                    entity_id: planned.entity_id,
                    expected_kind: Some(planned.expected_kind),
                    entry_kind: planned.entry_kind,
                    delta: planned.delta,
                    secondary_delta: planned.secondary_delta,
                    source: Some(EntrySource {
                        document_id: planned.document_id,
                        line_no: planned.line_no,
                    }),
                    description: planned.description,
                    occurred_at: Some(planned.occurred_at),
                },
            )
            .await?;

            applied.push(AppliedLine {
                line_no: planned.line_no,
                entity_id: planned.entity_id,
                entry_id: outcome.entry.id,
                entry_kind: outcome.entry.kind,
                requested_delta: planned.delta,
                change: outcome.primary,
                secondary_change: two_bucket.then_some(outcome.secondary),
            });
        }

        Ok(applied)
    }
}
