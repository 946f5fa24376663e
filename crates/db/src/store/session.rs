//! One Postgres transaction acting as a ledger unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set, Unchanged};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, prelude::DateTimeWithTimeZone,
};
use tallyhall_core::ledger::{EntryKey, LedgerEntry, LedgerError, LedgerResult, OwningEntity};
use tallyhall_core::store::StoreSession;
use tallyhall_core::workflow::{DocumentStatus, SourceDocument, WorkflowAction, WorkflowService};
use tallyhall_shared::types::{DocumentId, EntityId};

use super::convert::{
    document_from_models, entity_from_model, entry_from_model, is_unique_violation, storage_error,
};
use crate::entities::{
    document_lines, ledger_entities, ledger_entries, sea_orm_active_enums as db_enums,
    source_documents,
};

/// A transaction holding `FOR UPDATE` locks until it ends.
///
/// Dropping the session without committing rolls the transaction back.
pub struct PgSession {
    txn: DatabaseTransaction,
}

impl PgSession {
    pub(crate) fn new(txn: DatabaseTransaction) -> Self {
        Self { txn }
    }
}

fn timestamp(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.into()
}

#[async_trait]
impl StoreSession for PgSession {
    async fn insert_entity(&mut self, entity: &OwningEntity) -> LedgerResult<()> {
        ledger_entities::ActiveModel {
            id: Set(entity.id.0),
            kind: Set(entity.kind.into()),
            name: Set(entity.name.clone()),
            balance: Set(entity.balance),
            secondary_balance: Set(entity.secondary_balance),
            reorder_level: Set(entity.reorder_level),
            unit_cost: Set(entity.unit_cost),
            lifetime_increase: Set(entity.lifetime_increase),
            lifetime_decrease: Set(entity.lifetime_decrease),
            created_at: Set(entity.created_at.into()),
            updated_at: Set(entity.updated_at.into()),
        }
        .insert(&self.txn)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn lock_entity(&mut self, id: EntityId) -> LedgerResult<OwningEntity> {
        let model = ledger_entities::Entity::find_by_id(id.0)
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(storage_error)?
            .ok_or(LedgerError::EntityNotFound(id))?;
        Ok(entity_from_model(model))
    }

    async fn update_entity_balances(&mut self, entity: &OwningEntity) -> LedgerResult<()> {
        ledger_entities::ActiveModel {
            id: Unchanged(entity.id.0),
            balance: Set(entity.balance),
            secondary_balance: Set(entity.secondary_balance),
            lifetime_increase: Set(entity.lifetime_increase),
            lifetime_decrease: Set(entity.lifetime_decrease),
            updated_at: Set(entity.updated_at.into()),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn append_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        let key = entry.key();
        let model = ledger_entries::ActiveModel {
            id: Set(entry.id.0),
            entity_id: Set(entry.entity_id.0),
            kind: Set(entry.kind.into()),
            increase: Set(entry.increase),
            decrease: Set(entry.decrease),
            secondary_increase: Set(entry.secondary_increase),
            secondary_decrease: Set(entry.secondary_decrease),
            source_document_id: Set(entry.source.map(|s| s.document_id.0)),
            source_line_no: Set(entry.source.map(|s| s.line_no)),
            description: Set(entry.description),
            balance_before: Set(entry.balance_before),
            running_balance: Set(entry.running_balance),
            secondary_running_balance: Set(entry.secondary_running_balance),
            occurred_at: Set(entry.occurred_at.into()),
            created_at: Set(entry.created_at.into()),
            sequence: NotSet,
        }
        .insert(&self.txn)
        .await
        .map_err(|err| match key {
            Some(key) if is_unique_violation(&err) => LedgerError::DuplicateEntry(key),
            _ => storage_error(err),
        })?;
        Ok(entry_from_model(model))
    }

    async fn entity_entries(&mut self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>> {
        let models = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::EntityId.eq(id.0))
            .order_by_asc(ledger_entries::Column::OccurredAt)
            .order_by_asc(ledger_entries::Column::CreatedAt)
            .order_by_asc(ledger_entries::Column::Sequence)
            .all(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(models.into_iter().map(entry_from_model).collect())
    }

    async fn update_running_balances(&mut self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        for entry in entries {
            ledger_entries::ActiveModel {
                id: Unchanged(entry.id.0),
                balance_before: Set(entry.balance_before),
                running_balance: Set(entry.running_balance),
                secondary_running_balance: Set(entry.secondary_running_balance),
                ..Default::default()
            }
            .update(&self.txn)
            .await
            .map_err(storage_error)?;
        }
        Ok(())
    }

    async fn entry_exists(&mut self, key: &EntryKey) -> LedgerResult<bool> {
        let count = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::SourceDocumentId.eq(key.document_id.0))
            .filter(ledger_entries::Column::SourceLineNo.eq(key.line_no))
            .filter(ledger_entries::Column::Kind.eq(db_enums::EntryKind::from(key.kind)))
            .count(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(count > 0)
    }

    async fn insert_document(&mut self, document: &SourceDocument) -> LedgerResult<()> {
        source_documents::ActiveModel {
            id: Set(document.id.0),
            kind: Set(document.kind.into()),
            status: Set(document.status.into()),
            counterparty_id: Set(document.counterparty_id.map(|id| id.0)),
            reference: Set(document.reference.clone()),
            created_by: Set(document.created_by.map(|id| id.0)),
            approved_by: Set(document.approved_by.map(|id| id.0)),
            approved_at: Set(document.approved_at.map(Into::into)),
            voided_at: Set(document.voided_at.map(Into::into)),
            void_reason: Set(document.void_reason.clone()),
            rejected_at: Set(document.rejected_at.map(Into::into)),
            rejection_reason: Set(document.rejection_reason.clone()),
            created_at: Set(document.created_at.into()),
            updated_at: Set(document.updated_at.into()),
        }
        .insert(&self.txn)
        .await
        .map_err(storage_error)?;

        if document.lines.is_empty() {
            return Ok(());
        }
        let lines = document.lines.iter().map(|line| document_lines::ActiveModel {
            document_id: Set(document.id.0),
            line_no: Set(line.line_no),
            entity_id: Set(line.entity_id.0),
            quantity: Set(line.quantity),
            decrease_quantity: Set(line.decrease_quantity),
            unit_cost: Set(line.unit_cost),
        });
        document_lines::Entity::insert_many(lines)
            .exec(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn lock_document(&mut self, id: DocumentId) -> LedgerResult<SourceDocument> {
        let document = source_documents::Entity::find_by_id(id.0)
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(storage_error)?
            .ok_or(LedgerError::DocumentNotFound(id))?;
        let lines = document_lines::Entity::find()
            .filter(document_lines::Column::DocumentId.eq(id.0))
            .order_by_asc(document_lines::Column::LineNo)
            .all(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(document_from_models(document, lines))
    }

    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: DocumentStatus,
        action: &WorkflowAction,
    ) -> LedgerResult<bool> {
        WorkflowService::ensure_transition(from, action)?;
        let new_status = db_enums::DocumentStatus::from(action.new_status());
        let mut update = source_documents::Entity::update_many()
            .col_expr(
                source_documents::Column::Status,
                source_documents::Column::Status.save_as(Expr::val(new_status)),
            )
            .col_expr(
                source_documents::Column::UpdatedAt,
                Expr::value(timestamp(Utc::now())),
            );
        update = match action {
            WorkflowAction::Approve {
                approved_by,
                approved_at,
                ..
            } => update
                .col_expr(source_documents::Column::ApprovedBy, Expr::value(approved_by.0))
                .col_expr(
                    source_documents::Column::ApprovedAt,
                    Expr::value(timestamp(*approved_at)),
                ),
            WorkflowAction::Void {
                voided_at,
                void_reason,
                ..
            } => update
                .col_expr(
                    source_documents::Column::VoidedAt,
                    Expr::value(timestamp(*voided_at)),
                )
                .col_expr(source_documents::Column::VoidReason, Expr::value(void_reason.clone())),
            WorkflowAction::Reject {
                rejected_at,
                rejection_reason,
                ..
            } => update
                .col_expr(
                    source_documents::Column::RejectedAt,
                    Expr::value(timestamp(*rejected_at)),
                )
                .col_expr(
                    source_documents::Column::RejectionReason,
                    Expr::value(rejection_reason.clone()),
                ),
        };

        let result = update
            .filter(source_documents::Column::Id.eq(id.0))
            .filter(source_documents::Column::Status.eq(db_enums::DocumentStatus::from(from)))
            .exec(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected == 1)
    }

    async fn commit(self) -> LedgerResult<()> {
        self.txn.commit().await.map_err(storage_error)
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.txn.rollback().await.map_err(storage_error)
    }
}
