//! Conversions between `SeaORM` models and ledger domain types.

use chrono::Utc;
use sea_orm::{DbErr, RuntimeErr, SqlErr};
use tallyhall_core::ledger::{self, EntrySource, LedgerEntry, LedgerError, OwningEntity};
use tallyhall_core::workflow::{self, LineItem, SourceDocument};
use tallyhall_shared::types::{DocumentId, EntityId, LedgerEntryId, UserId};

use crate::entities::{
    document_lines, ledger_entities, ledger_entries, sea_orm_active_enums as db_enums,
    source_documents,
};

/// `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps a database error onto the ledger taxonomy.
pub(crate) fn storage_error(err: DbErr) -> LedgerError {
    match sqlstate(&err).as_deref() {
        Some(LOCK_NOT_AVAILABLE) => LedgerError::LockTimeout(err.to_string()),
        Some(DEADLOCK_DETECTED) => LedgerError::LockTimeout(format!("deadlock: {err}")),
        _ => LedgerError::Storage(err.to_string()),
    }
}

/// Returns true for a unique-index violation.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn sqlstate(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(db_err))) => {
            db_err.code().map(|code| code.into_owned())
        }
        _ => None,
    }
}

impl From<ledger::EntityKind> for db_enums::EntityKind {
    fn from(kind: ledger::EntityKind) -> Self {
        match kind {
            ledger::EntityKind::StockUnit => Self::StockUnit,
            ledger::EntityKind::Account => Self::Account,
        }
    }
}

impl From<db_enums::EntityKind> for ledger::EntityKind {
    fn from(kind: db_enums::EntityKind) -> Self {
        match kind {
            db_enums::EntityKind::StockUnit => Self::StockUnit,
            db_enums::EntityKind::Account => Self::Account,
        }
    }
}

impl From<ledger::EntryKind> for db_enums::EntryKind {
    fn from(kind: ledger::EntryKind) -> Self {
        match kind {
            ledger::EntryKind::Opening => Self::Opening,
            ledger::EntryKind::Purchase => Self::Purchase,
            ledger::EntryKind::PurchaseReturn => Self::PurchaseReturn,
            ledger::EntryKind::Damage => Self::Damage,
            ledger::EntryKind::AdjustmentIn => Self::AdjustmentIn,
            ledger::EntryKind::AdjustmentOut => Self::AdjustmentOut,
            ledger::EntryKind::Payment => Self::Payment,
            ledger::EntryKind::Manual => Self::Manual,
            ledger::EntryKind::Reversal => Self::Reversal,
        }
    }
}

impl From<db_enums::EntryKind> for ledger::EntryKind {
    fn from(kind: db_enums::EntryKind) -> Self {
        match kind {
            db_enums::EntryKind::Opening => Self::Opening,
            db_enums::EntryKind::Purchase => Self::Purchase,
            db_enums::EntryKind::PurchaseReturn => Self::PurchaseReturn,
            db_enums::EntryKind::Damage => Self::Damage,
            db_enums::EntryKind::AdjustmentIn => Self::AdjustmentIn,
            db_enums::EntryKind::AdjustmentOut => Self::AdjustmentOut,
            db_enums::EntryKind::Payment => Self::Payment,
            db_enums::EntryKind::Manual => Self::Manual,
            db_enums::EntryKind::Reversal => Self::Reversal,
        }
    }
}

impl From<workflow::DocumentKind> for db_enums::DocumentKind {
    fn from(kind: workflow::DocumentKind) -> Self {
        match kind {
            workflow::DocumentKind::Purchase => Self::Purchase,
            workflow::DocumentKind::PurchaseReturn => Self::PurchaseReturn,
            workflow::DocumentKind::Damage => Self::Damage,
            workflow::DocumentKind::Adjustment => Self::Adjustment,
            workflow::DocumentKind::Payment => Self::Payment,
        }
    }
}

impl From<db_enums::DocumentKind> for workflow::DocumentKind {
    fn from(kind: db_enums::DocumentKind) -> Self {
        match kind {
            db_enums::DocumentKind::Purchase => Self::Purchase,
            db_enums::DocumentKind::PurchaseReturn => Self::PurchaseReturn,
            db_enums::DocumentKind::Damage => Self::Damage,
            db_enums::DocumentKind::Adjustment => Self::Adjustment,
            db_enums::DocumentKind::Payment => Self::Payment,
        }
    }
}

impl From<workflow::DocumentStatus> for db_enums::DocumentStatus {
    fn from(status: workflow::DocumentStatus) -> Self {
        match status {
            workflow::DocumentStatus::Pending => Self::Pending,
            workflow::DocumentStatus::Approved => Self::Approved,
            workflow::DocumentStatus::Voided => Self::Voided,
            workflow::DocumentStatus::Rejected => Self::Rejected,
        }
    }
}

impl From<db_enums::DocumentStatus> for workflow::DocumentStatus {
    fn from(status: db_enums::DocumentStatus) -> Self {
        match status {
            db_enums::DocumentStatus::Pending => Self::Pending,
            db_enums::DocumentStatus::Approved => Self::Approved,
            db_enums::DocumentStatus::Voided => Self::Voided,
            db_enums::DocumentStatus::Rejected => Self::Rejected,
        }
    }
}

pub(crate) fn entity_from_model(model: ledger_entities::Model) -> OwningEntity {
    OwningEntity {
        id: EntityId::from_uuid(model.id),
        kind: model.kind.into(),
        name: model.name,
        balance: model.balance,
        secondary_balance: model.secondary_balance,
        reorder_level: model.reorder_level,
        unit_cost: model.unit_cost,
        lifetime_increase: model.lifetime_increase,
        lifetime_decrease: model.lifetime_decrease,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn entry_from_model(model: ledger_entries::Model) -> LedgerEntry {
    let source = model
        .source_document_id
        .zip(model.source_line_no)
        .map(|(document_id, line_no)| EntrySource {
            document_id: DocumentId::from_uuid(document_id),
            line_no,
        });
    LedgerEntry {
        id: LedgerEntryId::from_uuid(model.id),
        entity_id: EntityId::from_uuid(model.entity_id),
        kind: model.kind.into(),
        increase: model.increase,
        decrease: model.decrease,
        secondary_increase: model.secondary_increase,
        secondary_decrease: model.secondary_decrease,
        source,
        description: model.description,
        occurred_at: model.occurred_at.with_timezone(&Utc),
        created_at: model.created_at.with_timezone(&Utc),
        sequence: model.sequence,
        balance_before: model.balance_before,
        running_balance: model.running_balance,
        secondary_running_balance: model.secondary_running_balance,
    }
}

pub(crate) fn document_from_models(
    model: source_documents::Model,
    mut lines: Vec<document_lines::Model>,
) -> SourceDocument {
    lines.sort_by_key(|line| line.line_no);
    SourceDocument {
        id: DocumentId::from_uuid(model.id),
        kind: model.kind.into(),
        status: model.status.into(),
        counterparty_id: model.counterparty_id.map(EntityId::from_uuid),
        reference: model.reference,
        lines: lines
            .into_iter()
            .map(|line| LineItem {
                line_no: line.line_no,
                entity_id: EntityId::from_uuid(line.entity_id),
                quantity: line.quantity,
                decrease_quantity: line.decrease_quantity,
                unit_cost: line.unit_cost,
            })
            .collect(),
        created_by: model.created_by.map(UserId::from_uuid),
        approved_by: model.approved_by.map(UserId::from_uuid),
        approved_at: model.approved_at.map(|at| at.with_timezone(&Utc)),
        voided_at: model.voided_at.map(|at| at.with_timezone(&Utc)),
        void_reason: model.void_reason,
        rejected_at: model.rejected_at.map(|at| at.with_timezone(&Utc)),
        rejection_reason: model.rejection_reason,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_round_trip_covers_every_kind() {
        for kind in ledger::EntryKind::ALL {
            let stored: db_enums::EntryKind = kind.into();
            assert_eq!(ledger::EntryKind::from(stored), kind);
        }
    }

    #[test]
    fn test_non_database_errors_map_to_storage() {
        let err = storage_error(DbErr::Custom("boom".to_string()));
        assert!(matches!(err, LedgerError::Storage(msg) if msg.contains("boom")));
    }
}
