//! `SeaORM` Entity for ledger_entries table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::EntryKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entity_id: Uuid,
    pub kind: EntryKind,
    #[sea_orm(column_type = "Decimal(None)")]
    pub increase: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub decrease: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub secondary_increase: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub secondary_decrease: Decimal,
    pub source_document_id: Option<Uuid>,
    pub source_line_no: Option<i32>,
    pub description: String,
    #[sea_orm(column_type = "Decimal(None)")]
    pub balance_before: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub running_balance: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub secondary_running_balance: Decimal,
    pub occurred_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub sequence: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ledger_entities::Entity",
        from = "Column::EntityId",
        to = "super::ledger_entities::Column::Id"
    )]
    LedgerEntities,
    #[sea_orm(
        belongs_to = "super::source_documents::Entity",
        from = "Column::SourceDocumentId",
        to = "super::source_documents::Column::Id"
    )]
    SourceDocuments,
}

impl Related<super::ledger_entities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntities.def()
    }
}

impl Related<super::source_documents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceDocuments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
