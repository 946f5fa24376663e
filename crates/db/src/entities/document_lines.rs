//! `SeaORM` Entity for document_lines table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "document_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub document_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub line_no: i32,
    pub entity_id: Uuid,
    #[sea_orm(column_type = "Decimal(None)")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub decrease_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(None)", nullable)]
    pub unit_cost: Option<Decimal>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::source_documents::Entity",
        from = "Column::DocumentId",
        to = "super::source_documents::Column::Id"
    )]
    SourceDocuments,
    #[sea_orm(
        belongs_to = "super::ledger_entities::Entity",
        from = "Column::EntityId",
        to = "super::ledger_entities::Column::Id"
    )]
    LedgerEntities,
}

impl Related<super::source_documents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceDocuments.def()
    }
}

impl Related<super::ledger_entities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
