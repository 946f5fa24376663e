//! `SeaORM` Entity for ledger_entities table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::EntityKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    #[sea_orm(column_type = "Decimal(None)")]
    pub balance: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub secondary_balance: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub reorder_level: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub lifetime_increase: Decimal,
    #[sea_orm(column_type = "Decimal(None)")]
    pub lifetime_decrease: Decimal,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_entries::Entity")]
    LedgerEntries,
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
