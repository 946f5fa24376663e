//! `SeaORM` active enums mirroring the Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entity_kind")]
pub enum EntityKind {
    #[sea_orm(string_value = "stock_unit")]
    StockUnit,
    #[sea_orm(string_value = "account")]
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entry_kind")]
pub enum EntryKind {
    #[sea_orm(string_value = "opening")]
    Opening,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "purchase_return")]
    PurchaseReturn,
    #[sea_orm(string_value = "damage")]
    Damage,
    #[sea_orm(string_value = "adjustment_in")]
    AdjustmentIn,
    #[sea_orm(string_value = "adjustment_out")]
    AdjustmentOut,
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "reversal")]
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "document_kind")]
pub enum DocumentKind {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "purchase_return")]
    PurchaseReturn,
    #[sea_orm(string_value = "damage")]
    Damage,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "payment")]
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "document_status")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "voided")]
    Voided,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
