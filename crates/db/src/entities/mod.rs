//! `SeaORM` entities for the ledger schema.

pub mod prelude;

pub mod document_lines;
pub mod ledger_entities;
pub mod ledger_entries;
pub mod sea_orm_active_enums;
pub mod source_documents;
