//! `SeaORM` entity prelude.

pub use super::document_lines::Entity as DocumentLines;
pub use super::ledger_entities::Entity as LedgerEntities;
pub use super::ledger_entries::Entity as LedgerEntries;
pub use super::source_documents::Entity as SourceDocuments;
