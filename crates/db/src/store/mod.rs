//! Postgres ledger store.
//!
//! Entity and document locks are `SELECT ... FOR UPDATE` row locks held by
//! the session's transaction. Every session sets `lock_timeout`, so a wait
//! that exceeds it surfaces as `LedgerError::LockTimeout`.

mod convert;
mod session;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, TransactionTrait,
};
use tallyhall_core::ledger::{EntityFilter, LedgerEntry, LedgerResult, OwningEntity};
use tallyhall_core::store::LedgerStore;
use tallyhall_core::workflow::{DocumentStatus, SourceDocument};
use tallyhall_shared::config::EngineConfig;
use tallyhall_shared::types::{DocumentId, EntityId};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    document_lines, ledger_entities, ledger_entries, sea_orm_active_enums as db_enums,
    source_documents,
};
use convert::{document_from_models, entity_from_model, entry_from_model, storage_error};

pub use session::PgSession;

/// Ledger store backed by Postgres through `SeaORM`.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    /// Creates a store with an explicit lock timeout.
    #[must_use]
    pub fn new(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Creates a store using `engine.lock_timeout_ms`.
    #[must_use]
    pub fn from_config(db: DatabaseConnection, config: &EngineConfig) -> Self {
        Self::new(db, Duration::from_millis(config.lock_timeout_ms))
    }

    /// The underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn entity_ids(filter: &EntityFilter) -> Option<Vec<Uuid>> {
    filter
        .ids
        .as_ref()
        .map(|ids| ids.iter().map(|id| id.0).collect())
}

/// Restricts an entry query to entities matching `filter`.
fn filter_entries(
    mut query: Select<ledger_entries::Entity>,
    filter: &EntityFilter,
) -> Select<ledger_entries::Entity> {
    if let Some(kind) = filter.kind {
        query = query
            .join(JoinType::InnerJoin, ledger_entries::Relation::LedgerEntities.def())
            .filter(ledger_entities::Column::Kind.eq(db_enums::EntityKind::from(kind)));
    }
    if let Some(ids) = entity_ids(filter) {
        query = query.filter(ledger_entries::Column::EntityId.is_in(ids));
    }
    query
}

#[derive(Debug, FromQueryResult)]
struct OpeningRow {
    entity_id: Uuid,
    opening: Decimal,
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Session = PgSession;

    async fn begin(&self) -> LedgerResult<PgSession> {
        let txn = self.db.begin().await.map_err(storage_error)?;
        let millis = self.lock_timeout.as_millis();
        txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{millis}ms'"))
            .await
            .map_err(storage_error)?;
        Ok(PgSession::new(txn))
    }

    async fn find_entity(&self, id: EntityId) -> LedgerResult<Option<OwningEntity>> {
        let model = ledger_entities::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(model.map(entity_from_model))
    }

    async fn list_entities(&self, filter: &EntityFilter) -> LedgerResult<Vec<OwningEntity>> {
        let mut query = ledger_entities::Entity::find();
        if let Some(kind) = filter.kind {
            query = query.filter(ledger_entities::Column::Kind.eq(db_enums::EntityKind::from(kind)));
        }
        if let Some(ids) = entity_ids(filter) {
            query = query.filter(ledger_entities::Column::Id.is_in(ids));
        }
        let models = query
            .order_by_asc(ledger_entities::Column::Name)
            .order_by_asc(ledger_entities::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(models.into_iter().map(entity_from_model).collect())
    }

    async fn find_document(&self, id: DocumentId) -> LedgerResult<Option<SourceDocument>> {
        let found = source_documents::Entity::find_by_id(id.0)
            .find_with_related(document_lines::Entity)
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(found
            .into_iter()
            .next()
            .map(|(document, lines)| document_from_models(document, lines)))
    }

    async fn list_documents(
        &self,
        statuses: &[DocumentStatus],
    ) -> LedgerResult<Vec<SourceDocument>> {
        let statuses: Vec<db_enums::DocumentStatus> =
            statuses.iter().copied().map(Into::into).collect();
        let found = source_documents::Entity::find()
            .filter(source_documents::Column::Status.is_in(statuses))
            .order_by_asc(source_documents::Column::CreatedAt)
            .order_by_asc(source_documents::Column::Id)
            .find_with_related(document_lines::Entity)
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(found
            .into_iter()
            .map(|(document, lines)| document_from_models(document, lines))
            .collect())
    }

    async fn entries_for_entity(&self, id: EntityId) -> LedgerResult<Vec<LedgerEntry>> {
        let models = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::EntityId.eq(id.0))
            .order_by_asc(ledger_entries::Column::OccurredAt)
            .order_by_asc(ledger_entries::Column::CreatedAt)
            .order_by_asc(ledger_entries::Column::Sequence)
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(models.into_iter().map(entry_from_model).collect())
    }

    async fn entries_between(
        &self,
        filter: &EntityFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let models = filter_entries(ledger_entries::Entity::find(), filter)
            .filter(ledger_entries::Column::OccurredAt.gte(from))
            .filter(ledger_entries::Column::OccurredAt.lt(to))
            .order_by_asc(ledger_entries::Column::OccurredAt)
            .order_by_asc(ledger_entries::Column::CreatedAt)
            .order_by_asc(ledger_entries::Column::Sequence)
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        debug!(count = models.len(), "Loaded entries for window");
        Ok(models.into_iter().map(entry_from_model).collect())
    }

    async fn opening_balances(
        &self,
        filter: &EntityFilter,
        at: DateTime<Utc>,
    ) -> LedgerResult<HashMap<EntityId, Decimal>> {
        let rows = filter_entries(ledger_entries::Entity::find(), filter)
            .select_only()
            .column(ledger_entries::Column::EntityId)
            .column_as(
                Expr::cust("SUM(ledger_entries.increase - ledger_entries.decrease)"),
                "opening",
            )
            .filter(ledger_entries::Column::OccurredAt.lt(at))
            .group_by(ledger_entries::Column::EntityId)
            .into_model::<OpeningRow>()
            .all(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(rows
            .into_iter()
            .map(|row| (EntityId::from_uuid(row.entity_id), row.opening))
            .collect())
    }
}
