//! Atomic mutator.
//!
//! Lock the entity, compute the floored/saturated balance, write the cache
//! and append exactly one entry, all inside the caller's session.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tallyhall_shared::types::{EntityId, LedgerEntryId};
use tracing::{debug, info, instrument};

use super::LedgerEngine;
use crate::ledger::{
    BalanceChange, EntityKind, EntrySource, EntryKind, FloorPolicy, LedgerEntry, LedgerError,
    LedgerResult, NewEntity, OwningEntity, TwoBucketChange, apply_delta,
};
use crate::store::{LedgerStore, StoreSession};

/// One balance mutation.
#[derive(Debug, Clone)]
pub(crate) struct MutationRequest {
    pub entity_id: EntityId,
    pub expected_kind: Option<EntityKind>,
    pub entry_kind: EntryKind,
    pub delta: Decimal,
    pub secondary_delta: Decimal,
    pub source: Option<EntrySource>,
    pub description: String,
    /// Business time of a document line. `None` stamps the entry once the
    /// lock is held, so manual entries sort in the order they were applied.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// What a mutation did.
#[derive(Debug, Clone)]
pub(crate) struct MutationOutcome {
    pub entry: LedgerEntry,
    pub primary: BalanceChange,
    pub secondary: BalanceChange,
}

/// Applies one mutation inside `session`.
///
/// The entity lock taken here is held until the session ends.
pub(crate) async fn mutate<T: StoreSession>(
    session: &mut T,
    request: MutationRequest,
) -> LedgerResult<MutationOutcome> {
    let mut entity = session.lock_entity(request.entity_id).await?;

    if let Some(expected) = request.expected_kind {
        if entity.kind != expected {
            return Err(LedgerError::EntityKindMismatch {
                entity_id: entity.id,
                expected,
                actual: entity.kind,
            });
        }
    }
    if !request.secondary_delta.is_zero() && !entity.kind.has_secondary_bucket() {
        return Err(LedgerError::EntityKindMismatch {
            entity_id: entity.id,
            expected: EntityKind::StockUnit,
            actual: entity.kind,
        });
    }

    let primary = apply_delta(entity.balance, request.delta, entity.kind.floor_policy());
    let secondary = apply_delta(
        entity.secondary_balance,
        request.secondary_delta,
        FloorPolicy::FloorAtZero,
    );
    let now = Utc::now();

    entity.balance = primary.after;
    entity.secondary_balance = secondary.after;
    entity.lifetime_increase = entity.lifetime_increase.saturating_add(primary.increase);
    entity.lifetime_decrease = entity.lifetime_decrease.saturating_add(primary.decrease);
    entity.updated_at = now;
    session.update_entity_balances(&entity).await?;

    let entry = session
        .append_entry(LedgerEntry {
            id: LedgerEntryId::new(),
            entity_id: entity.id,
            kind: request.entry_kind,
            increase: primary.increase,
            decrease: primary.decrease,
            secondary_increase: secondary.increase,
            secondary_decrease: secondary.decrease,
            source: request.source,
            description: request.description,
            occurred_at: request.occurred_at.unwrap_or(now),
            created_at: now,
            sequence: 0,
            balance_before: primary.before,
            running_balance: primary.after,
            secondary_running_balance: secondary.after,
        })
        .await?;

    if primary.was_clamped(request.delta) || secondary.was_clamped(request.secondary_delta) {
        debug!(
            entity_id = %entity.id,
            requested = %request.delta,
            applied = %(primary.after - primary.before),
            "Delta clamped at zero"
        );
    }

    Ok(MutationOutcome {
        entry,
        primary: BalanceChange {
            before: primary.before,
            after: primary.after,
        },
        secondary: BalanceChange {
            before: secondary.before,
            after: secondary.after,
        },
    })
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Registers an entity; a non-zero starting balance is written as an
    /// `opening` entry so the entity's history explains its cache.
    #[instrument(skip(self, input), fields(kind = %input.kind, name = %input.name))]
    pub async fn register_entity(&self, input: NewEntity) -> LedgerResult<OwningEntity> {
        if input.name.trim().is_empty() {
            return Err(LedgerError::InvalidDocument(
                "entity name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let entity = OwningEntity {
            id: EntityId::new(),
            kind: input.kind,
            name: input.name,
            balance: Decimal::ZERO,
            secondary_balance: Decimal::ZERO,
            reorder_level: input.reorder_level,
            unit_cost: input.unit_cost,
            lifetime_increase: Decimal::ZERO,
            lifetime_decrease: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };

        let mut session = self.store.begin().await?;
        let result = async {
            session.insert_entity(&entity).await?;
            if input.opening_balance.is_zero() && input.opening_secondary.is_zero() {
                return Ok(entity.clone());
            }
            mutate(
                &mut session,
                MutationRequest {
                    entity_id: entity.id,
                    expected_kind: None,
                    entry_kind: EntryKind::Opening,
                    delta: input.opening_balance,
                    secondary_delta: input.opening_secondary,
                    source: None,
                    description: "opening balance".to_string(),
                    occurred_at: Some(now),
                },
            )
            .await?;
            session.lock_entity(entity.id).await
        }
        .await;

        let registered = self.finish(session, result).await?;
        info!(entity_id = %registered.id, balance = %registered.balance, "Entity registered");
        Ok(registered)
    }

    /// Adds `delta` to an entity's balance (stock floored at zero).
    #[instrument(skip(self), fields(entity_id = %entity_id, delta = %delta))]
    pub async fn adjust_balance(
        &self,
        entity_id: EntityId,
        delta: Decimal,
    ) -> LedgerResult<BalanceChange> {
        let mut session = self.store.begin().await?;
        let result = mutate(
            &mut session,
            MutationRequest {
                entity_id,
                expected_kind: None,
                entry_kind: EntryKind::Manual,
                delta,
                secondary_delta: Decimal::ZERO,
                source: None,
                description: "manual adjustment".to_string(),
                occurred_at: None,
            },
        )
        .await
        .map(|outcome| outcome.primary);

        self.finish(session, result).await
    }

    /// Moves fresh and damaged stock in one call under one lock, producing
    /// one combined entry. Each bucket is floored independently.
    #[instrument(skip(self), fields(entity_id = %entity_id, delta_a = %delta_a, delta_b = %delta_b))]
    pub async fn adjust_two_bucket(
        &self,
        entity_id: EntityId,
        delta_a: Decimal,
        delta_b: Decimal,
    ) -> LedgerResult<TwoBucketChange> {
        let mut session = self.store.begin().await?;
        let result = mutate(
            &mut session,
            MutationRequest {
                entity_id,
                expected_kind: Some(EntityKind::StockUnit),
                entry_kind: EntryKind::Manual,
                delta: delta_a,
                secondary_delta: delta_b,
                source: None,
                description: "manual two-bucket adjustment".to_string(),
                occurred_at: None,
            },
        )
        .await
        .map(|outcome| TwoBucketChange {
            before_a: outcome.primary.before,
            after_a: outcome.primary.after,
            before_b: outcome.secondary.before,
            after_b: outcome.secondary.after,
        });

        self.finish(session, result).await
    }
}
