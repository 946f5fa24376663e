//! Ledger primitives.
//!
//! This module implements the building blocks shared by every engine
//! operation:
//! - Owning entities and their balance cache
//! - Immutable ledger entries
//! - Floor/saturation balance arithmetic and running-balance replay
//! - Error types for ledger operations

pub mod balance;
pub mod error;
pub mod types;

#[cfg(test)]
mod balance_props;

pub use balance::{
    AppliedDelta, ReplayTotals, RunningBalance, apply_delta, replay_running_balances, split_signed,
};
pub use error::{LedgerError, LedgerResult};
pub use types::{
    BalanceChange, EntityFilter, EntityKind, EntryKey, EntryKind, EntrySource, FloorPolicy,
    LedgerEntry, NewEntity, OwningEntity, TwoBucketChange,
};
