//! Balance arithmetic.
//!
//! - Stock balances: `new = max(0, current + delta)`
//! - Account balances: `new = current + delta` (signed)
//!
//! Overflow saturates at `Decimal::MAX` / `Decimal::MIN` instead of
//! panicking. Recorded magnitudes are always the clamped, actual change.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{FloorPolicy, LedgerEntry};

/// Result of applying a signed delta to one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDelta {
    /// Balance before.
    pub before: Decimal,
    /// Balance after (floored and saturated).
    pub after: Decimal,
    /// Actual increase recorded on the entry.
    pub increase: Decimal,
    /// Actual decrease recorded on the entry.
    pub decrease: Decimal,
}

impl AppliedDelta {
    /// Returns true if the requested delta was reduced by the floor.
    #[must_use]
    pub fn was_clamped(&self, requested: Decimal) -> bool {
        self.after.saturating_sub(self.before) != requested
    }
}

/// Applies `delta` to `current` under `policy`.
#[must_use]
pub fn apply_delta(current: Decimal, delta: Decimal, policy: FloorPolicy) -> AppliedDelta {
    let raw = current.saturating_add(delta);
    let after = match policy {
        FloorPolicy::FloorAtZero => raw.max(Decimal::ZERO),
        FloorPolicy::Signed => raw,
    };
    let actual = after.saturating_sub(current);

    AppliedDelta {
        before: current,
        after,
        increase: actual.max(Decimal::ZERO),
        decrease: (-actual).max(Decimal::ZERO),
    }
}

/// Splits a signed amount into non-negative `(increase, decrease)`.
#[must_use]
pub fn split_signed(amount: Decimal) -> (Decimal, Decimal) {
    if amount.is_sign_negative() {
        (Decimal::ZERO, -amount)
    } else {
        (amount, Decimal::ZERO)
    }
}

/// Running balance information for a ledger entry.
///
/// - `position`: 1-based index in the entity's ordered history
/// - `previous_balance`: balance before this entry
/// - `current_balance`: balance after this entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningBalance {
    /// Position in the ordered history (starts at 1).
    pub position: i64,
    /// Balance before this entry.
    pub previous_balance: Decimal,
    /// Balance after this entry.
    pub current_balance: Decimal,
}

impl RunningBalance {
    /// Creates the running balance for the first entry on an entity.
    #[must_use]
    pub fn first_entry(balance_change: Decimal) -> Self {
        Self {
            position: 1,
            previous_balance: Decimal::ZERO,
            current_balance: balance_change,
        }
    }

    /// Creates the running balance following `previous`.
    ///
    /// `current[N] = previous[N] + change` and `previous[N] = current[N-1]`.
    #[must_use]
    pub fn next_entry(previous: &Self, balance_change: Decimal) -> Self {
        Self {
            position: previous.position + 1,
            previous_balance: previous.current_balance,
            current_balance: previous.current_balance.saturating_add(balance_change),
        }
    }
}

/// Totals implied by an entity's entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayTotals {
    /// Σ(increase − decrease).
    pub balance: Decimal,
    /// Σ(secondary_increase − secondary_decrease).
    pub secondary_balance: Decimal,
    /// Σ increase.
    pub lifetime_increase: Decimal,
    /// Σ decrease.
    pub lifetime_decrease: Decimal,
    /// Number of entries replayed.
    pub entry_count: usize,
    /// Number of entries whose stored snapshot was rewritten.
    pub rewritten: usize,
}

/// Sorts `entries` by `(occurred_at, created_at, sequence)` and overwrites
/// each running-balance snapshot with the raw prefix sum.
///
/// Magnitudes are never touched. Running the replay twice yields the same
/// snapshots, so `rewritten` is zero on the second pass.
pub fn replay_running_balances(entries: &mut [LedgerEntry]) -> ReplayTotals {
    entries.sort_by_key(LedgerEntry::order_key);

    let mut totals = ReplayTotals::default();
    let mut running: Option<RunningBalance> = None;

    for entry in entries.iter_mut() {
        let next = match &running {
            None => RunningBalance::first_entry(entry.net()),
            Some(previous) => RunningBalance::next_entry(previous, entry.net()),
        };
        totals.secondary_balance = totals.secondary_balance.saturating_add(entry.secondary_net());
        totals.lifetime_increase = totals.lifetime_increase.saturating_add(entry.increase);
        totals.lifetime_decrease = totals.lifetime_decrease.saturating_add(entry.decrease);

        if entry.balance_before != next.previous_balance
            || entry.running_balance != next.current_balance
            || entry.secondary_running_balance != totals.secondary_balance
        {
            entry.balance_before = next.previous_balance;
            entry.running_balance = next.current_balance;
            entry.secondary_running_balance = totals.secondary_balance;
            totals.rewritten += 1;
        }

        running = Some(next);
    }

    totals.balance = running.map_or(Decimal::ZERO, |rb| rb.current_balance);
    totals.entry_count = entries.len();
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::EntryKind;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tallyhall_shared::types::{EntityId, LedgerEntryId};

    fn entry(seq: i64, minutes: i64, increase: Decimal, decrease: Decimal) -> LedgerEntry {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        LedgerEntry {
            id: LedgerEntryId::new(),
            entity_id: EntityId::new(),
            kind: EntryKind::Manual,
            increase,
            decrease,
            secondary_increase: Decimal::ZERO,
            secondary_decrease: Decimal::ZERO,
            source: None,
            description: String::new(),
            occurred_at: base + Duration::minutes(minutes),
            created_at: base,
            sequence: seq,
            balance_before: Decimal::ZERO,
            running_balance: Decimal::ZERO,
            secondary_running_balance: Decimal::ZERO,
        }
    }

    #[test]
    fn test_floor_clamps_to_zero() {
        let applied = apply_delta(dec!(5), dec!(-1000), FloorPolicy::FloorAtZero);
        assert_eq!(applied.after, dec!(0));
        assert_eq!(applied.decrease, dec!(5));
        assert_eq!(applied.increase, dec!(0));
        assert!(applied.was_clamped(dec!(-1000)));
    }

    #[test]
    fn test_signed_goes_negative() {
        let applied = apply_delta(dec!(100), dec!(-250), FloorPolicy::Signed);
        assert_eq!(applied.after, dec!(-150));
        assert_eq!(applied.decrease, dec!(250));
        assert!(!applied.was_clamped(dec!(-250)));
    }

    #[test]
    fn test_overflow_saturates() {
        let applied = apply_delta(Decimal::MAX, dec!(1), FloorPolicy::Signed);
        assert_eq!(applied.after, Decimal::MAX);
        assert_eq!(applied.increase, dec!(0));

        let applied = apply_delta(Decimal::MIN, dec!(-1), FloorPolicy::Signed);
        assert_eq!(applied.after, Decimal::MIN);
    }

    #[test]
    fn test_zero_delta_on_empty_stock() {
        let applied = apply_delta(dec!(0), dec!(-3), FloorPolicy::FloorAtZero);
        assert_eq!(applied.after, dec!(0));
        assert_eq!(applied.increase, dec!(0));
        assert_eq!(applied.decrease, dec!(0));
    }

    #[test]
    fn test_split_signed() {
        assert_eq!(split_signed(dec!(7)), (dec!(7), dec!(0)));
        assert_eq!(split_signed(dec!(-7)), (dec!(0), dec!(7)));
        assert_eq!(split_signed(dec!(0)), (dec!(0), dec!(0)));
    }

    #[test]
    fn test_running_balance_chain() {
        let rb1 = RunningBalance::first_entry(dec!(100));
        assert_eq!(rb1.position, 1);
        assert_eq!(rb1.current_balance, dec!(100));

        let rb2 = RunningBalance::next_entry(&rb1, dec!(50));
        assert_eq!(rb2.position, 2);
        assert_eq!(rb2.previous_balance, dec!(100));
        assert_eq!(rb2.current_balance, dec!(150));

        let rb3 = RunningBalance::next_entry(&rb2, dec!(-30));
        assert_eq!(rb3.previous_balance, dec!(150));
        assert_eq!(rb3.current_balance, dec!(120));
    }

    #[test]
    fn test_replay_orders_by_occurred_at_then_sequence() {
        // Inserted out of event order: the backdated entry must come first.
        let mut entries = vec![
            entry(1, 10, dec!(10), dec!(0)),
            entry(2, 20, dec!(0), dec!(4)),
            entry(3, 0, dec!(5), dec!(0)),
        ];

        let totals = replay_running_balances(&mut entries);

        assert_eq!(entries[0].sequence, 3);
        assert_eq!(entries[0].running_balance, dec!(5));
        assert_eq!(entries[1].balance_before, dec!(5));
        assert_eq!(entries[1].running_balance, dec!(15));
        assert_eq!(entries[2].running_balance, dec!(11));
        assert_eq!(totals.balance, dec!(11));
        assert_eq!(totals.lifetime_increase, dec!(15));
        assert_eq!(totals.lifetime_decrease, dec!(4));
        assert_eq!(totals.entry_count, 3);
        assert_eq!(totals.rewritten, 3);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut entries = vec![entry(1, 0, dec!(3), dec!(0)), entry(2, 1, dec!(0), dec!(1))];
        replay_running_balances(&mut entries);
        let snapshot = entries.clone();

        let totals = replay_running_balances(&mut entries);

        assert_eq!(totals.rewritten, 0);
        assert_eq!(entries, snapshot);
    }

    #[test]
    fn test_replay_empty() {
        let totals = replay_running_balances(&mut []);
        assert_eq!(totals, ReplayTotals::default());
    }
}
