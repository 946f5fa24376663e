//! Property-based tests for balance arithmetic and running-balance replay.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tallyhall_shared::types::{EntityId, LedgerEntryId};

use super::balance::{apply_delta, replay_running_balances};
use super::types::{EntryKind, FloorPolicy, LedgerEntry};

/// Strategy for generating signed deltas with two decimal places.
fn delta_strategy() -> impl Strategy<Value = Decimal> {
    (-100_000i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Strategy for generating non-negative balances.
fn stock_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Strategy for generating a shuffled entry history as (minute offset, net).
fn history_strategy(max_len: usize) -> impl Strategy<Value = Vec<(i64, Decimal)>> {
    prop::collection::vec((0i64..500, delta_strategy()), 1..=max_len)
}

fn build_entries(history: &[(i64, Decimal)]) -> Vec<LedgerEntry> {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let entity_id = EntityId::new();
    history
        .iter()
        .enumerate()
        .map(|(i, (minutes, net))| {
            let (increase, decrease) = super::balance::split_signed(*net);
            LedgerEntry {
                id: LedgerEntryId::new(),
                entity_id,
                kind: EntryKind::Manual,
                increase,
                decrease,
                secondary_increase: Decimal::ZERO,
                secondary_decrease: Decimal::ZERO,
                source: None,
                description: String::new(),
                occurred_at: base + Duration::minutes(*minutes),
                created_at: base,
                sequence: i64::try_from(i).unwrap_or(i64::MAX),
                balance_before: Decimal::ZERO,
                running_balance: Decimal::ZERO,
                secondary_running_balance: Decimal::ZERO,
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// **Floor: stock never goes negative**
    ///
    /// *For any* stock balance and delta, the new balance SHALL be
    /// `max(0, current + delta)`.
    #[test]
    fn prop_stock_floor_never_negative(
        current in stock_strategy(),
        delta in delta_strategy(),
    ) {
        let applied = apply_delta(current, delta, FloorPolicy::FloorAtZero);
        prop_assert!(applied.after >= Decimal::ZERO);
        prop_assert_eq!(applied.after, (current + delta).max(Decimal::ZERO));
    }

    /// **Recorded magnitudes equal the actual change**
    ///
    /// *For any* policy, `before + increase - decrease` SHALL equal `after`,
    /// and at most one of the two magnitudes is non-zero.
    #[test]
    fn prop_recorded_change_matches_after(
        current in delta_strategy(),
        delta in delta_strategy(),
        floored in any::<bool>(),
    ) {
        let policy = if floored { FloorPolicy::FloorAtZero } else { FloorPolicy::Signed };
        let current = if floored { current.abs() } else { current };
        let applied = apply_delta(current, delta, policy);

        prop_assert_eq!(applied.before + applied.increase - applied.decrease, applied.after);
        prop_assert!(applied.increase.is_zero() || applied.decrease.is_zero());
        prop_assert!(applied.increase >= Decimal::ZERO);
        prop_assert!(applied.decrease >= Decimal::ZERO);
    }

    /// **Signed balances are never clamped**
    #[test]
    fn prop_signed_applies_full_delta(
        current in delta_strategy(),
        delta in delta_strategy(),
    ) {
        let applied = apply_delta(current, delta, FloorPolicy::Signed);
        prop_assert_eq!(applied.after, current + delta);
        prop_assert!(!applied.was_clamped(delta));
    }

    /// **Replay final balance equals the sum of nets**
    ///
    /// *For any* history, the last running balance SHALL equal
    /// Σ(increase − decrease) regardless of insertion order.
    #[test]
    fn prop_replay_final_equals_sum(history in history_strategy(30)) {
        let mut entries = build_entries(&history);
        let expected: Decimal = history.iter().map(|(_, net)| *net).sum();

        let totals = replay_running_balances(&mut entries);

        prop_assert_eq!(totals.balance, expected);
        let last = entries.last().map(|e| e.running_balance);
        prop_assert_eq!(last, Some(expected));
    }

    /// **Replay chain is consistent**
    ///
    /// `balance_before[N] = running_balance[N-1]` and
    /// `running_balance[N] = balance_before[N] + net[N]`.
    #[test]
    fn prop_replay_chain_consistent(history in history_strategy(30)) {
        let mut entries = build_entries(&history);
        replay_running_balances(&mut entries);

        prop_assert_eq!(entries[0].balance_before, Decimal::ZERO);
        for pair in entries.windows(2) {
            prop_assert!(pair[0].order_key() <= pair[1].order_key());
            prop_assert_eq!(pair[1].balance_before, pair[0].running_balance);
        }
        for entry in &entries {
            prop_assert_eq!(entry.running_balance, entry.balance_before + entry.net());
        }
    }

    /// **Replay is idempotent**
    #[test]
    fn prop_replay_idempotent(history in history_strategy(20)) {
        let mut entries = build_entries(&history);
        replay_running_balances(&mut entries);
        let first = entries.clone();

        let totals = replay_running_balances(&mut entries);

        prop_assert_eq!(totals.rewritten, 0);
        prop_assert_eq!(entries, first);
    }
}
