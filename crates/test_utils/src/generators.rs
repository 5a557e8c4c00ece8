//! Property-Based Test Generators
//!
//! Proptest strategies that produce data respecting the ledger's
//! invariants: cents are non-negative, payments cover their fee, and fee
//! share schedules sum to the whole fee.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use core_kernel::{Money, PaymentCompleted, PaymentKind, RiderId, TransactionId};
use proptest::prelude::*;

use crate::fixtures::TemporalFixtures;

/// Positive amounts up to KES 1,000,000
pub fn positive_cents_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    positive_cents_strategy().prop_map(Money::from_cents)
}

/// Non-negative amounts, zero included
pub fn money_strategy() -> impl Strategy<Value = Money> {
    (0i64..100_000_000i64).prop_map(Money::from_cents)
}

/// Four basis-point shares summing to 10,000
pub fn bps_schedule_strategy() -> impl Strategy<Value = [u32; 4]> {
    (0u32..=10_000, 0u32..=10_000, 0u32..=10_000).prop_map(|(a, b, c)| {
        let mut cuts = [a, b, c];
        cuts.sort_unstable();
        [cuts[0], cuts[1] - cuts[0], cuts[2] - cuts[1], 10_000 - cuts[2]]
    })
}

/// Balanced line amounts: `(debits, credits)` with equal sums
pub fn balanced_lines_strategy() -> impl Strategy<Value = (Vec<Money>, Vec<Money>)> {
    prop::collection::vec(1i64..1_000_000i64, 1..5).prop_flat_map(|debits| {
        let total: i64 = debits.iter().sum();
        (Just(debits), 1usize..4).prop_map(move |(debits, parts)| {
            let credits = Money::from_cents(total).allocate(parts as u32).unwrap_or_default();
            (debits.into_iter().map(Money::from_cents).collect(), credits)
        })
    })
}

/// Instants spread over the business month
pub fn business_month_instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    let start = TemporalFixtures::business_month().start;
    (0i64..(28 * 24 * 60)).prop_map(move |minutes| start + Duration::minutes(minutes))
}

/// Business dates in the month of the business date
pub fn business_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1u32..=28).prop_map(|day| TemporalFixtures::date(2024, 3, day))
}

/// Payments of either kind, always covering their service fee
///
/// `deposit_fee` and `daily_fee` are in cents.
pub fn payment_strategy(deposit_fee: i64, daily_fee: i64) -> impl Strategy<Value = PaymentCompleted> {
    (any::<bool>(), 0i64..10_000_000, business_month_instant_strategy()).prop_map(move |(deposit, premium, at)| {
        let (kind, fee) = if deposit {
            (PaymentKind::Deposit, deposit_fee)
        } else {
            (PaymentKind::Daily, daily_fee)
        };
        PaymentCompleted {
            transaction_id: TransactionId::new(),
            rider_id: RiderId::new(),
            amount: Money::from_cents(premium + fee),
            payment_kind: kind,
            receipt_reference: format!("QK{:08}", premium % 100_000_000),
            completed_at: at,
            payment_day: None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_bps_schedule_sums_to_whole(schedule in bps_schedule_strategy()) {
            prop_assert_eq!(schedule.iter().sum::<u32>(), 10_000);
        }

        #[test]
        fn test_balanced_lines_balance((debits, credits) in balanced_lines_strategy()) {
            let d = Money::checked_sum(debits).unwrap();
            let c = Money::checked_sum(credits).unwrap();
            prop_assert_eq!(d, c);
        }

        #[test]
        fn test_payments_cover_fee(payment in payment_strategy(3_000, 300)) {
            prop_assert!(payment.amount.cents() >= 300);
        }
    }
}
