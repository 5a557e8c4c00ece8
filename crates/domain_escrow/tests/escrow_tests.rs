//! Escrow conservation and batch total properties

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;

use core_kernel::{Money, RiderId, TransactionId};
use domain_escrow::{
    batch_sequence_key, format_batch_number, BatchType, EscrowRecord, PaymentSplit, RemittanceBatch,
    RemittanceStatus,
};

fn open_batch() -> RemittanceBatch {
    let date = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
    let key = batch_sequence_key(BatchType::MonthlyBulk, date);
    RemittanceBatch::open(BatchType::MonthlyBulk, date, format_batch_number(&key, 1), "scheduler", Utc::now())
}

proptest! {
    /// premium + fee always equals the payment, whatever the amounts
    #[test]
    fn prop_split_conserves_payment(total in 301i64..10_000_000, fee in 0i64..300) {
        let split = PaymentSplit::from_total(Money::from_cents(total), Money::from_cents(fee)).unwrap();
        let record = EscrowRecord::record(RiderId::new(), TransactionId::new(), 2, split, None, Utc::now()).unwrap();
        prop_assert_eq!(record.payment_total().unwrap(), Money::from_cents(total));
    }

    /// Batch totals equal the sum over current members after any refunds
    #[test]
    fn prop_batch_totals_track_members(
        premiums in prop::collection::vec(1i64..500_000, 1..30),
        refund_mask in prop::collection::vec(any::<bool>(), 30),
    ) {
        let mut batch = open_batch();
        let mut records: Vec<EscrowRecord> = premiums
            .iter()
            .map(|p| {
                let split = PaymentSplit::from_total(Money::from_cents(p + 300), Money::from_cents(300)).unwrap();
                EscrowRecord::record(RiderId::new(), TransactionId::new(), 5, split, None, Utc::now()).unwrap()
            })
            .collect();

        for record in records.iter_mut() {
            record.schedule(batch.id, Utc::now()).unwrap();
        }
        for (record, refund) in records.iter_mut().zip(&refund_mask) {
            if *refund {
                record.refund("RF", Utc::now()).unwrap();
            }
        }
        batch.recompute_totals(&records, Utc::now()).unwrap();

        let members: Vec<&EscrowRecord> = records
            .iter()
            .filter(|r| r.status == RemittanceStatus::Scheduled)
            .collect();
        let expected = Money::checked_sum(members.iter().map(|r| r.premium_amount)).unwrap();
        prop_assert_eq!(batch.total_premium_amount, expected);
        prop_assert_eq!(batch.total_records as usize, members.len());
        prop_assert_eq!(batch.can_be_approved(), !members.is_empty());
    }
}

#[test]
fn test_batch_numbers_sort_by_date() {
    let earlier = format_batch_number(&batch_sequence_key(BatchType::MonthlyBulk, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()), 7);
    let later = format_batch_number(&batch_sequence_key(BatchType::Day1Immediate, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()), 1);
    assert!(earlier < later);
}
