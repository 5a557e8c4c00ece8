//! Tests for domain_settlement: fee-share conservation and line selection

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use core_kernel::{JournalEntryId, Money, PartnerType, PaymentKind, Period, RiderId, TransactionId};
use domain_escrow::{EscrowRecord, PaymentSplit};
use domain_ledger::chart::standard_chart;
use domain_ledger::{post_entry, EntryTemplates, GlAccount, JournalEntry, NewJournalEntry};
use domain_settlement::{FeeShareSchedule, SettlementCalculator, SettlementLineKind};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn march() -> Period {
    Period::new(at(1, 0), Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()).unwrap()
}

fn chart() -> Vec<GlAccount> {
    let mut accounts: Vec<GlAccount> = Vec::new();
    for request in standard_chart() {
        let parent = request
            .parent_code
            .as_ref()
            .and_then(|code| accounts.iter().find(|a| &a.code == code))
            .map(|a| a.id);
        accounts.push(GlAccount::open(request, parent, at(1, 0)).unwrap());
    }
    accounts
}

fn draft(accounts: &[GlAccount], request: NewJournalEntry, seq: u64) -> JournalEntry {
    let when = request.entry_date;
    let resolved: Vec<GlAccount> = request
        .lines
        .iter()
        .map(|l| accounts.iter().find(|a| a.code == l.account_code).cloned().unwrap())
        .collect();
    JournalEntry::draft(format!("JE-202403-{:06}", seq), request, &resolved, when).unwrap()
}

fn post(accounts: &mut [GlAccount], request: NewJournalEntry, seq: u64) -> JournalEntry {
    let mut entry = draft(accounts, request, seq);
    let when = entry.entry_date;
    entry.submit(when).unwrap();
    entry.approve("system", when).unwrap();
    post_entry(&mut entry, accounts, when).unwrap();
    entry
}

/// A daily payment: posted receipt plus its escrow record
fn daily_payment(accounts: &mut [GlAccount], day: u32, seq: u64) -> (JournalEntry, EscrowRecord) {
    let split = PaymentSplit::from_total(Money::from_cents(8_700), Money::from_cents(300)).unwrap();
    let receipt = post(
        accounts,
        EntryTemplates::payment_receipt(PaymentKind::Daily, split.total, split.premium, split.service_fee, at(day, 9), "system")
            .unwrap(),
        seq,
    );
    let record = EscrowRecord::record(RiderId::new(), TransactionId::new(), 2, split, Some(receipt.id), at(day, 9)).unwrap();
    (receipt, record)
}

mod calculator_tests {
    use super::*;

    #[test]
    fn test_fee_lines_follow_posted_receipts() {
        let mut accounts = chart();
        let calculator = SettlementCalculator::new(FeeShareSchedule::default()).unwrap();

        let (r1, e1) = daily_payment(&mut accounts, 4, 1);
        let (r2, e2) = daily_payment(&mut accounts, 5, 2);
        // A receipt still awaiting approval does not count
        let pending = draft(
            &accounts,
            EntryTemplates::payment_receipt(
                PaymentKind::Daily,
                Money::from_cents(8_700),
                Money::from_cents(8_400),
                Money::from_cents(300),
                at(6, 9),
                "system",
            )
            .unwrap(),
            3,
        );
        let e3 = EscrowRecord::record(
            RiderId::new(),
            TransactionId::new(),
            3,
            PaymentSplit::from_total(Money::from_cents(8_700), Money::from_cents(300)).unwrap(),
            Some(pending.id),
            at(6, 9),
        )
        .unwrap();
        // Refunded payment: its fee went back to the rider
        let (r4, mut e4) = daily_payment(&mut accounts, 7, 4);
        e4.refund("RF-1", at(7, 12)).unwrap();

        let entries = vec![r1, r2, pending, r4];
        let records = vec![e1.clone(), e2, e3, e4];
        let lines = calculator.service_fee_lines(PartnerType::Kba, march(), &records, &entries).unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.amount == Money::from_cents(60)));
        assert_eq!(lines[0].escrow_record_id, Some(e1.id));
        assert_eq!(lines[0].rider_id, Some(e1.rider_id));
    }

    #[test]
    fn test_commission_lines_skip_reversed_and_other_partners() {
        let mut accounts = chart();
        let calculator = SettlementCalculator::new(FeeShareSchedule::default()).unwrap();

        let kept = post(&mut accounts, EntryTemplates::commission(PartnerType::RobsInsurance, Money::from_cents(5_000), at(10, 9), "ops"), 1);
        let other = post(&mut accounts, EntryTemplates::commission(PartnerType::Kba, Money::from_cents(700), at(10, 9), "ops"), 2);
        let mut wrong = post(&mut accounts, EntryTemplates::commission(PartnerType::RobsInsurance, Money::from_cents(900), at(11, 9), "ops"), 3);
        let reversal = post(&mut accounts, wrong.reversal_request("duplicate", "ops", at(11, 10)).unwrap(), 4);
        domain_ledger::link_reversal(&mut wrong, &reversal, "ops", "duplicate", at(11, 10)).unwrap();
        let april = post(
            &mut accounts,
            EntryTemplates::commission(PartnerType::RobsInsurance, Money::from_cents(1_100), Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap(), "ops"),
            5,
        );

        let entries = vec![kept.clone(), other, wrong, reversal, april];
        let lines = calculator.commission_lines(PartnerType::RobsInsurance, march(), &entries);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, SettlementLineKind::Commission);
        assert_eq!(lines[0].amount, Money::from_cents(5_000));
        assert_eq!(lines[0].journal_entry_id, Some(kept.id));
    }

    #[test]
    fn test_missing_receipt_link_is_skipped() {
        let calculator = SettlementCalculator::new(FeeShareSchedule::default()).unwrap();
        let split = PaymentSplit::from_total(Money::from_cents(8_700), Money::from_cents(300)).unwrap();
        let orphan = EscrowRecord::record(RiderId::new(), TransactionId::new(), 2, split, Some(JournalEntryId::new()), at(4, 9)).unwrap();
        let lines = calculator.service_fee_lines(PartnerType::Atronach, march(), &[orphan], &[]).unwrap();
        assert!(lines.is_empty());
    }
}

fn schedule_strategy() -> impl Strategy<Value = FeeShareSchedule> {
    (0u32..=10_000, 0u32..=10_000, 0u32..=10_000).prop_map(|(a, b, c)| {
        let mut cuts = [a, b, c];
        cuts.sort_unstable();
        FeeShareSchedule::new(cuts[0], cuts[1] - cuts[0], cuts[2] - cuts[1], 10_000 - cuts[2]).unwrap()
    })
}

proptest! {
    /// Partner shares of one fee always add back up to the fee
    #[test]
    fn prop_shares_conserve_fee(schedule in schedule_strategy(), fee in 0i64..10_000_000) {
        let fee = Money::from_cents(fee);
        let parts = schedule.split(fee).unwrap();
        let total = Money::checked_sum(parts.iter().map(|(_, m)| *m)).unwrap();
        prop_assert_eq!(total, fee);
        prop_assert!(parts.iter().all(|(_, m)| !m.is_negative()));
    }
}
