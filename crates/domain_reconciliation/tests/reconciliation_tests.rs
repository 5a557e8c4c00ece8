//! Tests for domain_reconciliation: ledger eligibility and the matching workflow

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

use core_kernel::{Money, PartnerType, PaymentKind, Timezone};
use domain_ledger::chart::standard_chart;
use domain_ledger::{post_entry, EntryTemplates, GlAccount, JournalEntry, NewJournalEntry};
use domain_reconciliation::matcher::linked_entries;
use domain_reconciliation::{
    auto_match, eligible_transactions, ledger_balance, MatchStatus, MatchTolerance, ReconciliationRecord,
    ReconciliationStatus, ReconciliationType, StatementLine,
};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
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

fn post(accounts: &mut [GlAccount], request: NewJournalEntry, seq: u64) -> JournalEntry {
    let when = request.entry_date;
    let resolved: Vec<GlAccount> = request
        .lines
        .iter()
        .map(|l| accounts.iter().find(|a| a.code == l.account_code).cloned().unwrap())
        .collect();
    let mut entry = JournalEntry::draft(format!("JE-202403-{:06}", seq), request, &resolved, when).unwrap();
    entry.submit(when).unwrap();
    entry.approve("system", when).unwrap();
    post_entry(&mut entry, accounts, when).unwrap();
    entry
}

fn receipt(total: i64, fee: i64, when: DateTime<Utc>) -> NewJournalEntry {
    EntryTemplates::payment_receipt(
        PaymentKind::Daily,
        Money::from_cents(total),
        Money::from_cents(total - fee),
        Money::from_cents(fee),
        when,
        "system",
    )
    .unwrap()
}

fn line(reference: &str, cents: i64, day: u32) -> StatementLine {
    StatementLine {
        reference: reference.to_string(),
        amount: Money::from_cents(cents),
        date: date(day),
    }
}

// ============================================================================
// Eligibility
// ============================================================================

mod eligibility_tests {
    use super::*;

    #[test]
    fn test_daily_window_selects_receipts_of_the_business_day() {
        let tz = Timezone::default();
        let mut accounts = chart();
        // 22:30 UTC on the 4th is already the 5th in Nairobi
        let entries = vec![
            post(&mut accounts, receipt(8_700, 300, at(4, 9)), 1),
            post(&mut accounts, receipt(5_300, 300, Utc.with_ymd_and_hms(2024, 3, 4, 22, 30, 0).unwrap()), 2),
            post(&mut accounts, EntryTemplates::fee_distribution(PartnerType::Kba, Money::from_cents(100), at(4, 10), "ops"), 3),
        ];

        let window = ReconciliationType::DailyMpesa.window(date(4), &tz).unwrap();
        let eligible = eligible_transactions(ReconciliationType::DailyMpesa, window, &entries, &tz).unwrap();

        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].amount, Money::from_cents(8_700));
        assert_eq!(ledger_balance(&eligible).unwrap(), Money::from_cents(8_700));
    }

    #[test]
    fn test_outflows_are_negative_and_reversed_entries_excluded() {
        let tz = Timezone::default();
        let mut accounts = chart();
        let mut reversed = post(&mut accounts, receipt(8_700, 300, at(6, 9)), 1);
        let reversal = post(&mut accounts, reversed.reversal_request("duplicate", "ops", at(6, 10)).unwrap(), 2);
        domain_ledger::link_reversal(&mut reversed, &reversal, "ops", "duplicate", at(6, 10)).unwrap();
        let remit = post(&mut accounts, EntryTemplates::remittance(Money::from_cents(50_000), at(7, 9), "ops"), 3);

        let window = ReconciliationType::MonthlyBank.window(date(15), &tz).unwrap();
        let entries = vec![reversed, reversal, remit];
        let eligible = eligible_transactions(ReconciliationType::MonthlyBank, window, &entries, &tz).unwrap();

        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].amount, Money::from_cents(-50_000));
    }
}

// ============================================================================
// Workflow
// ============================================================================

mod workflow_tests {
    use super::*;

    #[test]
    fn test_daily_reconciliation_to_resolution() {
        let tz = Timezone::default();
        let mut accounts = chart();
        let entries = vec![
            post(&mut accounts, receipt(104_800, 3_000, at(4, 8)), 1),
            post(&mut accounts, receipt(8_700, 300, at(4, 9)), 2),
        ];

        let mut record = ReconciliationRecord::new(ReconciliationType::DailyMpesa, date(4), "M-Pesa paybill", "ops", at(5, 6)).unwrap();
        let mut items = record
            .ingest(&[line("QB1", 104_800, 4), line("QB2", 8_700, 4), line("QB3", 450, 4)], at(5, 6))
            .unwrap();

        let window = ReconciliationType::DailyMpesa.window(date(4), &tz).unwrap();
        let candidates = eligible_transactions(ReconciliationType::DailyMpesa, window, &entries, &tz).unwrap();
        let ledger = ledger_balance(&candidates).unwrap();

        for proposal in auto_match(&items, &candidates, &linked_entries(&items, None), &MatchTolerance::default()) {
            let item = items.iter_mut().find(|i| i.id == proposal.item_id).unwrap();
            item.auto_match(proposal.entry_id, at(5, 7)).unwrap();
        }
        record.refresh(&items, ledger, at(5, 7)).unwrap();

        assert_eq!(record.status, ReconciliationStatus::PartiallyResolved);
        assert_eq!(record.auto_matched_items, 2);
        assert_eq!(record.variance, Money::from_cents(450));

        items[2].resolve_without_match("ops", "paybill test transaction", at(5, 8)).unwrap();
        record.refresh(&items, ledger, at(5, 8)).unwrap();
        assert_eq!(record.status, ReconciliationStatus::Matched);
        assert!(record.is_fully_matched());

        // Matched but the statement still carries 450 the ledger does not
        assert!(record.close("ops", None, at(5, 9)).is_err());
        assert_eq!(items[2].match_status, MatchStatus::ResolvedNoMatch);
    }

    #[test]
    fn test_ambiguous_items_stay_unmatched() {
        let tz = Timezone::default();
        let mut accounts = chart();
        let entries = vec![post(&mut accounts, receipt(1_000, 300, at(4, 9)), 1)];

        let mut record = ReconciliationRecord::new(ReconciliationType::DailyMpesa, date(4), "M-Pesa", "ops", at(5, 6)).unwrap();
        let items = record.ingest(&[line("QC1", 1_000, 4), line("QC2", 1_000, 4)], at(5, 6)).unwrap();

        let window = ReconciliationType::DailyMpesa.window(date(4), &tz).unwrap();
        let candidates = eligible_transactions(ReconciliationType::DailyMpesa, window, &entries, &tz).unwrap();
        let proposals = auto_match(&items, &candidates, &HashSet::new(), &MatchTolerance::default());

        assert!(proposals.is_empty());
        record.refresh(&items, ledger_balance(&candidates).unwrap(), at(5, 7)).unwrap();
        assert_eq!(record.status, ReconciliationStatus::Unmatched);
        assert_eq!(record.unmatched_items, 2);
    }
}

proptest! {
    /// Counters always partition the items
    #[test]
    fn prop_counters_partition_items(actions in prop::collection::vec(0u8..3, 1..30)) {
        let mut record = ReconciliationRecord::new(ReconciliationType::MonthlyBank, date(1), "Bank", "ops", at(1, 0)).unwrap();
        let lines: Vec<StatementLine> = (0..actions.len()).map(|i| line(&format!("B{}", i), 100, 2)).collect();
        let mut items = record.ingest(&lines, at(1, 1)).unwrap();

        for (item, action) in items.iter_mut().zip(&actions) {
            match action {
                0 => {}
                1 => item.manual_match(core_kernel::JournalEntryId::new(), "ops", None, at(2, 0)).unwrap(),
                _ => item.resolve_without_match("ops", "noise", at(2, 0)).unwrap(),
            }
        }
        record.refresh(&items, Money::ZERO, at(3, 0)).unwrap();

        prop_assert_eq!(record.total_items as usize, items.len());
        prop_assert_eq!(
            record.matched_items + record.unmatched_items + record.resolved_no_match_items,
            record.total_items
        );
        prop_assert_eq!(record.is_fully_matched(), record.unmatched_items == 0);
    }
}
