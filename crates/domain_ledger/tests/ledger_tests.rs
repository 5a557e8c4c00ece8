//! Tests for domain_ledger: posting invariants, reversals and reports

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use core_kernel::{Money, PartnerType, PaymentKind, Period};

use domain_ledger::account::{AccountType, GlAccount, NewAccount};
use domain_ledger::chart::{codes, standard_chart};
use domain_ledger::entry::{EntryStatus, JournalEntry, NewJournalEntry};
use domain_ledger::posting::{link_reversal, post_entry};
use domain_ledger::reports::{balance_sheet, cash_flow, income_statement, trial_balance};
use domain_ledger::templates::EntryTemplates;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

/// Opens the standard chart, resolving parents by code
fn open_chart() -> Vec<GlAccount> {
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

fn resolve(accounts: &[GlAccount], request: &NewJournalEntry) -> Vec<GlAccount> {
    request
        .lines
        .iter()
        .map(|l| accounts.iter().find(|a| a.code == l.account_code).cloned().unwrap())
        .collect()
}

/// Creates, approves and posts an entry against the chart
fn post(accounts: &mut [GlAccount], request: NewJournalEntry, seq: u64) -> JournalEntry {
    let when = request.entry_date;
    let resolved = resolve(accounts, &request);
    let mut entry = JournalEntry::draft(format!("JE-202403-{:06}", seq), request, &resolved, when).unwrap();
    entry.submit(when).unwrap();
    entry.approve("system", when).unwrap();
    post_entry(&mut entry, accounts, when).unwrap();
    entry
}

fn balance(accounts: &[GlAccount], code: &str) -> Money {
    accounts.iter().find(|a| a.code == code).unwrap().balance()
}

// ============================================================================
// Posting Tests
// ============================================================================

mod posting_tests {
    use super::*;

    #[test]
    fn test_deposit_scenario() {
        let mut accounts = open_chart();
        let request = EntryTemplates::payment_receipt(
            PaymentKind::Deposit,
            Money::from_cents(104_800),
            Money::from_cents(101_800),
            Money::from_cents(3_000),
            at(4, 9),
            "system",
        )
        .unwrap();

        let entry = post(&mut accounts, request, 1);

        assert_eq!(entry.status, EntryStatus::Posted);
        assert_eq!(balance(&accounts, codes::ESCROW_BANK), Money::from_cents(104_800));
        assert_eq!(balance(&accounts, codes::PREMIUM_PAYABLE), Money::from_cents(101_800));
        assert_eq!(balance(&accounts, codes::SERVICE_FEE_PAYABLE), Money::from_cents(3_000));
    }

    #[test]
    fn test_same_account_on_two_lines() {
        let mut accounts = open_chart();
        let request = NewJournalEntry::new(domain_ledger::EntryType::Adjustment, at(4, 9), "Split", "ops")
            .debit(codes::ESCROW_BANK, Money::from_cents(100))
            .debit(codes::ESCROW_BANK, Money::from_cents(50))
            .credit(codes::RETAINED_EARNINGS, Money::from_cents(150));

        post(&mut accounts, request, 1);

        assert_eq!(balance(&accounts, codes::ESCROW_BANK), Money::from_cents(150));
        assert_eq!(balance(&accounts, codes::RETAINED_EARNINGS), Money::from_cents(150));
    }

    #[test]
    fn test_reversal_round_trip() {
        let mut accounts = open_chart();
        let before: Vec<Money> = accounts.iter().map(|a| a.balance()).collect();

        let request = EntryTemplates::fee_distribution(PartnerType::Kba, Money::from_cents(750), at(5, 9), "ops");
        let mut original = post(&mut accounts, request, 1);

        let reversal_request = original.reversal_request("wrong partner", "ops", at(5, 10)).unwrap();
        let reversal = post(&mut accounts, reversal_request, 2);
        link_reversal(&mut original, &reversal, "ops", "wrong partner", at(5, 10)).unwrap();

        let after: Vec<Money> = accounts.iter().map(|a| a.balance()).collect();
        assert_eq!(before, after);
        assert_eq!(original.status, EntryStatus::Reversed);
        assert_eq!(reversal.entry_type, original.entry_type);
        for (o, r) in original.lines.iter().zip(&reversal.lines) {
            assert_eq!(o.account_id, r.account_id);
            assert_eq!(o.debit, r.credit);
            assert_eq!(o.credit, r.debit);
        }
    }
}

// ============================================================================
// Report Tests
// ============================================================================

mod report_tests {
    use super::*;

    fn seeded() -> (Vec<GlAccount>, Vec<JournalEntry>) {
        let mut accounts = open_chart();
        let mut entries = Vec::new();
        let mut seq = 0;
        let mut next = || {
            seq += 1;
            seq
        };

        let deposit = EntryTemplates::payment_receipt(
            PaymentKind::Deposit,
            Money::from_cents(104_800),
            Money::from_cents(101_800),
            Money::from_cents(3_000),
            at(2, 9),
            "system",
        )
        .unwrap();
        entries.push(post(&mut accounts, deposit, next()));

        let daily = EntryTemplates::payment_receipt(
            PaymentKind::Daily,
            Money::from_cents(8_700),
            Money::from_cents(8_400),
            Money::from_cents(300),
            at(10, 9),
            "system",
        )
        .unwrap();
        entries.push(post(&mut accounts, daily, next()));

        let fee = EntryTemplates::fee_distribution(PartnerType::Atronach, Money::from_cents(1_000), at(12, 9), "ops");
        entries.push(post(&mut accounts, fee, next()));

        let remit = EntryTemplates::remittance(Money::from_cents(101_800), at(20, 9), "ops");
        entries.push(post(&mut accounts, remit, next()));

        (accounts, entries)
    }

    #[test]
    fn test_trial_balance_is_balanced() {
        let (accounts, _) = seeded();
        let tb = trial_balance(&accounts, at(25, 0)).unwrap();

        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits.minor, tb.total_credits.minor);
        // bank 11,700 Dr; premium payable 8,400 + fee payable 2,300 + income 1,000 Cr
        assert_eq!(tb.total_debits.minor, 11_700);
        assert!(tb.rows.iter().all(|r| r.debit.minor == 0 || r.credit.minor == 0));
    }

    #[test]
    fn test_balance_sheet_equation() {
        let (accounts, _) = seeded();
        let sheet = balance_sheet(&accounts, at(25, 0)).unwrap();

        assert!(sheet.is_balanced);
        assert_eq!(sheet.total_assets.minor, 11_700);
        assert_eq!(sheet.current_earnings.minor, 1_000);
    }

    #[test]
    fn test_income_statement_period_filter() {
        let (accounts, entries) = seeded();
        let inside = Period::new(at(11, 0), at(13, 0)).unwrap();
        let outside = Period::new(at(13, 0), at(14, 0)).unwrap();

        let statement = income_statement(&accounts, &entries, inside, at(25, 0)).unwrap();
        assert_eq!(statement.total_income.minor, 1_000);
        assert_eq!(statement.net_income.minor, 1_000);

        let empty = income_statement(&accounts, &entries, outside, at(25, 0)).unwrap();
        assert_eq!(empty.net_income.minor, 0);
        assert!(empty.income.is_empty());
    }

    #[test]
    fn test_cash_flow_works_back_from_running_balance() {
        let (accounts, entries) = seeded();
        let bank = accounts.iter().find(|a| a.code == codes::ESCROW_BANK).unwrap();

        // Period covers only the daily payment; the remittance comes after it
        let period = Period::new(at(5, 0), at(15, 0)).unwrap();
        let since_start: Vec<JournalEntry> = entries.iter().filter(|e| e.entry_date >= period.start).cloned().collect();
        let flow = cash_flow(bank, &since_start, period, at(25, 0)).unwrap();

        assert_eq!(flow.opening_balance.minor, 104_800);
        assert_eq!(flow.inflows.minor, 8_700);
        assert_eq!(flow.outflows.minor, 0);
        assert_eq!(flow.closing_balance.minor, 113_500);
    }

    #[test]
    fn test_amounts_in_major_units() {
        let (accounts, _) = seeded();
        let sheet = balance_sheet(&accounts, at(25, 0)).unwrap();
        assert_eq!(sheet.total_assets.major.to_string(), "117.00");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn liability_and_asset() -> Vec<GlAccount> {
    vec![
        GlAccount::open(NewAccount::new("A", "Asset", AccountType::Asset), None, at(1, 0)).unwrap(),
        GlAccount::open(NewAccount::new("L", "Liability", AccountType::Liability), None, at(1, 0)).unwrap(),
        GlAccount::open(NewAccount::new("X", "Expense", AccountType::Expense), None, at(1, 0)).unwrap(),
        GlAccount::open(NewAccount::new("I", "Income", AccountType::Income), None, at(1, 0)).unwrap(),
    ]
}

proptest! {
    /// Posted balances always equal the signed sum of posted lines
    #[test]
    fn prop_balances_match_posted_lines(
        postings in prop::collection::vec((0usize..4, 0usize..4, 1i64..1_000_000), 1..20)
    ) {
        let mut accounts = liability_and_asset();
        let mut posted = Vec::new();

        for (i, (dr, cr, cents)) in postings.into_iter().enumerate() {
            let amount = Money::from_cents(cents);
            let request = NewJournalEntry::new(domain_ledger::EntryType::Adjustment, at(2, 0), "prop", "prop")
                .debit(accounts[dr].code.clone(), amount)
                .credit(accounts[cr].code.clone(), amount);
            posted.push(post(&mut accounts, request, i as u64 + 1));
        }

        for account in &accounts {
            let mut expected = Money::ZERO;
            for entry in &posted {
                let (debits, credits) = entry.line_totals().unwrap();
                prop_assert_eq!(debits, credits);
                for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
                    expected = expected.checked_add(account.balance_effect(line.debit, line.credit).unwrap()).unwrap();
                }
            }
            prop_assert_eq!(account.balance(), expected);
        }

        let tb = trial_balance(&accounts, at(3, 0)).unwrap();
        prop_assert!(tb.is_balanced);
    }
}
