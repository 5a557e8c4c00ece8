//! Custom Test Assertions
//!
//! Assertion helpers for ledger types that give more meaningful error
//! messages than standard assertions.

use core_kernel::{ErrorKind, Money};
use domain_ledger::{GlAccount, JournalEntry, TrialBalance};

/// Asserts that an amount equals `cents`
pub fn assert_cents(actual: Money, cents: i64) {
    assert_eq!(
        actual.cents(),
        cents,
        "Expected {} cents ({}), got {}",
        cents,
        Money::from_cents(cents),
        actual
    );
}

/// Asserts that an entry's debits equal its credits, line by line and in total
///
/// # Panics
///
/// Panics if any line carries both or neither side, or the totals disagree
pub fn assert_entry_balanced(entry: &JournalEntry) {
    for line in &entry.lines {
        assert!(
            line.debit.is_zero() != line.credit.is_zero(),
            "Entry {} line {} must carry exactly one side (debit {}, credit {})",
            entry.entry_number,
            line.line_number,
            line.debit,
            line.credit
        );
    }
    let debits = Money::checked_sum(entry.lines.iter().map(|l| l.debit)).unwrap();
    let credits = Money::checked_sum(entry.lines.iter().map(|l| l.credit)).unwrap();
    assert_eq!(debits, credits, "Entry {} is unbalanced", entry.entry_number);
    assert_eq!(entry.total_debit, debits, "Entry {} header debit disagrees with its lines", entry.entry_number);
    assert_eq!(entry.total_credit, credits, "Entry {} header credit disagrees with its lines", entry.entry_number);
}

/// Asserts the balance of the account with `code`
pub fn assert_account_balance(accounts: &[GlAccount], code: &str, cents: i64) {
    let account = accounts
        .iter()
        .find(|a| a.code == code)
        .unwrap_or_else(|| panic!("Account {} not found", code));
    assert_eq!(
        account.balance().cents(),
        cents,
        "Account {} ({}) balance: expected {} cents, got {}",
        account.code,
        account.name,
        cents,
        account.balance()
    );
}

/// Asserts that a trial balance is in balance
pub fn assert_trial_balance_balanced(report: &TrialBalance) {
    assert!(
        report.is_balanced,
        "Trial balance out of balance: debits {} cents, credits {} cents",
        report.total_debits.minor,
        report.total_credits.minor
    );
}

/// Asserts that a result failed with the given error kind
///
/// The error type only needs a `kind()`-style classifier passed in.
pub fn assert_error_kind<T, E>(result: Result<T, E>, expected: ErrorKind, classify: impl Fn(&E) -> ErrorKind)
where
    T: std::fmt::Debug,
    E: std::fmt::Display,
{
    match result {
        Ok(value) => panic!("Expected a {:?} error, got Ok({:?})", expected, value),
        Err(e) => assert_eq!(classify(&e), expected, "Unexpected error: {}", e),
    }
}
