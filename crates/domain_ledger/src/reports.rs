//! Read-only financial reports
//!
//! Every report is a pure function over a snapshot of accounts and entries
//! and carries the instant the snapshot was taken. Amounts are exposed in
//! both minor and major units.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use core_kernel::{AccountId, Amount, Money, Period};
use crate::account::{AccountType, GlAccount, NormalBalance};
use crate::entry::{EntryCategory, EntryStatus, JournalEntry};
use crate::error::LedgerError;

/// Whether an entry has moved balances (posted, or posted and later reversed)
pub fn has_balance_effect(entry: &JournalEntry) -> bool {
    matches!(entry.status, EntryStatus::Posted | EntryStatus::Reversed)
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalanceRow {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: Amount,
    pub credit: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeTotal {
    pub account_type: AccountType,
    pub balance: Amount,
}

/// Trial balance report
#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub as_of: DateTime<Utc>,
    pub rows: Vec<TrialBalanceRow>,
    /// Sum of account balances per account type
    pub by_type: Vec<TypeTotal>,
    pub total_debits: Amount,
    pub total_credits: Amount,
    pub is_balanced: bool,
}

/// Generates a trial balance from live accounts
pub fn trial_balance(accounts: &[GlAccount], as_of: DateTime<Utc>) -> Result<TrialBalance, LedgerError> {
    let mut live: Vec<&GlAccount> = accounts.iter().filter(|a| !a.is_deleted()).collect();
    live.sort_by(|a, b| a.code.cmp(&b.code));

    let mut rows = Vec::new();
    let mut total_debits = Money::ZERO;
    let mut total_credits = Money::ZERO;
    let mut by_type: BTreeMap<AccountType, Money> = BTreeMap::new();

    for account in live {
        let balance = account.balance();
        let slot = by_type.entry(account.account_type).or_insert(Money::ZERO);
        *slot = slot.checked_add(balance)?;

        if balance.is_zero() {
            continue;
        }

        // A negative balance shows on the side opposite to the normal one
        let (debit, credit) = match (account.normal_balance(), balance.is_negative()) {
            (NormalBalance::Debit, false) => (balance, Money::ZERO),
            (NormalBalance::Debit, true) => (Money::ZERO, balance.abs()?),
            (NormalBalance::Credit, false) => (Money::ZERO, balance),
            (NormalBalance::Credit, true) => (balance.abs()?, Money::ZERO),
        };

        total_debits = total_debits.checked_add(debit)?;
        total_credits = total_credits.checked_add(credit)?;
        rows.push(TrialBalanceRow {
            account_id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            debit: debit.into(),
            credit: credit.into(),
        });
    }

    Ok(TrialBalance {
        as_of,
        rows,
        by_type: by_type
            .into_iter()
            .map(|(account_type, balance)| TypeTotal {
                account_type,
                balance: balance.into(),
            })
            .collect(),
        total_debits: total_debits.into(),
        total_credits: total_credits.into(),
        is_balanced: total_debits == total_credits,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportLine {
    pub code: String,
    pub name: String,
    pub amount: Amount,
}

/// Assets, liabilities and equity at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheet {
    pub as_of: DateTime<Utc>,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    pub equity: Vec<ReportLine>,
    pub total_assets: Amount,
    pub total_liabilities: Amount,
    pub total_equity: Amount,
    /// Income less expenses not yet closed to retained earnings
    pub current_earnings: Amount,
    pub is_balanced: bool,
}

pub fn balance_sheet(accounts: &[GlAccount], as_of: DateTime<Utc>) -> Result<BalanceSheet, LedgerError> {
    let section = |t: AccountType| -> Result<(Vec<ReportLine>, Money), LedgerError> {
        let mut matching: Vec<&GlAccount> = accounts
            .iter()
            .filter(|a| !a.is_deleted() && a.account_type == t)
            .collect();
        matching.sort_by(|a, b| a.code.cmp(&b.code));
        let total = Money::checked_sum(matching.iter().map(|a| a.balance()))?;
        let lines = matching
            .into_iter()
            .map(|a| ReportLine {
                code: a.code.clone(),
                name: a.name.clone(),
                amount: a.balance().into(),
            })
            .collect();
        Ok((lines, total))
    };

    let (assets, total_assets) = section(AccountType::Asset)?;
    let (liabilities, total_liabilities) = section(AccountType::Liability)?;
    let (equity, total_equity) = section(AccountType::Equity)?;
    let (_, income) = section(AccountType::Income)?;
    let (_, expenses) = section(AccountType::Expense)?;
    let current_earnings = income.checked_sub(expenses)?;

    let claims = total_liabilities.checked_add(total_equity)?.checked_add(current_earnings)?;

    Ok(BalanceSheet {
        as_of,
        assets,
        liabilities,
        equity,
        total_assets: total_assets.into(),
        total_liabilities: total_liabilities.into(),
        total_equity: total_equity.into(),
        current_earnings: current_earnings.into(),
        is_balanced: total_assets == claims,
    })
}

/// Income and expenses over a period
#[derive(Debug, Clone, Serialize)]
pub struct IncomeStatement {
    pub period: Period,
    pub as_of: DateTime<Utc>,
    pub income: Vec<ReportLine>,
    pub expenses: Vec<ReportLine>,
    pub total_income: Amount,
    pub total_expenses: Amount,
    pub net_income: Amount,
}

/// Builds an income statement from the entries dated within `period`
pub fn income_statement(
    accounts: &[GlAccount],
    entries: &[JournalEntry],
    period: Period,
    as_of: DateTime<Utc>,
) -> Result<IncomeStatement, LedgerError> {
    let by_id: BTreeMap<AccountId, &GlAccount> = accounts.iter().map(|a| (a.id, a)).collect();
    let mut movement: BTreeMap<&str, (AccountType, &str, Money)> = BTreeMap::new();

    for entry in entries.iter().filter(|e| has_balance_effect(e) && period.contains(e.entry_date)) {
        for line in &entry.lines {
            let Some(account) = by_id.get(&line.account_id) else {
                continue;
            };
            if !matches!(account.account_type, AccountType::Income | AccountType::Expense) {
                continue;
            }
            let effect = account.balance_effect(line.debit, line.credit)?;
            let slot = movement
                .entry(account.code.as_str())
                .or_insert((account.account_type, account.name.as_str(), Money::ZERO));
            slot.2 = slot.2.checked_add(effect)?;
        }
    }

    let mut income = Vec::new();
    let mut expenses = Vec::new();
    let mut total_income = Money::ZERO;
    let mut total_expenses = Money::ZERO;

    for (code, (account_type, name, amount)) in movement {
        let line = ReportLine {
            code: code.to_string(),
            name: name.to_string(),
            amount: amount.into(),
        };
        if account_type == AccountType::Income {
            total_income = total_income.checked_add(amount)?;
            income.push(line);
        } else {
            total_expenses = total_expenses.checked_add(amount)?;
            expenses.push(line);
        }
    }

    Ok(IncomeStatement {
        period,
        as_of,
        income,
        expenses,
        total_income: total_income.into(),
        total_expenses: total_expenses.into(),
        net_income: total_income.checked_sub(total_expenses)?.into(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CashFlowCategory {
    pub category: EntryCategory,
    pub inflow: Amount,
    pub outflow: Amount,
}

/// Movement of one cash account over a period
#[derive(Debug, Clone, Serialize)]
pub struct CashFlowSummary {
    pub account_code: String,
    pub period: Period,
    pub as_of: DateTime<Utc>,
    pub opening_balance: Amount,
    pub inflows: Amount,
    pub outflows: Amount,
    pub closing_balance: Amount,
    pub by_category: Vec<CashFlowCategory>,
}

/// Cash flow of `account` over `period`
///
/// Works backward from the account's running balance: `entries` must hold
/// every entry dated at or after `period.start` (up to `as_of`). The
/// closing balance is the current balance less movements dated after the
/// period; the opening balance is the closing balance less movements
/// inside it. History before the period is never re-summed.
pub fn cash_flow(
    account: &GlAccount,
    entries: &[JournalEntry],
    period: Period,
    as_of: DateTime<Utc>,
) -> Result<CashFlowSummary, LedgerError> {
    let mut inflows = Money::ZERO;
    let mut outflows = Money::ZERO;
    let mut after_period = Money::ZERO;
    let mut by_category: BTreeMap<&'static str, (EntryCategory, Money, Money)> = BTreeMap::new();

    for entry in entries.iter().filter(|e| has_balance_effect(e) && e.entry_date >= period.start) {
        for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
            let effect = account.balance_effect(line.debit, line.credit)?;
            if entry.entry_date >= period.end {
                after_period = after_period.checked_add(effect)?;
                continue;
            }
            let category = entry.entry_type.category();
            let slot = by_category
                .entry(category.code())
                .or_insert((category, Money::ZERO, Money::ZERO));
            if effect.is_negative() {
                let out = effect.abs()?;
                outflows = outflows.checked_add(out)?;
                slot.2 = slot.2.checked_add(out)?;
            } else {
                inflows = inflows.checked_add(effect)?;
                slot.1 = slot.1.checked_add(effect)?;
            }
        }
    }

    let closing = account.balance().checked_sub(after_period)?;
    let opening = closing.checked_sub(inflows)?.checked_add(outflows)?;

    Ok(CashFlowSummary {
        account_code: account.code.clone(),
        period,
        as_of,
        opening_balance: opening.into(),
        inflows: inflows.into(),
        outflows: outflows.into(),
        closing_balance: closing.into(),
        by_category: by_category
            .into_values()
            .map(|(category, inflow, outflow)| CashFlowCategory {
                category,
                inflow: inflow.into(),
                outflow: outflow.into(),
            })
            .collect(),
    })
}
