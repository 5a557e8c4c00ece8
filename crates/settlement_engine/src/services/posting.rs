//! Entry creation, posting and reversal inside an open unit of work
//!
//! Every service that moves money goes through these helpers, so account
//! resolution, numbering, locking and the balance write-back happen the
//! same way everywhere.

use chrono::{DateTime, Utc};

use core_kernel::{AuditAction, Timezone};
use domain_ledger::{
    entry_sequence_key, format_entry_number, link_reversal, post_entry, BalanceChange, GlAccount, JournalEntry,
    LedgerError, NewJournalEntry,
};

use super::{entry_ref, AuditTrail};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// Resolves the line accounts, numbers the entry and stores it as DRAFT
pub(crate) async fn create_entry(
    uow: &mut dyn UnitOfWork,
    request: NewJournalEntry,
    tz: &Timezone,
    at: DateTime<Utc>,
    trail: &mut AuditTrail,
) -> Result<JournalEntry, EngineError> {
    let mut accounts: Vec<GlAccount> = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        match uow.account_by_code(&line.account_code).await? {
            Some(account) if !account.is_deleted() => accounts.push(account),
            _ => return Err(LedgerError::AccountNotFound(line.account_code.clone()).into()),
        }
    }

    let key = entry_sequence_key(request.entry_date, tz);
    let sequence = uow.next_sequence(&key).await?;
    let entry = JournalEntry::draft(format_entry_number(&key, sequence), request, &accounts, at)?;
    uow.insert_entry(&entry).await?;

    trail.push(entry_ref(&entry), AuditAction::EntryCreated, at);
    Ok(entry)
}

/// Posts an APPROVED entry under locks on its accounts and writes back
/// the new balances together with the entry
pub(crate) async fn post(
    uow: &mut dyn UnitOfWork,
    entry: &mut JournalEntry,
    at: DateTime<Utc>,
    trail: &mut AuditTrail,
) -> Result<Vec<BalanceChange>, EngineError> {
    let mut codes: Vec<String> = entry.lines.iter().map(|l| l.account_code.clone()).collect();
    codes.sort();
    codes.dedup();

    let mut accounts = uow.lock_accounts(&codes).await?;
    let changes = post_entry(entry, &mut accounts, at)?;

    for account in accounts.iter().filter(|a| changes.iter().any(|c| c.account_id == a.id)) {
        uow.update_account(account).await?;
    }
    uow.update_entry(entry).await?;

    trail.push(entry_ref(entry), AuditAction::EntryPosted, at);
    Ok(changes)
}

/// Create, submit, approve and post in one go, for entries the platform
/// generates itself
pub(crate) async fn book(
    uow: &mut dyn UnitOfWork,
    request: NewJournalEntry,
    approver: &str,
    tz: &Timezone,
    at: DateTime<Utc>,
    trail: &mut AuditTrail,
) -> Result<JournalEntry, EngineError> {
    let mut entry = create_entry(uow, request, tz, at, trail).await?;
    entry.submit(at)?;
    trail.push(entry_ref(&entry), AuditAction::EntrySubmitted, at);
    entry.approve(approver, at)?;
    trail.push(entry_ref(&entry), AuditAction::EntryApproved, at);
    post(uow, &mut entry, at, trail).await?;
    Ok(entry)
}

/// Books the mirror entry of `original` and marks the original REVERSED
///
/// Returns the reversal; `original` is updated in place and persisted.
pub(crate) async fn reverse(
    uow: &mut dyn UnitOfWork,
    original: &mut JournalEntry,
    reason: &str,
    actor: &str,
    tz: &Timezone,
    at: DateTime<Utc>,
    trail: &mut AuditTrail,
) -> Result<JournalEntry, EngineError> {
    let request = original.reversal_request(reason, actor, at)?;
    let reversal = book(uow, request, actor, tz, at, trail).await?;

    link_reversal(original, &reversal, actor, reason, at)?;
    uow.update_entry(original).await?;

    trail.push(entry_ref(original), AuditAction::EntryReversed, at);
    Ok(reversal)
}
