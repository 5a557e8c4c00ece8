//! Posting and reversal
//!
//! `post_entry` is the only code path that changes an account balance. It
//! works on the caller's working copies of the affected accounts; the
//! caller persists the accounts and the entry in the same unit of work, so
//! a failure anywhere leaves both untouched.

use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use core_kernel::{AccountId, Money};
use crate::account::GlAccount;
use crate::entry::{EntryStatus, JournalEntry};
use crate::error::LedgerError;

/// Balance movement of one account caused by a posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub account_code: String,
    pub before: Money,
    pub after: Money,
}

/// APPROVED → POSTED, applying every line to its account
///
/// `accounts` must contain every account referenced by the entry (locked by
/// the caller). Balance is recomputed from the lines rather than trusted
/// from creation. All new balances are computed before any is written, so
/// an error leaves the entry APPROVED and every account unchanged.
pub fn post_entry(
    entry: &mut JournalEntry,
    accounts: &mut [GlAccount],
    at: DateTime<Utc>,
) -> Result<Vec<BalanceChange>, LedgerError> {
    if entry.status != EntryStatus::Approved {
        return Err(entry.invalid_transition("post"));
    }
    entry.ensure_balanced()?;

    let index: HashMap<AccountId, usize> = accounts
        .iter()
        .enumerate()
        .map(|(i, a)| (a.id, i))
        .collect();

    // Stage every balance on a scratch copy first
    let mut staged: HashMap<usize, GlAccount> = HashMap::new();
    for line in &entry.lines {
        let pos = *index
            .get(&line.account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(line.account_code.clone()))?;
        let account = match staged.entry(pos) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                accounts[pos].ensure_accepts_postings()?;
                slot.insert(accounts[pos].clone())
            }
        };
        account.apply_line(line.debit, line.credit, at)?;
    }

    let mut changes: Vec<BalanceChange> = staged
        .into_iter()
        .map(|(pos, updated)| {
            let change = BalanceChange {
                account_id: updated.id,
                account_code: updated.code.clone(),
                before: accounts[pos].balance(),
                after: updated.balance(),
            };
            accounts[pos] = updated;
            change
        })
        .collect();
    changes.sort_by(|a, b| a.account_code.cmp(&b.account_code));

    entry.status = EntryStatus::Posted;
    entry.posted_at = Some(at);
    entry.updated_at = at;

    tracing::debug!(
        entry_number = %entry.entry_number,
        accounts = changes.len(),
        amount_cents = entry.total_debit.cents(),
        "Entry posted"
    );

    Ok(changes)
}

/// Links a posted reversal to its original and marks the original REVERSED
pub fn link_reversal(
    original: &mut JournalEntry,
    reversal: &JournalEntry,
    actor: &str,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    original.ensure_reversible()?;
    if reversal.original_entry_id != Some(original.id) {
        return Err(LedgerError::Validation(format!(
            "{} does not reverse {}",
            reversal.entry_number, original.entry_number
        )));
    }
    if reversal.status != EntryStatus::Posted {
        return Err(reversal.invalid_transition("link as reversal"));
    }

    original.status = EntryStatus::Reversed;
    original.reversing_entry_id = Some(reversal.id);
    original.reversed_by = Some(actor.to_string());
    original.reversed_at = Some(at);
    original.reversal_reason = Some(reason.to_string());
    original.updated_at = at;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountType, NewAccount};
    use crate::entry::{EntryType, NewJournalEntry};

    fn setup() -> (Vec<GlAccount>, JournalEntry) {
        let now = Utc::now();
        let accounts = vec![
            GlAccount::open(NewAccount::new("1100", "Bank", AccountType::Asset), None, now).unwrap(),
            GlAccount::open(NewAccount::new("2100", "Premium Payable", AccountType::Liability), None, now).unwrap(),
        ];
        let request = NewJournalEntry::new(EntryType::Adjustment, now, "Test", "tester")
            .debit("1100", Money::from_cents(700))
            .credit("2100", Money::from_cents(700));
        let mut entry = JournalEntry::draft("JE-202401-000001".into(), request, &accounts, now).unwrap();
        entry.submit(now).unwrap();
        entry.approve("checker", now).unwrap();
        (accounts, entry)
    }

    #[test]
    fn test_post_updates_both_sides() {
        let (mut accounts, mut entry) = setup();
        let changes = post_entry(&mut entry, &mut accounts, Utc::now()).unwrap();

        assert_eq!(entry.status, EntryStatus::Posted);
        assert_eq!(accounts[0].balance(), Money::from_cents(700));
        assert_eq!(accounts[1].balance(), Money::from_cents(700));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].before, Money::ZERO);
    }

    #[test]
    fn test_post_from_draft_rejected() {
        let (mut accounts, entry) = setup();
        let mut draft = entry.clone();
        draft.status = EntryStatus::Draft;
        assert!(matches!(
            post_entry(&mut draft, &mut accounts, Utc::now()),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_missing_account_leaves_everything_untouched() {
        let (mut accounts, mut entry) = setup();
        let mut only_bank = vec![accounts.remove(0)];
        let result = post_entry(&mut entry, &mut only_bank, Utc::now());

        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
        assert_eq!(entry.status, EntryStatus::Approved);
        assert_eq!(only_bank[0].balance(), Money::ZERO);
    }

    #[test]
    fn test_overflow_rolls_back_staged_balances() {
        let (mut accounts, mut entry) = setup();
        accounts[1] = accounts[1].clone().restore_balance_for_test(Money::from_cents(i64::MAX));
        let result = post_entry(&mut entry, &mut accounts, Utc::now());

        assert!(matches!(result, Err(LedgerError::Calculation(_))));
        assert_eq!(accounts[0].balance(), Money::ZERO);
        assert_eq!(entry.status, EntryStatus::Approved);
    }

    #[test]
    fn test_link_reversal_marks_original() {
        let (mut accounts, mut entry) = setup();
        let now = Utc::now();
        post_entry(&mut entry, &mut accounts, now).unwrap();

        let request = entry.reversal_request("duplicate", "ops", now).unwrap();
        let mut reversal = JournalEntry::draft("JE-202401-000002".into(), request, &accounts, now).unwrap();
        reversal.submit(now).unwrap();
        reversal.approve("ops", now).unwrap();
        post_entry(&mut reversal, &mut accounts, now).unwrap();
        link_reversal(&mut entry, &reversal, "ops", "duplicate", now).unwrap();

        assert_eq!(entry.status, EntryStatus::Reversed);
        assert_eq!(entry.reversing_entry_id, Some(reversal.id));
        assert_eq!(reversal.original_entry_id, Some(entry.id));
        assert!(accounts.iter().all(|a| a.balance().is_zero()));
        assert!(matches!(entry.ensure_reversible(), Err(LedgerError::AlreadyReversed(_))));
    }

    impl GlAccount {
        fn restore_balance_for_test(self, balance: Money) -> GlAccount {
            GlAccount::restore(crate::account::StoredAccount {
                id: self.id,
                code: self.code,
                name: self.name,
                account_type: self.account_type,
                balance,
                parent_id: self.parent_id,
                status: self.status,
                is_system_account: self.is_system_account,
                deleted_at: self.deleted_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }
}
