//! Statement-to-ledger matching
//!
//! The auto-matcher is deliberately conservative: a statement item is only
//! linked when exactly one ledger transaction fits it within tolerance, and
//! when no other item in the same run claims that transaction. Everything
//! else stays UNMATCHED for an operator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use core_kernel::{JournalEntryId, Money, Period, ReconciliationItemId, Timezone};
use domain_ledger::{EntryCategory, JournalEntry};
use crate::error::ReconciliationError;
use crate::record::{ReconciliationItem, ReconciliationType};

/// Matching tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTolerance {
    /// Calendar days either side of the statement date, counted on
    /// business-timezone dates (there is no weekend or holiday calendar)
    pub date_grace_days: u32,
    /// Absolute amount difference accepted, in cents
    pub amount_tolerance: Money,
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self {
            date_grace_days: 1,
            amount_tolerance: Money::ZERO,
        }
    }
}

/// A posted ledger entry as it appears on an external statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub entry_id: JournalEntryId,
    pub entry_number: String,
    pub category: EntryCategory,
    /// Signed like a statement: money leaving the platform is negative
    pub amount: Money,
    pub business_date: NaiveDate,
    pub reference: Option<String>,
}

impl LedgerTransaction {
    /// Statement view of an entry; `None` for drafts, reversed entries and reversals
    pub fn from_entry(entry: &JournalEntry, tz: &Timezone) -> Result<Option<Self>, ReconciliationError> {
        if !entry.is_effective() || entry.is_reversal() {
            return Ok(None);
        }
        let category = entry.entry_type.category();
        let amount = match category {
            EntryCategory::Refund | EntryCategory::Remittance => Money::ZERO.checked_sub(entry.amount())?,
            EntryCategory::PaymentReceipt
            | EntryCategory::FeeDistribution
            | EntryCategory::Commission
            | EntryCategory::Adjustment => entry.amount(),
        };
        Ok(Some(Self {
            entry_id: entry.id,
            entry_number: entry.entry_number.clone(),
            category,
            amount,
            business_date: tz.local_date(entry.entry_date),
            reference: entry.external_reference.clone(),
        }))
    }
}

/// Ledger transactions eligible for a reconciliation window
pub fn eligible_transactions(
    reconciliation_type: ReconciliationType,
    window: Period,
    entries: &[JournalEntry],
    tz: &Timezone,
) -> Result<Vec<LedgerTransaction>, ReconciliationError> {
    let mut eligible = Vec::new();
    for entry in entries.iter().filter(|e| window.contains(e.entry_date)) {
        if let Some(txn) = LedgerTransaction::from_entry(entry, tz)? {
            if reconciliation_type.is_eligible(txn.category) {
                eligible.push(txn);
            }
        }
    }
    eligible.sort_by(|a, b| a.business_date.cmp(&b.business_date).then(a.entry_number.cmp(&b.entry_number)));
    Ok(eligible)
}

/// The ledger side of a reconciliation: the signed sum of eligible transactions
pub fn ledger_balance(transactions: &[LedgerTransaction]) -> Result<Money, ReconciliationError> {
    Ok(Money::checked_sum(transactions.iter().map(|t| t.amount))?)
}

/// Whether a ledger transaction fits a statement item
pub fn within_tolerance(item: &ReconciliationItem, txn: &LedgerTransaction, tolerance: &MatchTolerance) -> bool {
    let delta = match item.amount.checked_sub(txn.amount).and_then(|d| d.abs()) {
        Ok(delta) => delta,
        Err(_) => return false,
    };
    if delta > tolerance.amount_tolerance {
        return false;
    }
    let offset = (txn.business_date - item.transaction_date).num_days();
    offset.unsigned_abs() <= u64::from(tolerance.date_grace_days)
}

/// A link the auto-matcher is confident about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchProposal {
    pub item_id: ReconciliationItemId,
    pub entry_id: JournalEntryId,
}

/// Proposes links for UNMATCHED items
///
/// `already_linked` holds entries linked to any item of any reconciliation;
/// they are never proposed again. Items with zero or several candidates are
/// skipped, and if two items single out the same transaction both are
/// dropped as ambiguous.
pub fn auto_match(
    items: &[ReconciliationItem],
    candidates: &[LedgerTransaction],
    already_linked: &HashSet<JournalEntryId>,
    tolerance: &MatchTolerance,
) -> Vec<MatchProposal> {
    let mut tentative: Vec<MatchProposal> = Vec::new();

    for item in items.iter().filter(|i| i.is_unmatched()) {
        let mut fitting = candidates
            .iter()
            .filter(|txn| !already_linked.contains(&txn.entry_id) && within_tolerance(item, txn, tolerance));

        if let (Some(only), None) = (fitting.next(), fitting.next()) {
            tentative.push(MatchProposal {
                item_id: item.id,
                entry_id: only.entry_id,
            });
        }
    }

    let mut claims: BTreeMap<JournalEntryId, usize> = BTreeMap::new();
    for proposal in &tentative {
        *claims.entry(proposal.entry_id).or_default() += 1;
    }

    let (unique, contested): (Vec<_>, Vec<_>) = tentative
        .into_iter()
        .partition(|p| claims.get(&p.entry_id).copied() == Some(1));
    if !contested.is_empty() {
        tracing::debug!(contested = contested.len(), "Items competing for one entry left unmatched");
    }
    unique
}

/// Entries linked to items other than `except`
pub fn linked_entries(items: &[ReconciliationItem], except: Option<ReconciliationItemId>) -> HashSet<JournalEntryId> {
    items
        .iter()
        .filter(|i| Some(i.id) != except)
        .filter_map(|i| i.journal_entry_id)
        .collect()
}

/// Rejects linking an entry that another item already holds
///
/// `holders` are the items currently linked to `entry_id`, from any
/// reconciliation.
pub fn ensure_unlinked(
    holders: &[ReconciliationItem],
    item_id: ReconciliationItemId,
    entry_id: JournalEntryId,
) -> Result<(), ReconciliationError> {
    match holders.iter().find(|i| i.id != item_id && i.journal_entry_id == Some(entry_id)) {
        Some(holder) => Err(ReconciliationError::AlreadyLinked {
            entry: entry_id.to_string(),
            item: format!("{} ({})", holder.line_number, holder.external_reference),
        }),
        None => Ok(()),
    }
}
