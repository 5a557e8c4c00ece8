//! Ledger Domain - Double-Entry Bookkeeping for Premium Collection
//!
//! This crate implements the chart of accounts and the journal entry engine
//! that every other part of the collection platform posts through.
//!
//! # Double-Entry Accounting Principles
//!
//! Every accounting event is a balanced set of lines:
//! - Debits increase asset/expense accounts
//! - Credits increase liability/equity/income accounts
//! - The sum of all debits must equal the sum of all credits
//!
//! # Entry lifecycle
//!
//! DRAFT → PENDING_APPROVAL → APPROVED → POSTED → (REVERSED)
//!
//! Only posting moves balances, and a posted entry is never edited: it is
//! cancelled by a reversing entry with every side swapped.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{EntryTemplates, JournalEntry, posting};
//!
//! let request = EntryTemplates::remittance(batch_total, now, "ops");
//! let mut entry = JournalEntry::draft(number, request, &accounts, now)?;
//! entry.submit(now)?;
//! entry.approve("ops", now)?;
//! posting::post_entry(&mut entry, &mut accounts, now)?;
//! ```

pub mod account;
pub mod chart;
pub mod entry;
pub mod error;
pub mod numbering;
pub mod posting;
pub mod reports;
pub mod templates;

pub use account::{AccountStatus, AccountType, GlAccount, NewAccount, NormalBalance};
#[cfg(feature = "storage")]
pub use account::StoredAccount;
pub use chart::{codes, partner_account, standard_chart, AccountTree};
pub use entry::{
    validate_lines, EntryCategory, EntrySource, EntryStatus, EntryType, JournalEntry, JournalLine,
    LineRequest, NewJournalEntry,
};
pub use error::LedgerError;
pub use numbering::{entry_sequence_key, format_entry_number};
pub use posting::{link_reversal, post_entry, BalanceChange};
pub use reports::{BalanceSheet, CashFlowSummary, IncomeStatement, TrialBalance};
pub use templates::EntryTemplates;
