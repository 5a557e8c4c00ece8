//! Ledger domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, Money, MoneyError};

/// Errors that can occur in the ledger domain
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Account not found (or soft-deleted)
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account code already taken
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    /// Account exists but cannot take postings
    #[error("Account {code} is not active ({status})")]
    AccountNotActive {
        code: String,
        status: String,
    },

    /// Account operation not permitted
    #[error("Account {code}: {reason}")]
    AccountLocked {
        code: String,
        reason: String,
    },

    /// Journal entry not found
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    /// Entry without lines
    #[error("Journal entry has no lines")]
    EmptyEntry,

    /// A line carries both sides or neither side
    #[error("Line {line}: exactly one of debit or credit must be positive (debit={debit}, credit={credit})")]
    InvalidLine {
        line: usize,
        debit: i64,
        credit: i64,
    },

    /// Transaction is not balanced
    #[error("Unbalanced entry: debits={debits}, credits={credits}")]
    UnbalancedEntry {
        debits: Money,
        credits: Money,
    },

    /// Status machine violation
    #[error("Entry {entry_number}: cannot {action} from {from}")]
    InvalidTransition {
        entry_number: String,
        from: String,
        action: &'static str,
    },

    /// Entry already has a reversing entry
    #[error("Entry {0} has already been reversed")]
    AlreadyReversed(String),

    /// Invalid input for an entry or account
    #[error("Validation error: {0}")]
    Validation(String),

    /// Arithmetic overflow
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::EntryNotFound(_) => ErrorKind::NotFound,
            LedgerError::AccountAlreadyExists(_) => ErrorKind::Conflict,
            LedgerError::AccountNotActive { .. }
            | LedgerError::EmptyEntry
            | LedgerError::InvalidLine { .. }
            | LedgerError::UnbalancedEntry { .. }
            | LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::AccountLocked { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::AlreadyReversed(_) => ErrorKind::InvalidStateTransition,
            LedgerError::Calculation(e) => e.kind(),
        }
    }
}
