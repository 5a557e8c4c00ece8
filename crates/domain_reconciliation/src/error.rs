//! Reconciliation domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError, TemporalError};

/// Errors that can occur in the reconciliation domain
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status machine violation
    #[error("{entity}: cannot {action} from {from}")]
    InvalidTransition {
        entity: String,
        from: String,
        action: String,
    },

    /// Ledger transaction already linked to another item
    #[error("Ledger transaction {entry} is already linked to item {item}")]
    AlreadyLinked {
        entry: String,
        item: String,
    },

    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] TemporalError),
}

impl ReconciliationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconciliationError::Validation(_) | ReconciliationError::Calendar(_) => ErrorKind::Validation,
            ReconciliationError::InvalidTransition { .. } => ErrorKind::InvalidStateTransition,
            ReconciliationError::AlreadyLinked { .. } => ErrorKind::Conflict,
            ReconciliationError::Calculation(e) => e.kind(),
        }
    }
}
