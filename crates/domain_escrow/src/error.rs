//! Escrow domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError};

/// Errors that can occur in the escrow domain
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// Premium/fee split does not add up, or other malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status machine violation
    #[error("{entity}: cannot {action} from {from}")]
    InvalidTransition {
        entity: String,
        from: String,
        action: &'static str,
    },

    /// Record already belongs to a different batch
    #[error("Escrow record {record} is already scheduled in batch {batch}")]
    AlreadyInBatch {
        record: String,
        batch: String,
    },

    /// The type already has a batch for that day and it no longer takes members
    #[error("Batch {batch} already covers this day and is {status}")]
    DayAlreadyBatched {
        batch: String,
        status: String,
    },

    /// Arithmetic overflow
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),
}

impl EscrowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::Validation(_) => ErrorKind::Validation,
            EscrowError::InvalidTransition { .. } => ErrorKind::InvalidStateTransition,
            EscrowError::AlreadyInBatch { .. } | EscrowError::DayAlreadyBatched { .. } => ErrorKind::Conflict,
            EscrowError::Calculation(e) => e.kind(),
        }
    }
}
