//! Settlement domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Shares do not cover the whole fee
    #[error("Fee shares sum to {0} basis points, expected 10000")]
    SharesIncomplete(u32),

    #[error("Nothing to settle for {partner} in the period")]
    NothingToSettle {
        partner: String,
    },

    #[error("Settlement {settlement}: cannot {action} from {from}")]
    InvalidTransition {
        settlement: String,
        from: String,
        action: &'static str,
    },

    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_)
            | SettlementError::NothingToSettle { .. } => ErrorKind::Validation,
            SettlementError::SharesIncomplete(_) => ErrorKind::Fatal,
            SettlementError::InvalidTransition { .. } => ErrorKind::InvalidStateTransition,
            SettlementError::Calculation(e) => e.kind(),
        }
    }
}
