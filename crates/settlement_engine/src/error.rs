//! Service-level error taxonomy
//!
//! Every domain error is folded into one of the kinds callers act on. The
//! message keeps the domain error's text so the failed invariant stays
//! visible.

use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError, PortError, TemporalError};
use domain_escrow::EscrowError;
use domain_ledger::LedgerError;
use domain_reconciliation::ReconciliationError;
use domain_settlement::SettlementError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The unit of work was rolled back
    #[error("Persistence failure: {0}")]
    Persistence(#[source] PortError),

    /// Overflow or misconfiguration; not retryable
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Persistence(_) => ErrorKind::Persistence,
            EngineError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound(format!("{} {}", entity, id))
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Persistence(e) if e.is_transient())
    }

    fn classify(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Validation => EngineError::Validation(message),
            ErrorKind::InvalidStateTransition => EngineError::InvalidStateTransition(message),
            ErrorKind::Conflict => EngineError::Conflict(message),
            ErrorKind::NotFound => EngineError::NotFound(message),
            ErrorKind::Persistence => EngineError::Persistence(PortError::internal(message)),
            ErrorKind::Fatal => EngineError::Fatal(message),
        }
    }
}

impl From<PortError> for EngineError {
    fn from(e: PortError) -> Self {
        match e.kind() {
            ErrorKind::Persistence => EngineError::Persistence(e),
            kind => EngineError::classify(kind, e.to_string()),
        }
    }
}

macro_rules! classified_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for EngineError {
                fn from(e: $source) -> Self {
                    EngineError::classify(e.kind(), e.to_string())
                }
            }
        )+
    };
}

classified_from!(LedgerError, EscrowError, ReconciliationError, SettlementError, MoneyError);

impl From<TemporalError> for EngineError {
    fn from(e: TemporalError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Money;

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let unbalanced = LedgerError::UnbalancedEntry {
            debits: Money::from_cents(100),
            credits: Money::from_cents(90),
        };
        let err = EngineError::from(unbalanced);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("debits=KES 1.00"));

        let overflow = EngineError::from(MoneyError::Overflow);
        assert_eq!(overflow.kind(), ErrorKind::Fatal);

        let conflict = EngineError::from(EscrowError::AlreadyInBatch {
            record: "r".into(),
            batch: "b".into(),
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_port_errors() {
        let err = EngineError::from(PortError::connection("pool closed"));
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.is_transient());

        let dup = EngineError::from(PortError::conflict("duplicate key"));
        assert_eq!(dup.kind(), ErrorKind::Conflict);
        assert!(!dup.is_transient());
    }
}
