//! Reconciliation Domain - Statements against the ledger
//!
//! A reconciliation ingests one external statement (M-Pesa paybill, bank
//! or partner settlement), compares each line with the posted ledger
//! transactions of the matching business window and tracks the variance
//! between the two sides until an operator closes it.
//!
//! # Lifecycle
//!
//! PENDING → IN_PROGRESS → MATCHED | UNMATCHED | PARTIALLY_RESOLVED → RESOLVED
//!
//! A record is RESOLVED only when no item is left UNMATCHED and the
//! statement total equals the ledger total.

pub mod error;
pub mod matcher;
pub mod record;

pub use error::ReconciliationError;
pub use matcher::{auto_match, eligible_transactions, ledger_balance, LedgerTransaction, MatchProposal, MatchTolerance};
pub use record::{
    MatchStatus, ReconciliationItem, ReconciliationRecord, ReconciliationStatus, ReconciliationType, StatementLine,
};
