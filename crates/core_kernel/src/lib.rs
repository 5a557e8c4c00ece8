//! Core Kernel - Foundational types shared by the collection ledger crates
//!
//! This crate provides the building blocks used across all domain modules:
//! - Money in integer minor units (cents) with checked arithmetic
//! - The business calendar (day and month windows in East Africa Time)
//! - Strongly-typed identifiers
//! - Partner and payment vocabulary
//! - Port error types and the audit sink

pub mod audit;
pub mod error;
pub mod identifiers;
pub mod money;
pub mod partner;
pub mod ports;
pub mod temporal;

pub use audit::{
    AuditAction, AuditEvent, AuditOutcome, AuditSink, EntityKind, EntityRef, MemoryAuditSink,
    TracingAuditSink,
};
pub use error::{CoreError, ErrorKind};
pub use identifiers::{
    AccountId, AuditEventId, EscrowRecordId, JournalEntryId, JournalLineId, OrganizationId,
    ReconciliationId, ReconciliationItemId, RemittanceBatchId, RiderId, SettlementId,
    SettlementLineId, TransactionId,
};
pub use money::{Amount, Money, MoneyError};
pub use partner::{PartnerType, PaymentCompleted, PaymentKind};
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
pub use temporal::{Period, TemporalError, Timezone};
