//! Application services
//!
//! Each service method is one unit of work: it begins a transaction on the
//! store, runs the domain transitions, commits, and only then publishes its
//! audit events. A failed call leaves nothing behind.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use core_kernel::{AuditAction, AuditEvent, AuditSink, EntityKind, EntityRef, Timezone};
use domain_escrow::{EscrowRecord, RemittanceBatch};
use domain_ledger::{GlAccount, JournalEntry};

use crate::error::EngineError;
use crate::store::{LedgerStore, UnitOfWork};

pub mod accounts;
pub mod journal;
pub mod payments;
pub(crate) mod posting;
pub mod reconciliation;
pub mod remittance;
pub mod reporting;
pub mod settlement;

pub use accounts::{AccountService, SeedReport};
pub use journal::{JournalService, ReversalOutcome};
pub use payments::{PaymentRecorded, PaymentService, RefundOutcome};
pub use reconciliation::{AutoMatchSummary, ReconciliationService};
pub use remittance::{BatchSweep, RemittanceService};
pub use reporting::{ReconciliationSummary, ReportingService, SettlementSummary};
pub use settlement::SettlementService;

/// Identity used for transitions the platform performs on its own
pub const SYSTEM_ACTOR: &str = "system";

/// Collaborators shared by every service
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn LedgerStore>,
    pub audit: Arc<dyn AuditSink>,
    pub timezone: Timezone,
}

impl EngineContext {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>, timezone: Timezone) -> Self {
        Self { store, audit, timezone }
    }

    pub(crate) async fn begin(&self) -> Result<Box<dyn UnitOfWork>, EngineError> {
        Ok(self.store.begin().await?)
    }

    pub(crate) async fn publish(&self, events: Vec<AuditEvent>) {
        for event in events {
            self.audit.record(event).await;
        }
    }

    /// Records a refused transition; the unit of work has already rolled back
    pub(crate) async fn reject(
        &self,
        actor: &str,
        entity: EntityRef,
        action: AuditAction,
        error: &EngineError,
    ) {
        self.audit
            .record(AuditEvent::rejected(actor, Utc::now(), entity, action, error.to_string()))
            .await;
    }
}

/// Audit events gathered during a unit of work, published after commit
#[derive(Debug, Default)]
pub(crate) struct AuditTrail {
    actor: String,
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub(crate) fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entity: EntityRef, action: AuditAction, at: DateTime<Utc>) {
        self.events
            .push(AuditEvent::success(self.actor.clone(), at, entity, action));
    }

    pub(crate) fn into_events(self) -> Vec<AuditEvent> {
        self.events
    }
}

pub(crate) fn entry_ref(entry: &JournalEntry) -> EntityRef {
    EntityRef::new(EntityKind::JournalEntry, *entry.id.as_uuid()).labelled(entry.entry_number.clone())
}

pub(crate) fn account_ref(account: &GlAccount) -> EntityRef {
    EntityRef::new(EntityKind::GlAccount, *account.id.as_uuid()).labelled(account.code.clone())
}

pub(crate) fn escrow_ref(record: &EscrowRecord) -> EntityRef {
    EntityRef::new(EntityKind::EscrowRecord, *record.id.as_uuid()).labelled(record.transaction_id.to_string())
}

pub(crate) fn batch_ref(batch: &RemittanceBatch) -> EntityRef {
    EntityRef::new(EntityKind::RemittanceBatch, *batch.id.as_uuid()).labelled(batch.batch_number.clone())
}
