//! Audit events for every state transition
//!
//! Services emit one `AuditEvent` per transition (successful or rejected)
//! through an `AuditSink`. Sinks are infallible from the caller's point of
//! view: a failing audit backend must never roll back a committed posting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::identifiers::AuditEventId;

/// Kind of entity an audit event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    GlAccount,
    JournalEntry,
    EscrowRecord,
    RemittanceBatch,
    Reconciliation,
    ReconciliationItem,
    PartnerSettlement,
}

/// Reference to the entity affected by a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
    /// Human-readable label such as an entry or batch number
    pub label: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        Self {
            kind,
            id: id.into(),
            label: None,
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Transition being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountCreated,
    AccountStatusChanged,
    EntryCreated,
    EntrySubmitted,
    EntryApproved,
    EntryPosted,
    EntryReversed,
    EscrowRecorded,
    EscrowScheduled,
    EscrowRefunded,
    EscrowReleased,
    BatchOpened,
    BatchMemberRemoved,
    BatchDiscarded,
    BatchApproved,
    BatchProcessing,
    BatchCompleted,
    BatchFailed,
    StatementIngested,
    AutoMatchRun,
    ItemMatched,
    ItemResolved,
    ReconciliationClosed,
    SettlementProposed,
    SettlementApproved,
    SettlementPaid,
    SettlementCancelled,
}

/// Result of the audited operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected { reason: String },
}

/// A structured audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub entity: EntityRef,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn success(
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
        entity: EntityRef,
        action: AuditAction,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            actor: actor.into(),
            occurred_at,
            entity,
            action,
            outcome: AuditOutcome::Success,
        }
    }

    pub fn rejected(
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
        entity: EntityRef,
        action: AuditAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            actor: actor.into(),
            occurred_at,
            entity,
            action,
            outcome: AuditOutcome::Rejected {
                reason: reason.into(),
            },
        }
    }
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured `tracing` records under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match &event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                event_id = %event.id,
                actor = %event.actor,
                entity_kind = ?event.entity.kind,
                entity_id = %event.entity.id,
                label = event.entity.label.as_deref().unwrap_or(""),
                action = ?event.action,
                "transition succeeded"
            ),
            AuditOutcome::Rejected { reason } => tracing::warn!(
                target: "audit",
                event_id = %event.id,
                actor = %event.actor,
                entity_kind = ?event.entity.kind,
                entity_id = %event.entity.id,
                action = ?event.action,
                reason = %reason,
                "transition rejected"
            ),
        }
    }
}

/// Keeps audit events in memory; used by tests and local tooling
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded events for one action
    pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
