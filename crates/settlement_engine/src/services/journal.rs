//! Journal entry engine
//!
//! Manual entries walk the full approval path:
//!
//! ```text
//! create (DRAFT) → submit → approve → post → (reverse)
//! ```
//!
//! Entries the platform generates itself (receipts, refunds, remittances)
//! are booked in one step by the services that own those events.

use chrono::Utc;
use tracing::instrument;

use core_kernel::{AuditAction, JournalEntryId};
use domain_ledger::{BalanceChange, JournalEntry, LedgerError, NewJournalEntry};

use super::{entry_ref, posting, AuditTrail, EngineContext};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// A reversed entry and the entry that reverses it
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    pub original: JournalEntry,
    pub reversal: JournalEntry,
}

#[derive(Clone)]
pub struct JournalService {
    ctx: EngineContext,
}

impl JournalService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Validates and stores a DRAFT entry
    ///
    /// # Errors
    ///
    /// * `Validation` - empty, one-sided, negative or unbalanced lines, or an inactive account
    /// * `NotFound` - a line references an unknown or deleted account
    #[instrument(skip(self, request), fields(entry_type = ?request.entry_type))]
    pub async fn create(&self, request: NewJournalEntry) -> Result<JournalEntry, EngineError> {
        let now = Utc::now();
        let actor = request.created_by.clone();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(&actor);

        let entry = posting::create_entry(uow.as_mut(), request, &self.ctx.timezone, now, &mut trail).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(entry_number = %entry.entry_number, amount_cents = entry.amount().cents(), "Entry created");
        Ok(entry)
    }

    pub async fn get(&self, id: JournalEntryId) -> Result<JournalEntry, EngineError> {
        let mut uow = self.ctx.begin().await?;
        uow.entry(id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()).into())
    }

    /// DRAFT → PENDING_APPROVAL
    #[instrument(skip(self))]
    pub async fn submit(&self, id: JournalEntryId, actor: &str) -> Result<JournalEntry, EngineError> {
        self.transition(id, actor, AuditAction::EntrySubmitted, |entry, now| entry.submit(now))
            .await
    }

    /// PENDING_APPROVAL → APPROVED
    #[instrument(skip(self))]
    pub async fn approve(&self, id: JournalEntryId, approver: &str) -> Result<JournalEntry, EngineError> {
        self.transition(id, approver, AuditAction::EntryApproved, |entry, now| entry.approve(approver, now))
            .await
    }

    /// APPROVED → POSTED, applying every line to its account
    ///
    /// On any failure the unit of work rolls back: the entry stays APPROVED
    /// and no balance moves.
    #[instrument(skip(self))]
    pub async fn post(&self, id: JournalEntryId, actor: &str) -> Result<(JournalEntry, Vec<BalanceChange>), EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut entry = locked_entry(uow.as_mut(), id).await?;
        let changes = match posting::post(uow.as_mut(), &mut entry, now, &mut trail).await {
            Ok(changes) => changes,
            Err(err) => {
                drop(uow);
                self.ctx.reject(actor, entry_ref(&entry), AuditAction::EntryPosted, &err).await;
                return Err(err);
            }
        };

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(entry_number = %entry.entry_number, accounts = changes.len(), "Entry posted");
        Ok((entry, changes))
    }

    /// Cancels a POSTED entry with a mirror entry posted through the same path
    #[instrument(skip(self))]
    pub async fn reverse(&self, id: JournalEntryId, reason: &str, actor: &str) -> Result<ReversalOutcome, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut original = locked_entry(uow.as_mut(), id).await?;
        let reversal =
            match posting::reverse(uow.as_mut(), &mut original, reason, actor, &self.ctx.timezone, now, &mut trail).await {
                Ok(reversal) => reversal,
                Err(err) => {
                    drop(uow);
                    self.ctx.reject(actor, entry_ref(&original), AuditAction::EntryReversed, &err).await;
                    return Err(err);
                }
            };

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            entry_number = %original.entry_number,
            reversal_number = %reversal.entry_number,
            "Entry reversed"
        );
        Ok(ReversalOutcome { original, reversal })
    }

    async fn transition<F>(
        &self,
        id: JournalEntryId,
        actor: &str,
        action: AuditAction,
        apply: F,
    ) -> Result<JournalEntry, EngineError>
    where
        F: FnOnce(&mut JournalEntry, chrono::DateTime<Utc>) -> Result<(), LedgerError> + Send,
    {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut entry = locked_entry(uow.as_mut(), id).await?;
        if let Err(e) = apply(&mut entry, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx.reject(actor, entry_ref(&entry), action, &err).await;
            return Err(err);
        }
        uow.update_entry(&entry).await?;
        trail.push(entry_ref(&entry), action, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(entry)
    }
}

pub(crate) async fn locked_entry(uow: &mut dyn UnitOfWork, id: JournalEntryId) -> Result<JournalEntry, EngineError> {
    uow.lock_entry(id)
        .await?
        .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()).into())
}
