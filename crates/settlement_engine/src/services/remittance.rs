//! Remittance batch manager
//!
//! ```text
//! open/sweep → approve → begin_processing → transfer outcome
//!                                            ├─ confirmed: COMPLETED, members REMITTED, remittance posted
//!                                            └─ failed:    FAILED, members stay SCHEDULED (retryable)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use tracing::instrument;

use core_kernel::{AuditAction, EscrowRecordId, RemittanceBatchId};
use domain_escrow::{
    batch_sequence_key, format_batch_number, is_sweepable, BatchStatus, BatchType, EscrowError, RemittanceBatch,
    RemittanceStatus, ScheduleOutcome, SweepCutoff, TransferOutcome,
};
use domain_ledger::{EntrySource, EntryTemplates, JournalEntry};

use super::{batch_ref, escrow_ref, posting, AuditTrail, EngineContext};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// Result of opening or topping up a batch
#[derive(Debug, Clone)]
pub struct BatchSweep {
    pub batch: RemittanceBatch,
    /// Records newly scheduled by this sweep
    pub swept: u32,
    /// Whether the batch was created by this call
    pub opened: bool,
}

#[derive(Clone)]
pub struct RemittanceService {
    ctx: EngineContext,
}

impl RemittanceService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Opens the batch of a type for a business day, or reuses it while it
    /// is still PENDING, and sweeps eligible PENDING escrow records into it
    ///
    /// DAY1_IMMEDIATE takes deposit-day records created before the end of
    /// `batch_date`; MONTHLY_BULK takes accumulated records created up to
    /// `as_of`. Totals are recomputed from the members afterwards.
    ///
    /// A type has one batch per day. Once that batch is approved, opening
    /// the same day again is a Conflict; records that arrived later stay
    /// PENDING for the next day's batch.
    #[instrument(skip(self), fields(batch_type = batch_type.code()))]
    pub async fn open_batch(
        &self,
        batch_type: BatchType,
        batch_date: NaiveDate,
        as_of: DateTime<Utc>,
        actor: &str,
    ) -> Result<BatchSweep, EngineError> {
        let now = Utc::now();
        let cutoff = SweepCutoff::for_batch(batch_type, batch_date, as_of, &self.ctx.timezone)?;
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let (mut batch, opened) = match uow.lock_batch_for_day(batch_type, batch_date).await? {
            Some(batch) if batch.accepts_new_members() => (batch, false),
            Some(batch) => {
                let err = EngineError::from(EscrowError::DayAlreadyBatched {
                    batch: batch.batch_number.clone(),
                    status: batch.status.to_string(),
                });
                drop(uow);
                self.ctx.reject(actor, batch_ref(&batch), AuditAction::BatchOpened, &err).await;
                return Err(err);
            }
            None => {
                let key = batch_sequence_key(batch_type, batch_date);
                let sequence = uow.next_sequence(&key).await?;
                let batch = RemittanceBatch::open(batch_type, batch_date, format_batch_number(&key, sequence), actor, now);
                uow.insert_batch(&batch).await?;
                trail.push(batch_ref(&batch), AuditAction::BatchOpened, now);
                (batch, true)
            }
        };

        let mut swept = 0u32;
        for mut record in uow.lock_unbatched_escrow(batch_type.escrow_type()).await? {
            if !is_sweepable(&record, batch_type, cutoff) {
                continue;
            }
            if record.schedule(batch.id, now)? == ScheduleOutcome::Scheduled {
                uow.update_escrow(&record).await?;
                trail.push(escrow_ref(&record), AuditAction::EscrowScheduled, now);
                swept += 1;
            }
        }

        let members = uow.batch_members(batch.id).await?;
        batch.recompute_totals(&members, now)?;
        uow.update_batch(&batch).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            batch_number = %batch.batch_number,
            swept,
            total_records = batch.total_records,
            total_premium_cents = batch.total_premium_amount.cents(),
            "Batch swept"
        );
        Ok(BatchSweep { batch, swept, opened })
    }

    pub async fn get(&self, id: RemittanceBatchId) -> Result<RemittanceBatch, EngineError> {
        let mut uow = self.ctx.begin().await?;
        locked_batch(uow.as_mut(), id).await
    }

    /// PENDING → APPROVED; an empty batch cannot be approved
    #[instrument(skip(self))]
    pub async fn approve(&self, id: RemittanceBatchId, approver: &str) -> Result<RemittanceBatch, EngineError> {
        self.transition(id, approver, AuditAction::BatchApproved, |batch, now| batch.approve(approver, now))
            .await
    }

    /// APPROVED (or FAILED, to retry) → PROCESSING
    #[instrument(skip(self))]
    pub async fn begin_processing(&self, id: RemittanceBatchId, actor: &str) -> Result<RemittanceBatch, EngineError> {
        self.transition(id, actor, AuditAction::BatchProcessing, |batch, now| batch.begin_processing(actor, now))
            .await
    }

    /// Removes an empty PENDING batch
    #[instrument(skip(self))]
    pub async fn discard(&self, id: RemittanceBatchId, actor: &str) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let batch = locked_batch(uow.as_mut(), id).await?;
        if !batch.can_be_discarded() {
            let err = EngineError::InvalidStateTransition(format!(
                "Batch {}: only an empty PENDING batch can be discarded ({}, {} records)",
                batch.batch_number, batch.status, batch.total_records
            ));
            drop(uow);
            self.ctx.reject(actor, batch_ref(&batch), AuditAction::BatchDiscarded, &err).await;
            return Err(err);
        }
        uow.delete_batch(id).await?;
        trail.push(batch_ref(&batch), AuditAction::BatchDiscarded, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(())
    }

    /// Releases one member back to PENDING while the batch is PENDING or FAILED
    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        batch_id: RemittanceBatchId,
        record_id: EscrowRecordId,
        actor: &str,
    ) -> Result<RemittanceBatch, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut batch = locked_batch(uow.as_mut(), batch_id).await?;
        if !batch.allows_member_removal() {
            let err = EngineError::InvalidStateTransition(format!(
                "Batch {}: members cannot be removed from {}",
                batch.batch_number, batch.status
            ));
            drop(uow);
            self.ctx.reject(actor, batch_ref(&batch), AuditAction::BatchMemberRemoved, &err).await;
            return Err(err);
        }

        let mut record = uow
            .lock_escrow(record_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Escrow record", record_id))?;
        if record.batch_id != Some(batch_id) {
            return Err(EngineError::Validation(format!(
                "escrow record {} is not a member of batch {}",
                record_id, batch.batch_number
            )));
        }
        record.release(now)?;
        uow.update_escrow(&record).await?;
        trail.push(escrow_ref(&record), AuditAction::EscrowReleased, now);

        let members = uow.batch_members(batch_id).await?;
        batch.recompute_totals(&members, now)?;
        uow.update_batch(&batch).await?;
        trail.push(batch_ref(&batch), AuditAction::BatchMemberRemoved, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(batch)
    }

    /// Applies the bank's answer for a PROCESSING batch
    ///
    /// On confirmation the remittance entry (Dr premium payable / Cr escrow
    /// bank) is posted, every member becomes REMITTED and the batch
    /// COMPLETED, atomically. On failure only the batch changes.
    #[instrument(skip(self, outcome))]
    pub async fn record_transfer_outcome(
        &self,
        id: RemittanceBatchId,
        outcome: TransferOutcome,
        actor: &str,
    ) -> Result<(RemittanceBatch, Option<JournalEntry>), EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);
        let mut batch = locked_batch(uow.as_mut(), id).await?;

        let result = match outcome {
            TransferOutcome::Confirmed { bank_reference } => {
                self.complete(uow.as_mut(), &mut batch, &bank_reference, actor, now, &mut trail)
                    .await
                    .map(Some)
            }
            TransferOutcome::Failed { reason } => batch
                .fail(&reason, now)
                .map_err(EngineError::from)
                .map(|_| {
                    trail.push(batch_ref(&batch), AuditAction::BatchFailed, now);
                    None
                }),
        };
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                drop(uow);
                let action = match batch.status {
                    BatchStatus::Processing => AuditAction::BatchCompleted,
                    _ => AuditAction::BatchFailed,
                };
                self.ctx.reject(actor, batch_ref(&batch), action, &err).await;
                return Err(err);
            }
        };
        uow.update_batch(&batch).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(batch_number = %batch.batch_number, status = %batch.status, "Transfer outcome recorded");
        Ok((batch, entry))
    }

    async fn complete(
        &self,
        uow: &mut dyn UnitOfWork,
        batch: &mut RemittanceBatch,
        bank_reference: &str,
        actor: &str,
        now: DateTime<Utc>,
        trail: &mut AuditTrail,
    ) -> Result<JournalEntry, EngineError> {
        batch.ensure_status(BatchStatus::Processing, "complete")?;

        let mut members: Vec<_> = uow
            .batch_members(batch.id)
            .await?
            .into_iter()
            .filter(|r| r.status == RemittanceStatus::Scheduled)
            .collect();
        batch.recompute_totals(&members, now)?;
        if batch.total_records == 0 {
            return Err(EscrowError::InvalidTransition {
                entity: format!("Batch {}", batch.batch_number),
                from: batch.status.to_string(),
                action: "complete without members",
            }
            .into());
        }

        let request = EntryTemplates::remittance(batch.total_premium_amount, now, actor)
            .with_source(EntrySource::RemittanceBatch(batch.id))
            .with_reference(bank_reference);
        let entry = posting::book(uow, request, actor, &self.ctx.timezone, now, trail).await?;

        for record in members.iter_mut() {
            record.mark_remitted(bank_reference, now)?;
            uow.update_escrow(record).await?;
        }
        batch.complete(bank_reference, entry.id, now)?;
        trail.push(batch_ref(batch), AuditAction::BatchCompleted, now);
        Ok(entry)
    }

    async fn transition<F>(
        &self,
        id: RemittanceBatchId,
        actor: &str,
        action: AuditAction,
        apply: F,
    ) -> Result<RemittanceBatch, EngineError>
    where
        F: FnOnce(&mut RemittanceBatch, DateTime<Utc>) -> Result<(), EscrowError> + Send,
    {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut batch = locked_batch(uow.as_mut(), id).await?;
        if let Err(e) = apply(&mut batch, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx.reject(actor, batch_ref(&batch), action, &err).await;
            return Err(err);
        }
        uow.update_batch(&batch).await?;
        trail.push(batch_ref(&batch), action, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(batch_number = %batch.batch_number, status = %batch.status, "Batch transition");
        Ok(batch)
    }
}

async fn locked_batch(uow: &mut dyn UnitOfWork, id: RemittanceBatchId) -> Result<RemittanceBatch, EngineError> {
    uow.lock_batch(id)
        .await?
        .ok_or_else(|| EngineError::not_found("Remittance batch", id))
}
