//! Payment intake and refunds
//!
//! A completed rider payment produces exactly one posted receipt entry and
//! one escrow record, written in the same unit of work. Replaying the same
//! payment returns what the first delivery created.

use chrono::Utc;
use tracing::instrument;

use core_kernel::{AuditAction, Money, PaymentCompleted, PaymentKind, RemittanceBatchId, TransactionId};
use domain_escrow::{EscrowRecord, PaymentSplit};
use domain_ledger::{EntrySource, EntryTemplates, JournalEntry};

use super::{batch_ref, escrow_ref, posting, AuditTrail, EngineContext, SYSTEM_ACTOR};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// Ledger and escrow records for one payment
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    pub entry: JournalEntry,
    pub escrow: EscrowRecord,
    /// True when the payment had already been recorded
    pub replayed: bool,
}

/// Result of refunding an escrowed payment
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub escrow: EscrowRecord,
    pub entry: JournalEntry,
    /// Batch the record was taken out of, if it was scheduled
    pub released_from: Option<RemittanceBatchId>,
}

/// Service fees charged per payment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub deposit: Money,
    pub daily: Money,
}

impl FeeSchedule {
    pub fn fee_for(&self, kind: PaymentKind) -> Money {
        match kind {
            PaymentKind::Deposit => self.deposit,
            PaymentKind::Daily => self.daily,
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    ctx: EngineContext,
    fees: FeeSchedule,
}

impl PaymentService {
    pub fn new(ctx: EngineContext, fees: FeeSchedule) -> Self {
        Self { ctx, fees }
    }

    /// Books a completed payment
    ///
    /// Posts `Dr escrow bank / Cr premium payable / Cr service fee payable`
    /// and records the premium in escrow. Idempotent on the transaction id:
    /// a second delivery, even a concurrent one that loses the race on the
    /// unique source index, returns the first result with `replayed` set.
    ///
    /// # Errors
    ///
    /// * `Validation` - the amount does not cover the service fee, or a deposit is not day 1
    #[instrument(
        skip(self, payment),
        fields(transaction_id = %payment.transaction_id, amount_cents = payment.amount.cents())
    )]
    pub async fn record_payment(&self, payment: &PaymentCompleted) -> Result<PaymentRecorded, EngineError> {
        match self.try_record(payment).await {
            Err(EngineError::Conflict(message)) => match self.replay(payment.transaction_id).await? {
                Some(recorded) => Ok(recorded),
                None => Err(EngineError::Conflict(message)),
            },
            other => other,
        }
    }

    async fn try_record(&self, payment: &PaymentCompleted) -> Result<PaymentRecorded, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;

        if let Some(recorded) = existing(uow.as_mut(), payment.transaction_id).await? {
            tracing::info!(entry_number = %recorded.entry.entry_number, "Payment already recorded");
            return Ok(recorded);
        }

        let mut trail = AuditTrail::new(SYSTEM_ACTOR);
        let split = PaymentSplit::from_total(payment.amount, self.fees.fee_for(payment.payment_kind))?;
        let payment_day = self.payment_day(uow.as_mut(), payment).await?;

        let request = EntryTemplates::payment_receipt(
            payment.payment_kind,
            split.total,
            split.premium,
            split.service_fee,
            payment.completed_at,
            SYSTEM_ACTOR,
        )?
        .with_source(EntrySource::Payment(payment.transaction_id))
        .for_rider(payment.rider_id)
        .with_reference(payment.receipt_reference.clone());

        let entry = posting::book(uow.as_mut(), request, SYSTEM_ACTOR, &self.ctx.timezone, now, &mut trail).await?;

        let escrow = EscrowRecord::record(
            payment.rider_id,
            payment.transaction_id,
            payment_day,
            split,
            Some(entry.id),
            payment.completed_at,
        )?;
        uow.insert_escrow(&escrow).await?;
        trail.push(escrow_ref(&escrow), AuditAction::EscrowRecorded, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            entry_number = %entry.entry_number,
            payment_day,
            premium_cents = escrow.premium_amount.cents(),
            fee_cents = escrow.service_fee_amount.cents(),
            "Payment recorded"
        );
        Ok(PaymentRecorded {
            entry,
            escrow,
            replayed: false,
        })
    }

    async fn replay(&self, transaction_id: TransactionId) -> Result<Option<PaymentRecorded>, EngineError> {
        let mut uow = self.ctx.begin().await?;
        existing(uow.as_mut(), transaction_id).await
    }

    /// Deposits are always day 1; a daily payment takes the ordinal the
    /// payment subsystem supplied, or the rider's next one
    async fn payment_day(&self, uow: &mut dyn UnitOfWork, payment: &PaymentCompleted) -> Result<u32, EngineError> {
        match (payment.payment_kind, payment.payment_day) {
            (PaymentKind::Deposit, None) | (PaymentKind::Deposit, Some(1)) => Ok(1),
            (PaymentKind::Deposit, Some(day)) => Err(EngineError::Validation(format!(
                "a deposit is always payment day 1, got {}",
                day
            ))),
            (PaymentKind::Daily, Some(day)) if day >= 2 => Ok(day),
            (PaymentKind::Daily, Some(day)) => Err(EngineError::Validation(format!(
                "a daily payment starts at payment day 2, got {}",
                day
            ))),
            (PaymentKind::Daily, None) => {
                let last = uow.max_payment_day(payment.rider_id).await?.unwrap_or(1);
                Ok(last.max(1) + 1)
            }
        }
    }

    /// Returns escrowed money to the rider
    ///
    /// Takes the record out of its batch (whose totals are recomputed) and
    /// posts the refund entry, all in one unit of work. Refused once the
    /// batch is PROCESSING or COMPLETED since the premium has left escrow.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        transaction_id: TransactionId,
        refund_transaction_id: TransactionId,
        reference: &str,
        actor: &str,
    ) -> Result<RefundOutcome, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let found = uow
            .escrow_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Escrow record for transaction", transaction_id))?;
        let mut record = uow
            .lock_escrow(found.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Escrow record", found.id))?;

        let mut batch = match record.batch_id {
            Some(batch_id) => Some(
                uow.lock_batch(batch_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("Remittance batch", batch_id))?,
            ),
            None => None,
        };
        if let Some(batch) = batch.as_ref().filter(|b| b.funds_committed()) {
            let err = EngineError::InvalidStateTransition(format!(
                "cannot refund {}: batch {} is {}",
                transaction_id, batch.batch_number, batch.status
            ));
            drop(uow);
            self.ctx.reject(actor, escrow_ref(&record), AuditAction::EscrowRefunded, &err).await;
            return Err(err);
        }

        let released_from = record.refund(reference, now)?;
        uow.update_escrow(&record).await?;
        trail.push(escrow_ref(&record), AuditAction::EscrowRefunded, now);

        if let Some(batch) = batch.as_mut() {
            let members = uow.batch_members(batch.id).await?;
            batch.recompute_totals(&members, now)?;
            uow.update_batch(batch).await?;
            trail.push(batch_ref(batch), AuditAction::BatchMemberRemoved, now);
        }

        let request = EntryTemplates::refund(record.premium_amount, record.service_fee_amount, now, actor)?
            .with_source(EntrySource::Refund(refund_transaction_id))
            .for_rider(record.rider_id)
            .with_reference(reference);
        let entry = posting::book(uow.as_mut(), request, actor, &self.ctx.timezone, now, &mut trail).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            entry_number = %entry.entry_number,
            released = released_from.is_some(),
            "Payment refunded"
        );
        Ok(RefundOutcome {
            escrow: record,
            entry,
            released_from,
        })
    }
}

async fn existing(uow: &mut dyn UnitOfWork, transaction_id: TransactionId) -> Result<Option<PaymentRecorded>, EngineError> {
    let Some(entry) = uow.entry_by_source(&EntrySource::Payment(transaction_id)).await? else {
        return Ok(None);
    };
    let escrow = uow.escrow_by_transaction(transaction_id).await?.ok_or_else(|| {
        EngineError::Fatal(format!(
            "receipt {} exists without an escrow record for {}",
            entry.entry_number, transaction_id
        ))
    })?;
    Ok(Some(PaymentRecorded {
        entry,
        escrow,
        replayed: true,
    }))
}
