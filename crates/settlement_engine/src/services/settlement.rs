//! Partner settlements and commission accrual
//!
//! Proposing a settlement only aggregates; it moves no money. Approval
//! books the partner's fee share out of service-fee payable into what the
//! partner is owed, and cancelling an approved settlement reverses that.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use core_kernel::{AuditAction, EntityKind, EntityRef, Money, PartnerType, Period, RiderId, SettlementId};
use domain_ledger::{EntrySource, EntryTemplates, JournalEntry};
use domain_settlement::{
    format_settlement_number, settlement_sequence_key, OrganizationDirectory, PartnerSettlement, SettlementCalculator,
    SettlementError, SettlementStatus,
};

use super::{posting, AuditTrail, EngineContext};
use crate::error::EngineError;
use crate::store::UnitOfWork;

#[derive(Clone)]
pub struct SettlementService {
    ctx: EngineContext,
    calculator: SettlementCalculator,
    directory: Arc<dyn OrganizationDirectory>,
}

impl SettlementService {
    pub fn new(ctx: EngineContext, calculator: SettlementCalculator, directory: Arc<dyn OrganizationDirectory>) -> Self {
        Self {
            ctx,
            calculator,
            directory,
        }
    }

    /// Builds a PROPOSED settlement for one partner over `period`
    ///
    /// # Arguments
    ///
    /// * `partner` - Partner the settlement is addressed to
    /// * `period` - Half-open window the receipts and commissions must fall in
    /// * `as_of` - Snapshot instant recorded on the settlement
    /// * `actor` - Who asked for the proposal
    ///
    /// # Errors
    ///
    /// * `NotFound` - the directory has no active organization for the partner
    /// * `Validation` - nothing in the period is owed to the partner
    #[instrument(skip(self), fields(partner = %partner))]
    pub async fn propose(
        &self,
        partner: PartnerType,
        period: Period,
        as_of: DateTime<Utc>,
        actor: &str,
    ) -> Result<PartnerSettlement, EngineError> {
        let organization = self.directory.resolve(partner).await?;
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let entries = uow.entries_between(period.start, period.end).await?;
        let records = uow.escrow_created_between(period.start, period.end).await?;
        let drafts = self.calculator.lines_for(partner, period, &records, &entries)?;

        let period_start = self.ctx.timezone.local_date(period.start);
        let key = settlement_sequence_key(partner, period_start);
        let sequence = uow.next_sequence(&key).await?;
        let settlement = PartnerSettlement::propose(
            format_settlement_number(&key, sequence),
            partner,
            organization.id,
            &organization.name,
            period,
            drafts,
            actor,
            as_of,
        )?;
        uow.insert_settlement(&settlement).await?;
        trail.push(settlement_ref(&settlement), AuditAction::SettlementProposed, as_of);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            settlement_number = %settlement.settlement_number,
            lines = settlement.line_count,
            total_cents = settlement.total_amount.cents(),
            "Settlement proposed"
        );
        Ok(settlement)
    }

    pub async fn get(&self, id: SettlementId) -> Result<PartnerSettlement, EngineError> {
        let mut uow = self.ctx.begin().await?;
        locked_settlement(uow.as_mut(), id).await
    }

    /// PROPOSED → APPROVED, booking the partner's fee share
    #[instrument(skip(self))]
    pub async fn approve(&self, id: SettlementId, approver: &str) -> Result<PartnerSettlement, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(approver);

        let mut settlement = locked_settlement(uow.as_mut(), id).await?;
        if let Err(e) = settlement.approve(approver, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(approver, settlement_ref(&settlement), AuditAction::SettlementApproved, &err)
                .await;
            return Err(err);
        }

        if settlement.service_fee_total.is_positive() {
            let request = EntryTemplates::fee_distribution(settlement.partner, settlement.service_fee_total, now, approver)
                .with_source(EntrySource::Settlement(settlement.id))
                .with_reference(settlement.settlement_number.clone());
            posting::book(uow.as_mut(), request, approver, &self.ctx.timezone, now, &mut trail).await?;
        }
        uow.update_settlement(&settlement).await?;
        trail.push(settlement_ref(&settlement), AuditAction::SettlementApproved, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(settlement)
    }

    /// APPROVED → PAID with the payout reference
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, id: SettlementId, payment_reference: &str, actor: &str) -> Result<PartnerSettlement, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut settlement = locked_settlement(uow.as_mut(), id).await?;
        if let Err(e) = settlement.mark_paid(payment_reference, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(actor, settlement_ref(&settlement), AuditAction::SettlementPaid, &err)
                .await;
            return Err(err);
        }
        uow.update_settlement(&settlement).await?;
        trail.push(settlement_ref(&settlement), AuditAction::SettlementPaid, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(settlement)
    }

    /// PROPOSED/APPROVED → CANCELLED; an approved settlement's fee
    /// distribution is reversed in the same unit of work
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: SettlementId, reason: &str, actor: &str) -> Result<PartnerSettlement, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut settlement = locked_settlement(uow.as_mut(), id).await?;
        let was_approved = settlement.status == SettlementStatus::Approved;
        if let Err(e) = settlement.cancel(reason, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(actor, settlement_ref(&settlement), AuditAction::SettlementCancelled, &err)
                .await;
            return Err(err);
        }

        if was_approved {
            if let Some(mut distribution) = uow.entry_by_source(&EntrySource::Settlement(settlement.id)).await? {
                let reason = format!("settlement {} cancelled: {}", settlement.settlement_number, reason);
                posting::reverse(uow.as_mut(), &mut distribution, &reason, actor, &self.ctx.timezone, now, &mut trail)
                    .await?;
            }
        }
        uow.update_settlement(&settlement).await?;
        trail.push(settlement_ref(&settlement), AuditAction::SettlementCancelled, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(settlement)
    }

    /// Posts a commission entry for a partner
    ///
    /// The platform's own commission is booked as a receivable and income;
    /// anyone else's as an expense owed to that partner.
    #[instrument(skip(self, reference))]
    pub async fn accrue_commission(
        &self,
        partner: PartnerType,
        amount: Money,
        rider_id: Option<RiderId>,
        reference: Option<String>,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<JournalEntry, EngineError> {
        if !amount.is_positive() {
            return Err(SettlementError::Validation(format!("commission must be positive, got {}", amount)).into());
        }
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut request = EntryTemplates::commission(partner, amount, at, actor);
        if let Some(rider_id) = rider_id {
            request = request.for_rider(rider_id);
        }
        if let Some(reference) = reference {
            request = request.with_reference(reference);
        }
        let entry = posting::book(uow.as_mut(), request, actor, &self.ctx.timezone, now, &mut trail).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(entry_number = %entry.entry_number, amount_cents = amount.cents(), "Commission accrued");
        Ok(entry)
    }
}

async fn locked_settlement(uow: &mut dyn UnitOfWork, id: SettlementId) -> Result<PartnerSettlement, EngineError> {
    uow.lock_settlement(id)
        .await?
        .ok_or_else(|| EngineError::not_found("Partner settlement", id))
}

fn settlement_ref(settlement: &PartnerSettlement) -> EntityRef {
    EntityRef::new(EntityKind::PartnerSettlement, *settlement.id.as_uuid()).labelled(settlement.settlement_number.clone())
}
