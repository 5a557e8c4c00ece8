//! Statement reconciliation
//!
//! A statement is ingested once, then worked item by item: the auto-matcher
//! links the unambiguous lines, operators link or resolve the rest, and the
//! record closes only when nothing is unmatched and the variance is zero.
//! The ledger balance is re-read on every step so the snapshot stays fresh.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use tracing::instrument;

use core_kernel::{AuditAction, EntityKind, EntityRef, JournalEntryId, Money, ReconciliationId, ReconciliationItemId};
use domain_reconciliation::matcher::{ensure_unlinked, linked_entries};
use domain_reconciliation::{
    auto_match, eligible_transactions, ledger_balance, LedgerTransaction, MatchTolerance, ReconciliationItem,
    ReconciliationRecord, ReconciliationType, StatementLine,
};

use super::{AuditTrail, EngineContext};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// Result of one auto-match run
#[derive(Debug, Clone)]
pub struct AutoMatchSummary {
    pub record: ReconciliationRecord,
    /// Items linked by this run
    pub matched: u32,
}

#[derive(Clone)]
pub struct ReconciliationService {
    ctx: EngineContext,
    tolerance: MatchTolerance,
}

/// The ledger side of a reconciliation at one instant
struct LedgerView {
    balance: Money,
    candidates: Vec<LedgerTransaction>,
}

impl ReconciliationService {
    pub fn new(ctx: EngineContext, tolerance: MatchTolerance) -> Self {
        Self { ctx, tolerance }
    }

    /// Creates a reconciliation with one UNMATCHED item per statement line
    #[instrument(skip(self, lines), fields(reconciliation_type = reconciliation_type.code(), lines = lines.len()))]
    pub async fn ingest(
        &self,
        reconciliation_type: ReconciliationType,
        date: NaiveDate,
        source_name: &str,
        lines: &[StatementLine],
        actor: &str,
    ) -> Result<ReconciliationRecord, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut record = ReconciliationRecord::new(reconciliation_type, date, source_name, actor, now)?;
        let items = record.ingest(lines, now)?;
        let view = self.ledger_view(uow.as_mut(), &record).await?;
        record.refresh_ledger_balance(view.balance, now)?;

        uow.insert_reconciliation(&record, &items).await?;
        trail.push(reconciliation_ref(&record), AuditAction::StatementIngested, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            reconciliation_id = %record.id,
            source_balance_cents = record.source_balance.cents(),
            ledger_balance_cents = record.ledger_balance.cents(),
            "Statement ingested"
        );
        Ok(record)
    }

    pub async fn get(&self, id: ReconciliationId) -> Result<(ReconciliationRecord, Vec<ReconciliationItem>), EngineError> {
        let mut uow = self.ctx.begin().await?;
        let record = locked_record(uow.as_mut(), id).await?;
        let items = uow.reconciliation_items(id).await?;
        Ok((record, items))
    }

    /// Links every UNMATCHED item that has exactly one candidate
    ///
    /// Items with no candidate, several candidates, or a candidate another
    /// item also singles out stay UNMATCHED for an operator.
    #[instrument(skip(self))]
    pub async fn run_auto_match(&self, id: ReconciliationId, actor: &str) -> Result<AutoMatchSummary, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut record = locked_record(uow.as_mut(), id).await?;
        record.ensure_open("auto-match")?;
        let mut items = uow.reconciliation_items(id).await?;
        let view = self.ledger_view(uow.as_mut(), &record).await?;

        let mut already_linked = linked_entries(&items, None);
        already_linked.extend(linked_elsewhere(uow.as_mut(), &view.candidates).await?);

        let proposals = auto_match(&items, &view.candidates, &already_linked, &self.tolerance);
        let mut matched = 0u32;
        for proposal in &proposals {
            if let Some(item) = items.iter_mut().find(|i| i.id == proposal.item_id) {
                item.auto_match(proposal.entry_id, now)?;
                uow.update_item(item).await?;
                matched += 1;
            }
        }

        record.refresh(&items, view.balance, now)?;
        uow.update_reconciliation(&record).await?;
        trail.push(reconciliation_ref(&record), AuditAction::AutoMatchRun, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(
            reconciliation_id = %record.id,
            matched,
            unmatched = record.unmatched_items,
            status = %record.status,
            "Auto-match completed"
        );
        Ok(AutoMatchSummary { record, matched })
    }

    /// Operator link between an item and a posted entry
    ///
    /// Conflict if the entry is already linked to another item of any
    /// reconciliation.
    #[instrument(skip(self, notes))]
    pub async fn manual_match(
        &self,
        id: ReconciliationId,
        item_id: ReconciliationItemId,
        entry_id: JournalEntryId,
        resolver: &str,
        notes: Option<String>,
    ) -> Result<ReconciliationRecord, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(resolver);

        let mut record = locked_record(uow.as_mut(), id).await?;
        record.ensure_open("match an item")?;
        let mut items = uow.reconciliation_items(id).await?;

        let entry = uow
            .entry(entry_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Journal entry", entry_id))?;
        if !entry.is_effective() {
            return Err(EngineError::Validation(format!(
                "entry {} is {} and cannot be matched",
                entry.entry_number, entry.status
            )));
        }
        let holders = uow.items_linked_to(&[entry_id]).await?;
        if let Err(e) = ensure_unlinked(&holders, item_id, entry_id) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(resolver, item_ref(id, item_id), AuditAction::ItemMatched, &err)
                .await;
            return Err(err);
        }

        let item = find_item(&mut items, item_id)?;
        item.manual_match(entry_id, resolver, notes, now)?;
        uow.update_item(item).await?;
        trail.push(item_ref(id, item_id), AuditAction::ItemMatched, now);

        let view = self.ledger_view(uow.as_mut(), &record).await?;
        record.refresh(&items, view.balance, now)?;
        uow.update_reconciliation(&record).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(record)
    }

    /// Closes a discrepancy that will never match; the note is mandatory
    #[instrument(skip(self, note))]
    pub async fn resolve_without_match(
        &self,
        id: ReconciliationId,
        item_id: ReconciliationItemId,
        resolver: &str,
        note: &str,
    ) -> Result<ReconciliationRecord, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(resolver);

        let mut record = locked_record(uow.as_mut(), id).await?;
        record.ensure_open("resolve an item")?;
        let mut items = uow.reconciliation_items(id).await?;

        let item = find_item(&mut items, item_id)?;
        item.resolve_without_match(resolver, note, now)?;
        uow.update_item(item).await?;
        trail.push(item_ref(id, item_id), AuditAction::ItemResolved, now);

        let view = self.ledger_view(uow.as_mut(), &record).await?;
        record.refresh(&items, view.balance, now)?;
        uow.update_reconciliation(&record).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(record)
    }

    /// → RESOLVED when fully matched and balanced against a fresh ledger balance
    #[instrument(skip(self, notes))]
    pub async fn close(
        &self,
        id: ReconciliationId,
        resolver: &str,
        notes: Option<String>,
    ) -> Result<ReconciliationRecord, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(resolver);

        let mut record = locked_record(uow.as_mut(), id).await?;
        let items = uow.reconciliation_items(id).await?;
        let view = self.ledger_view(uow.as_mut(), &record).await?;
        record.refresh(&items, view.balance, now)?;

        if let Err(e) = record.close(resolver, notes, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(resolver, reconciliation_ref(&record), AuditAction::ReconciliationClosed, &err)
                .await;
            return Err(err);
        }
        uow.update_reconciliation(&record).await?;
        trail.push(reconciliation_ref(&record), AuditAction::ReconciliationClosed, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(reconciliation_id = %record.id, "Reconciliation closed");
        Ok(record)
    }

    /// Balance over the reconciliation window, and match candidates over
    /// the window widened by the date grace on both sides
    async fn ledger_view(&self, uow: &mut dyn UnitOfWork, record: &ReconciliationRecord) -> Result<LedgerView, EngineError> {
        let tz = &self.ctx.timezone;
        let window = record.reconciliation_type.window(record.reconciliation_date, tz)?;
        let widened = tz.widen(window, self.tolerance.date_grace_days)?;

        let entries = uow.entries_between(widened.start, widened.end).await?;
        let in_window = eligible_transactions(record.reconciliation_type, window, &entries, tz)?;
        let candidates = eligible_transactions(record.reconciliation_type, widened, &entries, tz)?;

        Ok(LedgerView {
            balance: ledger_balance(&in_window)?,
            candidates,
        })
    }
}

async fn locked_record(uow: &mut dyn UnitOfWork, id: ReconciliationId) -> Result<ReconciliationRecord, EngineError> {
    uow.lock_reconciliation(id)
        .await?
        .ok_or_else(|| EngineError::not_found("Reconciliation", id))
}

/// Candidate entries already backing an item of some reconciliation
async fn linked_elsewhere(
    uow: &mut dyn UnitOfWork,
    candidates: &[LedgerTransaction],
) -> Result<HashSet<JournalEntryId>, EngineError> {
    if candidates.is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<JournalEntryId> = candidates.iter().map(|c| c.entry_id).collect();
    let holders = uow.items_linked_to(&ids).await?;
    Ok(linked_entries(&holders, None))
}

fn find_item(items: &mut [ReconciliationItem], item_id: ReconciliationItemId) -> Result<&mut ReconciliationItem, EngineError> {
    items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| EngineError::not_found("Reconciliation item", item_id))
}

fn reconciliation_ref(record: &ReconciliationRecord) -> EntityRef {
    EntityRef::new(EntityKind::Reconciliation, *record.id.as_uuid()).labelled(format!(
        "{} {}",
        record.reconciliation_type.code(),
        record.reconciliation_date
    ))
}

fn item_ref(id: ReconciliationId, item_id: ReconciliationItemId) -> EntityRef {
    EntityRef::new(EntityKind::ReconciliationItem, *item_id.as_uuid()).labelled(id.to_string())
}

