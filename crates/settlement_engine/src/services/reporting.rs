//! Read side for reporting collaborators
//!
//! Every report carries the instant it was taken and exposes amounts as
//! `{ minor, major }`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::instrument;

use core_kernel::{Amount, PartnerType, Period, ReconciliationId, SettlementId};
use domain_ledger::{
    codes,
    reports::{balance_sheet, cash_flow, income_statement, trial_balance},
    BalanceSheet, CashFlowSummary, IncomeStatement, JournalEntry, TrialBalance,
};
use domain_reconciliation::{ReconciliationStatus, ReconciliationType};
use domain_settlement::SettlementStatus;

use super::accounts::live_account;
use super::EngineContext;
use crate::error::EngineError;

/// Header view of a partner settlement
#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub settlement_number: String,
    pub partner: PartnerType,
    pub organization_name: String,
    pub period: Period,
    pub status: SettlementStatus,
    pub service_fee_total: Amount,
    pub commission_total: Amount,
    pub total_amount: Amount,
    pub line_count: u32,
    pub as_of: DateTime<Utc>,
}

/// Header view of a reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSummary {
    pub reconciliation_type: ReconciliationType,
    pub reconciliation_date: NaiveDate,
    pub source_name: String,
    pub status: ReconciliationStatus,
    pub source_balance: Amount,
    pub ledger_balance: Amount,
    pub variance: Amount,
    pub total_items: u32,
    pub matched_items: u32,
    pub auto_matched_items: u32,
    pub manual_matched_items: u32,
    pub resolved_no_match_items: u32,
    pub unmatched_items: u32,
    pub ledger_as_of: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ReportingService {
    ctx: EngineContext,
}

impl ReportingService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Entries dated within `period`, ordered by date then number
    pub async fn entries(&self, period: Period) -> Result<Vec<JournalEntry>, EngineError> {
        let mut uow = self.ctx.begin().await?;
        Ok(uow.entries_between(period.start, period.end).await?)
    }

    #[instrument(skip(self))]
    pub async fn trial_balance(&self) -> Result<TrialBalance, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let accounts = uow.accounts().await?;
        Ok(trial_balance(&accounts, Utc::now())?)
    }

    #[instrument(skip(self))]
    pub async fn balance_sheet(&self) -> Result<BalanceSheet, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let accounts = uow.accounts().await?;
        Ok(balance_sheet(&accounts, Utc::now())?)
    }

    #[instrument(skip(self))]
    pub async fn income_statement(&self, period: Period) -> Result<IncomeStatement, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let accounts = uow.accounts().await?;
        let entries = uow.entries_between(period.start, period.end).await?;
        Ok(income_statement(&accounts, &entries, period, Utc::now())?)
    }

    /// Cash flow of the escrow bank account over `period`
    pub async fn escrow_cash_flow(&self, period: Period) -> Result<CashFlowSummary, EngineError> {
        self.cash_flow(codes::ESCROW_BANK, period).await
    }

    /// Cash flow of any account, worked back from its running balance
    #[instrument(skip(self))]
    pub async fn cash_flow(&self, account_code: &str, period: Period) -> Result<CashFlowSummary, EngineError> {
        let as_of = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let account = live_account(uow.as_mut(), account_code).await?;
        // Everything from the period start on, future-dated entries included
        let entries = uow.entries_between(period.start, DateTime::<Utc>::MAX_UTC).await?;
        Ok(cash_flow(&account, &entries, period, as_of)?)
    }

    pub async fn settlement_summary(&self, id: SettlementId) -> Result<SettlementSummary, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let s = uow
            .lock_settlement(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Partner settlement", id))?;
        Ok(SettlementSummary {
            settlement_number: s.settlement_number,
            partner: s.partner,
            organization_name: s.organization_name,
            period: s.period,
            status: s.status,
            service_fee_total: s.service_fee_total.into(),
            commission_total: s.commission_total.into(),
            total_amount: s.total_amount.into(),
            line_count: s.line_count,
            as_of: s.as_of,
        })
    }

    pub async fn reconciliation_summary(&self, id: ReconciliationId) -> Result<ReconciliationSummary, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let r = uow
            .lock_reconciliation(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Reconciliation", id))?;
        Ok(ReconciliationSummary {
            reconciliation_type: r.reconciliation_type,
            reconciliation_date: r.reconciliation_date,
            source_name: r.source_name,
            status: r.status,
            source_balance: r.source_balance.into(),
            ledger_balance: r.ledger_balance.into(),
            variance: r.variance.into(),
            total_items: r.total_items,
            matched_items: r.matched_items,
            auto_matched_items: r.auto_matched_items,
            manual_matched_items: r.manual_matched_items,
            resolved_no_match_items: r.resolved_no_match_items,
            unmatched_items: r.unmatched_items,
            ledger_as_of: r.ledger_as_of,
        })
    }
}
