//! Partner settlement proposals

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    EscrowRecordId, JournalEntryId, Money, OrganizationId, PartnerType, Period, RiderId, SettlementId,
    SettlementLineId, TransactionId,
};
use crate::error::SettlementError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Proposed,
    Approved,
    Paid,
    Cancelled,
}

impl SettlementStatus {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementStatus::Proposed => "PROPOSED",
            SettlementStatus::Approved => "APPROVED",
            SettlementStatus::Paid => "PAID",
            SettlementStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SettlementStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPOSED" => Ok(SettlementStatus::Proposed),
            "APPROVED" => Ok(SettlementStatus::Approved),
            "PAID" => Ok(SettlementStatus::Paid),
            "CANCELLED" => Ok(SettlementStatus::Cancelled),
            other => Err(SettlementError::Validation(format!("unknown settlement status '{}'", other))),
        }
    }
}

/// What a settlement line pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementLineKind {
    ServiceFee,
    Commission,
}

impl SettlementLineKind {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementLineKind::ServiceFee => "SERVICE_FEE",
            SettlementLineKind::Commission => "COMMISSION",
        }
    }
}

impl FromStr for SettlementLineKind {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SERVICE_FEE" => Ok(SettlementLineKind::ServiceFee),
            "COMMISSION" => Ok(SettlementLineKind::Commission),
            other => Err(SettlementError::Validation(format!("unknown settlement line kind '{}'", other))),
        }
    }
}

/// One contributing record of a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLine {
    pub id: SettlementLineId,
    pub settlement_id: SettlementId,
    pub line_number: u32,
    pub kind: SettlementLineKind,
    pub amount: Money,
    pub rider_id: Option<RiderId>,
    pub transaction_id: Option<TransactionId>,
    pub escrow_record_id: Option<EscrowRecordId>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub description: String,
}

/// Line data before it is attached to a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDraft {
    pub kind: SettlementLineKind,
    pub amount: Money,
    pub rider_id: Option<RiderId>,
    pub transaction_id: Option<TransactionId>,
    pub escrow_record_id: Option<EscrowRecordId>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub description: String,
}

/// Sequence scope for settlement numbers, e.g. `ST-202403-KBA`
pub fn settlement_sequence_key(partner: PartnerType, period_start: NaiveDate) -> String {
    format!("ST-{}-{}", period_start.format("%Y%m"), partner.code())
}

pub fn format_settlement_number(key: &str, sequence: u64) -> String {
    format!("{}-{:03}", key, sequence)
}

/// Amounts owed to one partner for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSettlement {
    pub id: SettlementId,
    pub settlement_number: String,
    pub partner: PartnerType,
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub period: Period,
    pub service_fee_total: Money,
    pub commission_total: Money,
    pub total_amount: Money,
    pub line_count: u32,
    pub status: SettlementStatus,
    /// Instant of the ledger snapshot the totals were computed from
    pub as_of: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<SettlementLine>,
}

impl PartnerSettlement {
    /// Builds a PROPOSED settlement; totals are derived from the lines
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        settlement_number: String,
        partner: PartnerType,
        organization_id: OrganizationId,
        organization_name: &str,
        period: Period,
        drafts: Vec<LineDraft>,
        actor: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Self, SettlementError> {
        if drafts.is_empty() {
            return Err(SettlementError::NothingToSettle {
                partner: partner.code().to_string(),
            });
        }

        let id = SettlementId::new_v7();
        let mut service_fee_total = Money::ZERO;
        let mut commission_total = Money::ZERO;
        let mut lines = Vec::with_capacity(drafts.len());

        for (i, draft) in drafts.into_iter().enumerate() {
            if !draft.amount.is_positive() {
                return Err(SettlementError::Validation(format!(
                    "settlement line {} must be positive, got {}",
                    i + 1,
                    draft.amount
                )));
            }
            match draft.kind {
                SettlementLineKind::ServiceFee => service_fee_total = service_fee_total.checked_add(draft.amount)?,
                SettlementLineKind::Commission => commission_total = commission_total.checked_add(draft.amount)?,
            }
            lines.push(SettlementLine {
                id: SettlementLineId::new_v7(),
                settlement_id: id,
                line_number: (i + 1) as u32,
                kind: draft.kind,
                amount: draft.amount,
                rider_id: draft.rider_id,
                transaction_id: draft.transaction_id,
                escrow_record_id: draft.escrow_record_id,
                journal_entry_id: draft.journal_entry_id,
                description: draft.description,
            });
        }

        Ok(Self {
            id,
            settlement_number,
            partner,
            organization_id,
            organization_name: organization_name.to_string(),
            period,
            service_fee_total,
            commission_total,
            total_amount: service_fee_total.checked_add(commission_total)?,
            line_count: lines.len() as u32,
            status: SettlementStatus::Proposed,
            as_of,
            created_by: actor.to_string(),
            created_at: as_of,
            approved_by: None,
            approved_at: None,
            paid_at: None,
            payment_reference: None,
            cancellation_reason: None,
            updated_at: as_of,
            lines,
        })
    }

    /// PROPOSED → APPROVED
    pub fn approve(&mut self, approver: &str, at: DateTime<Utc>) -> Result<(), SettlementError> {
        match self.status {
            SettlementStatus::Proposed => {
                self.status = SettlementStatus::Approved;
                self.approved_by = Some(approver.to_string());
                self.approved_at = Some(at);
                self.updated_at = at;
                Ok(())
            }
            SettlementStatus::Approved | SettlementStatus::Paid | SettlementStatus::Cancelled => {
                Err(self.invalid_transition("approve"))
            }
        }
    }

    /// APPROVED → PAID
    pub fn mark_paid(&mut self, payment_reference: &str, at: DateTime<Utc>) -> Result<(), SettlementError> {
        if payment_reference.trim().is_empty() {
            return Err(SettlementError::Validation("payment reference is required".to_string()));
        }
        match self.status {
            SettlementStatus::Approved => {
                self.status = SettlementStatus::Paid;
                self.payment_reference = Some(payment_reference.to_string());
                self.paid_at = Some(at);
                self.updated_at = at;
                Ok(())
            }
            SettlementStatus::Proposed | SettlementStatus::Paid | SettlementStatus::Cancelled => {
                Err(self.invalid_transition("mark paid"))
            }
        }
    }

    /// PROPOSED/APPROVED → CANCELLED
    pub fn cancel(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), SettlementError> {
        match self.status {
            SettlementStatus::Proposed | SettlementStatus::Approved => {
                self.status = SettlementStatus::Cancelled;
                self.cancellation_reason = Some(reason.to_string());
                self.updated_at = at;
                Ok(())
            }
            SettlementStatus::Paid | SettlementStatus::Cancelled => Err(self.invalid_transition("cancel")),
        }
    }

    fn invalid_transition(&self, action: &'static str) -> SettlementError {
        SettlementError::InvalidTransition {
            settlement: self.settlement_number.clone(),
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn proposal(amounts: &[(SettlementLineKind, i64)]) -> Result<PartnerSettlement, SettlementError> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let drafts = amounts
            .iter()
            .map(|(kind, cents)| LineDraft {
                kind: *kind,
                amount: Money::from_cents(*cents),
                rider_id: None,
                transaction_id: None,
                escrow_record_id: None,
                journal_entry_id: None,
                description: "line".to_string(),
            })
            .collect();
        PartnerSettlement::propose(
            "ST-202403-KBA-001".to_string(),
            PartnerType::Kba,
            OrganizationId::new(),
            "Kenya Bodaboda Association",
            Period::new(start, end).unwrap(),
            drafts,
            "ops",
            end,
        )
    }

    #[test]
    fn test_totals_derived_from_lines() {
        let s = proposal(&[
            (SettlementLineKind::ServiceFee, 60),
            (SettlementLineKind::ServiceFee, 600),
            (SettlementLineKind::Commission, 5_000),
        ])
        .unwrap();
        assert_eq!(s.service_fee_total, Money::from_cents(660));
        assert_eq!(s.commission_total, Money::from_cents(5_000));
        assert_eq!(s.total_amount, Money::from_cents(5_660));
        assert_eq!(s.line_count, 3);
        assert_eq!(s.lines[2].line_number, 3);
        assert_eq!(s.status, SettlementStatus::Proposed);
    }

    #[test]
    fn test_empty_proposal_rejected() {
        assert!(matches!(proposal(&[]), Err(SettlementError::NothingToSettle { .. })));
    }

    #[test]
    fn test_payment_requires_approval() {
        let mut s = proposal(&[(SettlementLineKind::ServiceFee, 60)]).unwrap();
        let now = Utc::now();
        assert!(s.mark_paid("BANK-1", now).is_err());
        s.approve("finance", now).unwrap();
        s.mark_paid("BANK-1", now).unwrap();
        assert_eq!(s.status, SettlementStatus::Paid);
        assert!(s.cancel("late", now).is_err());
    }

    #[test]
    fn test_settlement_number() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let key = settlement_sequence_key(PartnerType::RobsInsurance, date);
        assert_eq!(format_settlement_number(&key, 7), "ST-202403-ROBS_INSURANCE-007");
    }
}
