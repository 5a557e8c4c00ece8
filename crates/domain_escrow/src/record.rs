//! Escrow records
//!
//! The premium portion of every rider payment is held in escrow until it is
//! remitted to the underwriter or refunded to the rider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    EscrowRecordId, JournalEntryId, Money, RemittanceBatchId, RiderId, TransactionId,
};
use crate::error::EscrowError;

/// Remittance timing policy of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowType {
    /// Deposit-day premium, remitted the same day
    Day1Immediate,
    /// Daily premium, remitted in the monthly bulk batch
    Accumulated,
}

impl EscrowType {
    /// Payment-day ordinal 1 is the deposit day; every later day accumulates
    pub fn for_payment_day(payment_day: u32) -> Result<Self, EscrowError> {
        match payment_day {
            0 => Err(EscrowError::Validation("payment day ordinal starts at 1".to_string())),
            1 => Ok(EscrowType::Day1Immediate),
            _ => Ok(EscrowType::Accumulated),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EscrowType::Day1Immediate => "DAY1_IMMEDIATE",
            EscrowType::Accumulated => "ACCUMULATED",
        }
    }
}

impl FromStr for EscrowType {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAY1_IMMEDIATE" => Ok(EscrowType::Day1Immediate),
            "ACCUMULATED" => Ok(EscrowType::Accumulated),
            other => Err(EscrowError::Validation(format!("unknown escrow type '{}'", other))),
        }
    }
}

/// Remittance status of an escrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemittanceStatus {
    Pending,
    Scheduled,
    Remitted,
    Refunded,
}

impl RemittanceStatus {
    pub fn code(&self) -> &'static str {
        match self {
            RemittanceStatus::Pending => "PENDING",
            RemittanceStatus::Scheduled => "SCHEDULED",
            RemittanceStatus::Remitted => "REMITTED",
            RemittanceStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RemittanceStatus {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RemittanceStatus::Pending),
            "SCHEDULED" => Ok(RemittanceStatus::Scheduled),
            "REMITTED" => Ok(RemittanceStatus::Remitted),
            "REFUNDED" => Ok(RemittanceStatus::Refunded),
            other => Err(EscrowError::Validation(format!("unknown remittance status '{}'", other))),
        }
    }
}

/// Premium / service-fee split of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub total: Money,
    pub premium: Money,
    pub service_fee: Money,
}

impl PaymentSplit {
    /// Splits `total` into the configured service fee and the premium remainder
    pub fn from_total(total: Money, service_fee: Money) -> Result<Self, EscrowError> {
        if !total.is_positive() {
            return Err(EscrowError::Validation(format!("payment amount must be positive, got {}", total)));
        }
        if service_fee.is_negative() {
            return Err(EscrowError::Validation("service fee cannot be negative".to_string()));
        }
        let premium = total.checked_sub(service_fee)?;
        if !premium.is_positive() {
            return Err(EscrowError::Validation(format!(
                "payment {} does not cover the service fee {}",
                total, service_fee
            )));
        }
        Ok(Self {
            total,
            premium,
            service_fee,
        })
    }

    /// Checks an externally supplied split against the payment total
    pub fn validate(&self) -> Result<(), EscrowError> {
        if self.premium.is_negative() || self.service_fee.is_negative() {
            return Err(EscrowError::Validation("split amounts cannot be negative".to_string()));
        }
        if self.premium.checked_add(self.service_fee)? != self.total {
            return Err(EscrowError::Validation(format!(
                "premium {} + service fee {} does not equal payment {}",
                self.premium, self.service_fee, self.total
            )));
        }
        Ok(())
    }
}

/// Outcome of scheduling a record into a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled,
    /// Already in this batch; nothing changed
    Unchanged,
}

/// Premium held in escrow for one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: EscrowRecordId,
    pub rider_id: RiderId,
    pub transaction_id: TransactionId,
    /// 1 = deposit day
    pub payment_day: u32,
    pub premium_amount: Money,
    pub service_fee_amount: Money,
    pub escrow_type: EscrowType,
    pub status: RemittanceStatus,
    pub batch_id: Option<RemittanceBatchId>,
    pub remitted_at: Option<DateTime<Utc>>,
    pub remittance_reference: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reference: Option<String>,
    /// Receipt entry that booked the payment
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Records the premium of a completed payment
    pub fn record(
        rider_id: RiderId,
        transaction_id: TransactionId,
        payment_day: u32,
        split: PaymentSplit,
        journal_entry_id: Option<JournalEntryId>,
        at: DateTime<Utc>,
    ) -> Result<Self, EscrowError> {
        split.validate()?;
        Ok(Self {
            id: EscrowRecordId::new_v7(),
            rider_id,
            transaction_id,
            payment_day,
            premium_amount: split.premium,
            service_fee_amount: split.service_fee,
            escrow_type: EscrowType::for_payment_day(payment_day)?,
            status: RemittanceStatus::Pending,
            batch_id: None,
            remitted_at: None,
            remittance_reference: None,
            refunded_at: None,
            refund_reference: None,
            journal_entry_id,
            created_at: at,
            updated_at: at,
        })
    }

    /// Total of the originating payment
    pub fn payment_total(&self) -> Result<Money, EscrowError> {
        Ok(self.premium_amount.checked_add(self.service_fee_amount)?)
    }

    pub fn can_be_scheduled(&self) -> bool {
        matches!(self.status, RemittanceStatus::Pending | RemittanceStatus::Scheduled)
    }

    pub fn can_be_refunded(&self) -> bool {
        matches!(self.status, RemittanceStatus::Pending | RemittanceStatus::Scheduled)
    }

    /// PENDING → SCHEDULED into `batch_id`
    pub fn schedule(&mut self, batch_id: RemittanceBatchId, at: DateTime<Utc>) -> Result<ScheduleOutcome, EscrowError> {
        match (self.status, self.batch_id) {
            (RemittanceStatus::Scheduled, Some(current)) if current == batch_id => Ok(ScheduleOutcome::Unchanged),
            (RemittanceStatus::Scheduled, Some(current)) => Err(EscrowError::AlreadyInBatch {
                record: self.id.to_string(),
                batch: current.to_string(),
            }),
            (RemittanceStatus::Pending, _) => {
                self.status = RemittanceStatus::Scheduled;
                self.batch_id = Some(batch_id);
                self.updated_at = at;
                Ok(ScheduleOutcome::Scheduled)
            }
            (RemittanceStatus::Scheduled, None)
            | (RemittanceStatus::Remitted, _)
            | (RemittanceStatus::Refunded, _) => Err(self.invalid_transition("schedule")),
        }
    }

    /// SCHEDULED → PENDING, releasing batch membership
    pub fn release(&mut self, at: DateTime<Utc>) -> Result<RemittanceBatchId, EscrowError> {
        match (self.status, self.batch_id) {
            (RemittanceStatus::Scheduled, Some(batch_id)) => {
                self.status = RemittanceStatus::Pending;
                self.batch_id = None;
                self.updated_at = at;
                Ok(batch_id)
            }
            _ => Err(self.invalid_transition("release from batch")),
        }
    }

    /// PENDING/SCHEDULED → REFUNDED
    ///
    /// Returns the batch the record was released from, whose totals the
    /// caller must recompute.
    pub fn refund(&mut self, reference: &str, at: DateTime<Utc>) -> Result<Option<RemittanceBatchId>, EscrowError> {
        if reference.trim().is_empty() {
            return Err(EscrowError::Validation("refund reference is required".to_string()));
        }
        match self.status {
            RemittanceStatus::Pending | RemittanceStatus::Scheduled => {
                let released = self.batch_id.take();
                self.status = RemittanceStatus::Refunded;
                self.refund_reference = Some(reference.to_string());
                self.refunded_at = Some(at);
                self.updated_at = at;
                if let Some(batch_id) = released {
                    tracing::debug!(escrow_id = %self.id, %batch_id, "Refund released escrow from its batch");
                }
                Ok(released)
            }
            RemittanceStatus::Remitted | RemittanceStatus::Refunded => Err(self.invalid_transition("refund")),
        }
    }

    /// SCHEDULED → REMITTED once the batch transfer is confirmed
    pub fn mark_remitted(&mut self, bank_reference: &str, at: DateTime<Utc>) -> Result<(), EscrowError> {
        match self.status {
            RemittanceStatus::Scheduled => {
                self.status = RemittanceStatus::Remitted;
                self.remittance_reference = Some(bank_reference.to_string());
                self.remitted_at = Some(at);
                self.updated_at = at;
                Ok(())
            }
            RemittanceStatus::Pending | RemittanceStatus::Remitted | RemittanceStatus::Refunded => {
                Err(self.invalid_transition("mark remitted"))
            }
        }
    }

    fn invalid_transition(&self, action: &'static str) -> EscrowError {
        EscrowError::InvalidTransition {
            entity: format!("Escrow record {}", self.id),
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payment_day: u32) -> EscrowRecord {
        let split = PaymentSplit::from_total(Money::from_cents(104_800), Money::from_cents(3_000)).unwrap();
        EscrowRecord::record(RiderId::new(), TransactionId::new(), payment_day, split, None, Utc::now()).unwrap()
    }

    #[test]
    fn test_escrow_type_policy() {
        assert_eq!(record(1).escrow_type, EscrowType::Day1Immediate);
        assert_eq!(record(2).escrow_type, EscrowType::Accumulated);
        assert_eq!(record(30).escrow_type, EscrowType::Accumulated);
        assert!(EscrowType::for_payment_day(0).is_err());
    }

    #[test]
    fn test_split_conservation() {
        let r = record(1);
        assert_eq!(r.premium_amount, Money::from_cents(101_800));
        assert_eq!(r.payment_total().unwrap(), Money::from_cents(104_800));
    }

    #[test]
    fn test_mismatched_split_rejected() {
        let split = PaymentSplit {
            total: Money::from_cents(1_000),
            premium: Money::from_cents(800),
            service_fee: Money::from_cents(300),
        };
        let result = EscrowRecord::record(RiderId::new(), TransactionId::new(), 2, split, None, Utc::now());
        assert!(matches!(result, Err(EscrowError::Validation(_))));
    }

    #[test]
    fn test_fee_must_leave_premium() {
        assert!(PaymentSplit::from_total(Money::from_cents(300), Money::from_cents(300)).is_err());
        assert!(PaymentSplit::from_total(Money::ZERO, Money::ZERO).is_err());
    }

    #[test]
    fn test_schedule_idempotent_in_same_batch() {
        let mut r = record(1);
        let batch = RemittanceBatchId::new();
        assert_eq!(r.schedule(batch, Utc::now()).unwrap(), ScheduleOutcome::Scheduled);
        assert_eq!(r.schedule(batch, Utc::now()).unwrap(), ScheduleOutcome::Unchanged);
    }

    #[test]
    fn test_schedule_into_second_batch_conflicts() {
        let mut r = record(1);
        r.schedule(RemittanceBatchId::new(), Utc::now()).unwrap();
        let err = r.schedule(RemittanceBatchId::new(), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), core_kernel::ErrorKind::Conflict);
    }

    #[test]
    fn test_refund_releases_batch() {
        let mut r = record(2);
        let batch = RemittanceBatchId::new();
        r.schedule(batch, Utc::now()).unwrap();
        assert_eq!(r.refund("RF-001", Utc::now()).unwrap(), Some(batch));
        assert_eq!(r.status, RemittanceStatus::Refunded);
        assert!(r.batch_id.is_none());
        assert!(!r.can_be_refunded());
        assert!(!r.can_be_scheduled());
    }

    #[test]
    fn test_remitted_is_terminal() {
        let mut r = record(1);
        r.schedule(RemittanceBatchId::new(), Utc::now()).unwrap();
        r.mark_remitted("BANK-1", Utc::now()).unwrap();
        assert!(r.refund("RF-001", Utc::now()).is_err());
        assert!(r.schedule(RemittanceBatchId::new(), Utc::now()).is_err());
    }
}
