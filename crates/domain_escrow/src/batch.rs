//! Remittance batches
//!
//! A batch groups PENDING escrow records for one transfer to the underwriter.
//! Deposit-day premium goes out in a same-day DAY1_IMMEDIATE batch; daily
//! premium accumulates into a MONTHLY_BULK batch. Totals are always derived
//! from the member records, never maintained by hand.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{JournalEntryId, Money, RemittanceBatchId, Timezone};
use crate::error::EscrowError;
use crate::record::{EscrowRecord, EscrowType, RemittanceStatus};

/// Remittance cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchType {
    Day1Immediate,
    MonthlyBulk,
}

impl BatchType {
    pub fn code(&self) -> &'static str {
        match self {
            BatchType::Day1Immediate => "DAY1_IMMEDIATE",
            BatchType::MonthlyBulk => "MONTHLY_BULK",
        }
    }

    /// Short tag used in batch numbers
    pub fn tag(&self) -> &'static str {
        match self {
            BatchType::Day1Immediate => "D1",
            BatchType::MonthlyBulk => "MB",
        }
    }

    /// Escrow records this batch type sweeps
    pub fn escrow_type(&self) -> EscrowType {
        match self {
            BatchType::Day1Immediate => EscrowType::Day1Immediate,
            BatchType::MonthlyBulk => EscrowType::Accumulated,
        }
    }
}

impl FromStr for BatchType {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAY1_IMMEDIATE" => Ok(BatchType::Day1Immediate),
            "MONTHLY_BULK" => Ok(BatchType::MonthlyBulk),
            other => Err(EscrowError::Validation(format!("unknown batch type '{}'", other))),
        }
    }
}

/// Batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn code(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "PENDING",
            BatchStatus::Approved => "APPROVED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BatchStatus {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BatchStatus::Pending),
            "APPROVED" => Ok(BatchStatus::Approved),
            "PROCESSING" => Ok(BatchStatus::Processing),
            "COMPLETED" => Ok(BatchStatus::Completed),
            "FAILED" => Ok(BatchStatus::Failed),
            other => Err(EscrowError::Validation(format!("unknown batch status '{}'", other))),
        }
    }
}

/// Result of the external transfer for a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    Confirmed { bank_reference: String },
    Failed { reason: String },
}

/// Counter key for batches of one type on one business day
pub fn batch_sequence_key(batch_type: BatchType, batch_date: NaiveDate) -> String {
    format!(
        "RB-{:04}{:02}{:02}-{}",
        batch_date.year(),
        batch_date.month(),
        batch_date.day(),
        batch_type.tag()
    )
}

/// `RB-YYYYMMDD-D1-NNN`; sorts by date, then type, then sequence
pub fn format_batch_number(key: &str, sequence: u64) -> String {
    format!("{}-{:03}", key, sequence)
}

/// Upper bound on the creation time of records a sweep admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepCutoff {
    /// Created strictly before this instant
    Before(DateTime<Utc>),
    /// Created at or before this instant
    UpTo(DateTime<Utc>),
}

impl SweepCutoff {
    /// DAY1 batches take everything created up to the end of the batch day;
    /// monthly batches take everything up to the as-of instant.
    pub fn for_batch(
        batch_type: BatchType,
        batch_date: NaiveDate,
        as_of: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<Self, EscrowError> {
        match batch_type {
            BatchType::Day1Immediate => {
                let day = tz
                    .day_period(batch_date)
                    .map_err(|e| EscrowError::Validation(e.to_string()))?;
                Ok(SweepCutoff::Before(day.end))
            }
            BatchType::MonthlyBulk => Ok(SweepCutoff::UpTo(as_of)),
        }
    }

    pub fn admits(&self, created_at: DateTime<Utc>) -> bool {
        match self {
            SweepCutoff::Before(t) => created_at < *t,
            SweepCutoff::UpTo(t) => created_at <= *t,
        }
    }
}

/// Whether a batch of `batch_type` should pick up `record`
pub fn is_sweepable(record: &EscrowRecord, batch_type: BatchType, cutoff: SweepCutoff) -> bool {
    record.status == RemittanceStatus::Pending
        && record.batch_id.is_none()
        && record.escrow_type == batch_type.escrow_type()
        && cutoff.admits(record.created_at)
}

/// A grouped transfer of escrowed premium to the underwriter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceBatch {
    pub id: RemittanceBatchId,
    pub batch_number: String,
    pub batch_type: BatchType,
    pub batch_date: NaiveDate,
    pub total_premium_amount: Money,
    pub total_records: u32,
    pub status: BatchStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub bank_reference: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Number of transfer attempts started
    pub attempts: u32,
    /// Remittance entry posted on completion
    pub journal_entry_id: Option<JournalEntryId>,
    pub updated_at: DateTime<Utc>,
}

impl RemittanceBatch {
    pub fn open(
        batch_type: BatchType,
        batch_date: NaiveDate,
        batch_number: String,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RemittanceBatchId::new_v7(),
            batch_number,
            batch_type,
            batch_date,
            total_premium_amount: Money::ZERO,
            total_records: 0,
            status: BatchStatus::Pending,
            created_by: actor.to_string(),
            created_at: at,
            approved_by: None,
            approved_at: None,
            processed_by: None,
            processing_started_at: None,
            completed_at: None,
            bank_reference: None,
            failed_at: None,
            failure_reason: None,
            attempts: 0,
            journal_entry_id: None,
            updated_at: at,
        }
    }

    /// Recomputes totals from the records that belong to this batch
    ///
    /// Records of other batches in `members` are ignored.
    pub fn recompute_totals(&mut self, members: &[EscrowRecord], at: DateTime<Utc>) -> Result<(), EscrowError> {
        let belonging: Vec<&EscrowRecord> = members
            .iter()
            .filter(|r| {
                r.batch_id == Some(self.id)
                    && matches!(r.status, RemittanceStatus::Scheduled | RemittanceStatus::Remitted)
            })
            .collect();

        self.total_premium_amount = Money::checked_sum(belonging.iter().map(|r| r.premium_amount))?;
        self.total_records = u32::try_from(belonging.len())
            .map_err(|_| EscrowError::Validation("too many records in batch".to_string()))?;
        self.updated_at = at;
        Ok(())
    }

    pub fn can_be_approved(&self) -> bool {
        self.status == BatchStatus::Pending && self.total_records > 0
    }

    /// Empty PENDING batches are discarded instead of approved
    pub fn can_be_discarded(&self) -> bool {
        self.status == BatchStatus::Pending && self.total_records == 0
    }

    pub fn accepts_new_members(&self) -> bool {
        self.status == BatchStatus::Pending
    }

    pub fn allows_member_removal(&self) -> bool {
        matches!(self.status, BatchStatus::Pending | BatchStatus::Failed)
    }

    /// Funds are in flight or already with the underwriter
    pub fn funds_committed(&self) -> bool {
        matches!(self.status, BatchStatus::Processing | BatchStatus::Completed)
    }

    /// PENDING → APPROVED, only with at least one record
    pub fn approve(&mut self, approver: &str, at: DateTime<Utc>) -> Result<(), EscrowError> {
        if self.status == BatchStatus::Pending && self.total_records == 0 {
            return Err(self.invalid_transition("approve an empty batch"));
        }
        match self.status {
            BatchStatus::Pending => {
                self.status = BatchStatus::Approved;
                self.approved_by = Some(approver.to_string());
                self.approved_at = Some(at);
                self.updated_at = at;
                Ok(())
            }
            BatchStatus::Approved | BatchStatus::Processing | BatchStatus::Completed | BatchStatus::Failed => {
                Err(self.invalid_transition("approve"))
            }
        }
    }

    /// APPROVED → PROCESSING, or FAILED → PROCESSING to retry the same batch
    pub fn begin_processing(&mut self, actor: &str, at: DateTime<Utc>) -> Result<(), EscrowError> {
        match self.status {
            BatchStatus::Approved | BatchStatus::Failed => {
                if self.total_records == 0 {
                    return Err(self.invalid_transition("process an empty batch"));
                }
                self.status = BatchStatus::Processing;
                self.processed_by = Some(actor.to_string());
                self.processing_started_at = Some(at);
                self.attempts += 1;
                self.updated_at = at;
                tracing::debug!(batch_number = %self.batch_number, attempts = self.attempts, "Batch processing started");
                Ok(())
            }
            BatchStatus::Pending | BatchStatus::Processing | BatchStatus::Completed => {
                Err(self.invalid_transition("start processing"))
            }
        }
    }

    /// PROCESSING → COMPLETED
    pub fn complete(
        &mut self,
        bank_reference: &str,
        journal_entry_id: JournalEntryId,
        at: DateTime<Utc>,
    ) -> Result<(), EscrowError> {
        if bank_reference.trim().is_empty() {
            return Err(EscrowError::Validation("bank reference is required".to_string()));
        }
        match self.status {
            BatchStatus::Processing => {
                self.status = BatchStatus::Completed;
                self.bank_reference = Some(bank_reference.to_string());
                self.journal_entry_id = Some(journal_entry_id);
                self.completed_at = Some(at);
                self.failure_reason = None;
                self.updated_at = at;
                Ok(())
            }
            BatchStatus::Pending | BatchStatus::Approved | BatchStatus::Completed | BatchStatus::Failed => {
                Err(self.invalid_transition("complete"))
            }
        }
    }

    /// APPROVED/PROCESSING → FAILED; members stay SCHEDULED
    pub fn fail(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), EscrowError> {
        if reason.trim().is_empty() {
            return Err(EscrowError::Validation("failure reason is required".to_string()));
        }
        match self.status {
            BatchStatus::Approved | BatchStatus::Processing => {
                self.status = BatchStatus::Failed;
                self.failure_reason = Some(reason.to_string());
                self.failed_at = Some(at);
                self.updated_at = at;
                tracing::debug!(batch_number = %self.batch_number, reason, "Batch transfer failed");
                Ok(())
            }
            BatchStatus::Pending | BatchStatus::Completed | BatchStatus::Failed => Err(self.invalid_transition("fail")),
        }
    }

    pub fn ensure_status(&self, expected: BatchStatus, action: &'static str) -> Result<(), EscrowError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.invalid_transition(action))
        }
    }

    fn invalid_transition(&self, action: &'static str) -> EscrowError {
        EscrowError::InvalidTransition {
            entity: format!("Batch {}", self.batch_number),
            from: self.status.to_string(),
            action,
        }
    }
}
