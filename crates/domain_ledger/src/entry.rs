//! Journal entries and their lines
//!
//! An entry moves DRAFT → PENDING_APPROVAL → APPROVED → POSTED and may end
//! up REVERSED. Lines are written once at creation; afterwards only status
//! and audit fields change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{
    AccountId, JournalEntryId, JournalLineId, Money, PartnerType, PaymentKind,
    RemittanceBatchId, RiderId, SettlementId, TransactionId,
};
use crate::account::GlAccount;
use crate::error::LedgerError;

/// What kind of accounting event an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    PaymentReceipt { kind: PaymentKind },
    Remittance,
    FeeDistribution { partner: PartnerType },
    Refund,
    Commission { partner: PartnerType },
    Adjustment,
}

/// Entry type without its payload, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryCategory {
    PaymentReceipt,
    Remittance,
    FeeDistribution,
    Refund,
    Commission,
    Adjustment,
}

impl EntryCategory {
    pub fn code(&self) -> &'static str {
        match self {
            EntryCategory::PaymentReceipt => "PAYMENT_RECEIPT",
            EntryCategory::Remittance => "REMITTANCE",
            EntryCategory::FeeDistribution => "FEE_DISTRIBUTION",
            EntryCategory::Refund => "REFUND",
            EntryCategory::Commission => "COMMISSION",
            EntryCategory::Adjustment => "ADJUSTMENT",
        }
    }
}

impl EntryType {
    pub fn category(&self) -> EntryCategory {
        match self {
            EntryType::PaymentReceipt { .. } => EntryCategory::PaymentReceipt,
            EntryType::Remittance => EntryCategory::Remittance,
            EntryType::FeeDistribution { .. } => EntryCategory::FeeDistribution,
            EntryType::Refund => EntryCategory::Refund,
            EntryType::Commission { .. } => EntryCategory::Commission,
            EntryType::Adjustment => EntryCategory::Adjustment,
        }
    }

    /// The payload of the variant as a storable string
    pub fn detail(&self) -> Option<&'static str> {
        match self {
            EntryType::PaymentReceipt { kind } => Some(kind.code()),
            EntryType::FeeDistribution { partner } | EntryType::Commission { partner } => Some(partner.code()),
            EntryType::Remittance | EntryType::Refund | EntryType::Adjustment => None,
        }
    }

    /// Rebuilds a type from its stored `(category code, detail)` pair
    pub fn from_parts(code: &str, detail: Option<&str>) -> Result<Self, LedgerError> {
        let missing = || LedgerError::Validation(format!("entry type {} requires a detail", code));
        let parse_partner = |d: &str| d.parse::<PartnerType>().map_err(LedgerError::Validation);

        match code {
            "PAYMENT_RECEIPT" => {
                let kind = detail.ok_or_else(missing)?.parse::<PaymentKind>().map_err(LedgerError::Validation)?;
                Ok(EntryType::PaymentReceipt { kind })
            }
            "REMITTANCE" => Ok(EntryType::Remittance),
            "FEE_DISTRIBUTION" => Ok(EntryType::FeeDistribution {
                partner: parse_partner(detail.ok_or_else(missing)?)?,
            }),
            "REFUND" => Ok(EntryType::Refund),
            "COMMISSION" => Ok(EntryType::Commission {
                partner: parse_partner(detail.ok_or_else(missing)?)?,
            }),
            "ADJUSTMENT" => Ok(EntryType::Adjustment),
            other => Err(LedgerError::Validation(format!("unknown entry type '{}'", other))),
        }
    }
}

/// Journal entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Draft,
    PendingApproval,
    Approved,
    Posted,
    Reversed,
}

impl EntryStatus {
    pub fn code(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "DRAFT",
            EntryStatus::PendingApproval => "PENDING_APPROVAL",
            EntryStatus::Approved => "APPROVED",
            EntryStatus::Posted => "POSTED",
            EntryStatus::Reversed => "REVERSED",
        }
    }

    /// POSTED (unless reversed) and REVERSED accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Reversed)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(EntryStatus::Draft),
            "PENDING_APPROVAL" => Ok(EntryStatus::PendingApproval),
            "APPROVED" => Ok(EntryStatus::Approved),
            "POSTED" => Ok(EntryStatus::Posted),
            "REVERSED" => Ok(EntryStatus::Reversed),
            other => Err(LedgerError::Validation(format!("unknown entry status '{}'", other))),
        }
    }
}

/// The business event an entry was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySource {
    /// Completed rider payment; at most one entry per transaction
    Payment(TransactionId),
    Refund(TransactionId),
    RemittanceBatch(RemittanceBatchId),
    Settlement(SettlementId),
}

impl EntrySource {
    pub fn code(&self) -> &'static str {
        match self {
            EntrySource::Payment(_) => "PAYMENT",
            EntrySource::Refund(_) => "REFUND",
            EntrySource::RemittanceBatch(_) => "REMITTANCE_BATCH",
            EntrySource::Settlement(_) => "SETTLEMENT",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            EntrySource::Payment(id) | EntrySource::Refund(id) => *id.as_uuid(),
            EntrySource::RemittanceBatch(id) => *id.as_uuid(),
            EntrySource::Settlement(id) => *id.as_uuid(),
        }
    }

    pub fn from_parts(code: &str, id: Uuid) -> Result<Self, LedgerError> {
        match code {
            "PAYMENT" => Ok(EntrySource::Payment(id.into())),
            "REFUND" => Ok(EntrySource::Refund(id.into())),
            "REMITTANCE_BATCH" => Ok(EntrySource::RemittanceBatch(id.into())),
            "SETTLEMENT" => Ok(EntrySource::Settlement(id.into())),
            other => Err(LedgerError::Validation(format!("unknown entry source '{}'", other))),
        }
    }
}

/// One requested line: exactly one of debit or credit must be positive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub account_code: String,
    pub debit: Money,
    pub credit: Money,
}

impl LineRequest {
    pub fn debit(account_code: impl Into<String>, amount: Money) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Money::ZERO,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: Money) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Money::ZERO,
            credit: amount,
        }
    }
}

/// Request to create a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub entry_type: EntryType,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub lines: Vec<LineRequest>,
    pub source: Option<EntrySource>,
    pub rider_id: Option<RiderId>,
    /// M-Pesa receipt or bank reference
    pub external_reference: Option<String>,
    pub created_by: String,
    /// Set only on reversal entries
    pub reverses: Option<JournalEntryId>,
}

impl NewJournalEntry {
    pub fn new(
        entry_type: EntryType,
        entry_date: DateTime<Utc>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            entry_type,
            entry_date,
            description: description.into(),
            lines: Vec::new(),
            source: None,
            rider_id: None,
            external_reference: None,
            created_by: created_by.into(),
            reverses: None,
        }
    }

    pub fn debit(mut self, account_code: impl Into<String>, amount: Money) -> Self {
        self.lines.push(LineRequest::debit(account_code, amount));
        self
    }

    pub fn credit(mut self, account_code: impl Into<String>, amount: Money) -> Self {
        self.lines.push(LineRequest::credit(account_code, amount));
        self
    }

    pub fn with_source(mut self, source: EntrySource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn for_rider(mut self, rider_id: RiderId) -> Self {
        self.rider_id = Some(rider_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }
}

/// Validates requested lines and returns the common total
///
/// Rejects empty entries, negative amounts, lines with both or neither side
/// set, and unbalanced totals. Nothing is corrected.
pub fn validate_lines(lines: &[LineRequest]) -> Result<Money, LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyEntry);
    }

    let mut debits = Money::ZERO;
    let mut credits = Money::ZERO;

    for (i, line) in lines.iter().enumerate() {
        let one_sided = (line.debit.is_positive() && line.credit.is_zero())
            || (line.credit.is_positive() && line.debit.is_zero());
        if !one_sided {
            return Err(LedgerError::InvalidLine {
                line: i + 1,
                debit: line.debit.cents(),
                credit: line.credit.cents(),
            });
        }
        debits = debits.checked_add(line.debit)?;
        credits = credits.checked_add(line.credit)?;
    }

    if debits != credits {
        return Err(LedgerError::UnbalancedEntry { debits, credits });
    }

    Ok(debits)
}

/// A single line of a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    pub entry_id: JournalEntryId,
    /// 1-based, unique within the entry
    pub line_number: u32,
    pub account_id: AccountId,
    /// Account code at the time of creation
    pub account_code: String,
    pub debit: Money,
    pub credit: Money,
}

/// A journal entry with its lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub entry_number: String,
    pub entry_date: DateTime<Utc>,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub description: String,
    pub total_debit: Money,
    pub total_credit: Money,
    pub source: Option<EntrySource>,
    pub rider_id: Option<RiderId>,
    pub external_reference: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    /// Entry that reverses this one
    pub reversing_entry_id: Option<JournalEntryId>,
    /// Entry this one reverses
    pub original_entry_id: Option<JournalEntryId>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Builds a DRAFT entry
    ///
    /// `accounts` must be the resolved accounts of `request.lines`, in line
    /// order. Every account must accept postings.
    pub fn draft(
        entry_number: String,
        request: NewJournalEntry,
        accounts: &[GlAccount],
        at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let total = validate_lines(&request.lines)?;

        if request.description.trim().is_empty() {
            return Err(LedgerError::Validation("entry description is required".to_string()));
        }
        if accounts.len() != request.lines.len() {
            return Err(LedgerError::Validation(format!(
                "{} lines but {} resolved accounts",
                request.lines.len(),
                accounts.len()
            )));
        }

        let id = JournalEntryId::new_v7();
        let mut lines = Vec::with_capacity(request.lines.len());
        for (i, (line, account)) in request.lines.iter().zip(accounts).enumerate() {
            if account.code != line.account_code {
                return Err(LedgerError::AccountNotFound(line.account_code.clone()));
            }
            account.ensure_accepts_postings()?;
            lines.push(JournalLine {
                id: JournalLineId::new_v7(),
                entry_id: id,
                line_number: (i + 1) as u32,
                account_id: account.id,
                account_code: account.code.clone(),
                debit: line.debit,
                credit: line.credit,
            });
        }

        Ok(Self {
            id,
            entry_number,
            entry_date: request.entry_date,
            entry_type: request.entry_type,
            status: EntryStatus::Draft,
            description: request.description,
            total_debit: total,
            total_credit: total,
            source: request.source,
            rider_id: request.rider_id,
            external_reference: request.external_reference,
            created_by: request.created_by,
            created_at: at,
            approved_by: None,
            approved_at: None,
            posted_at: None,
            reversed_by: None,
            reversed_at: None,
            reversal_reason: None,
            reversing_entry_id: None,
            original_entry_id: request.reverses,
            updated_at: at,
            lines,
        })
    }

    /// The amount moved by this entry
    pub fn amount(&self) -> Money {
        self.total_debit
    }

    pub fn is_reversal(&self) -> bool {
        self.original_entry_id.is_some()
    }

    /// Posted and still in effect
    pub fn is_effective(&self) -> bool {
        self.status == EntryStatus::Posted
    }

    /// Debit and credit totals recomputed from the lines
    pub fn line_totals(&self) -> Result<(Money, Money), LedgerError> {
        let debits = Money::checked_sum(self.lines.iter().map(|l| l.debit))?;
        let credits = Money::checked_sum(self.lines.iter().map(|l| l.credit))?;
        Ok((debits, credits))
    }

    /// Recomputes balance from lines, ignoring the stored totals
    pub fn ensure_balanced(&self) -> Result<(), LedgerError> {
        if self.lines.is_empty() {
            return Err(LedgerError::EmptyEntry);
        }
        for line in &self.lines {
            let one_sided = (line.debit.is_positive() && line.credit.is_zero())
                || (line.credit.is_positive() && line.debit.is_zero());
            if !one_sided {
                return Err(LedgerError::InvalidLine {
                    line: line.line_number as usize,
                    debit: line.debit.cents(),
                    credit: line.credit.cents(),
                });
            }
        }
        let (debits, credits) = self.line_totals()?;
        if debits != credits || debits != self.total_debit || credits != self.total_credit {
            return Err(LedgerError::UnbalancedEntry { debits, credits });
        }
        Ok(())
    }

    /// Net signed effect of this entry on one account (debit minus credit)
    pub fn net_debit_for(&self, account_code: &str) -> Result<Money, LedgerError> {
        let mut net = Money::ZERO;
        for line in self.lines.iter().filter(|l| l.account_code == account_code) {
            net = net.checked_add(line.debit)?.checked_sub(line.credit)?;
        }
        Ok(net)
    }

    /// DRAFT → PENDING_APPROVAL
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            EntryStatus::Draft => {
                self.status = EntryStatus::PendingApproval;
                self.updated_at = at;
                Ok(())
            }
            EntryStatus::PendingApproval
            | EntryStatus::Approved
            | EntryStatus::Posted
            | EntryStatus::Reversed => Err(self.invalid_transition("submit")),
        }
    }

    /// PENDING_APPROVAL → APPROVED
    pub fn approve(&mut self, approver: &str, at: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            EntryStatus::PendingApproval => {
                self.status = EntryStatus::Approved;
                self.approved_by = Some(approver.to_string());
                self.approved_at = Some(at);
                self.updated_at = at;
                Ok(())
            }
            EntryStatus::Draft
            | EntryStatus::Approved
            | EntryStatus::Posted
            | EntryStatus::Reversed => Err(self.invalid_transition("approve")),
        }
    }

    /// Builds the request for an entry that cancels this one
    ///
    /// Same type and accounts, every line's sides swapped.
    pub fn reversal_request(&self, reason: &str, actor: &str, at: DateTime<Utc>) -> Result<NewJournalEntry, LedgerError> {
        self.ensure_reversible()?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("reversal reason is required".to_string()));
        }

        Ok(NewJournalEntry {
            entry_type: self.entry_type,
            entry_date: at,
            description: format!("Reversal of {}: {}", self.entry_number, reason),
            lines: self
                .lines
                .iter()
                .map(|l| LineRequest {
                    account_code: l.account_code.clone(),
                    debit: l.credit,
                    credit: l.debit,
                })
                .collect(),
            source: None,
            rider_id: self.rider_id,
            external_reference: self.external_reference.clone(),
            created_by: actor.to_string(),
            reverses: Some(self.id),
        })
    }

    pub fn ensure_reversible(&self) -> Result<(), LedgerError> {
        if self.reversing_entry_id.is_some() {
            return Err(LedgerError::AlreadyReversed(self.entry_number.clone()));
        }
        match self.status {
            EntryStatus::Posted => Ok(()),
            EntryStatus::Reversed => Err(LedgerError::AlreadyReversed(self.entry_number.clone())),
            EntryStatus::Draft | EntryStatus::PendingApproval | EntryStatus::Approved => {
                Err(self.invalid_transition("reverse"))
            }
        }
    }

    pub(crate) fn invalid_transition(&self, action: &'static str) -> LedgerError {
        LedgerError::InvalidTransition {
            entry_number: self.entry_number.clone(),
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountType, NewAccount};

    fn accounts() -> (GlAccount, GlAccount) {
        let now = Utc::now();
        (
            GlAccount::open(NewAccount::new("1100", "Bank", AccountType::Asset), None, now).unwrap(),
            GlAccount::open(NewAccount::new("2100", "Premium Payable", AccountType::Liability), None, now).unwrap(),
        )
    }

    fn request(amount: i64) -> NewJournalEntry {
        NewJournalEntry::new(EntryType::Adjustment, Utc::now(), "Test", "tester")
            .debit("1100", Money::from_cents(amount))
            .credit("2100", Money::from_cents(amount))
    }

    #[test]
    fn test_validate_lines_rejects_empty() {
        assert_eq!(validate_lines(&[]), Err(LedgerError::EmptyEntry));
    }

    #[test]
    fn test_validate_lines_rejects_two_sided_line() {
        let lines = vec![LineRequest {
            account_code: "1100".to_string(),
            debit: Money::from_cents(10),
            credit: Money::from_cents(10),
        }];
        assert!(matches!(validate_lines(&lines), Err(LedgerError::InvalidLine { line: 1, .. })));
    }

    #[test]
    fn test_validate_lines_rejects_zero_line() {
        let lines = vec![LineRequest::debit("1100", Money::ZERO)];
        assert!(matches!(validate_lines(&lines), Err(LedgerError::InvalidLine { .. })));
    }

    #[test]
    fn test_validate_lines_rejects_negative_amount() {
        let lines = vec![
            LineRequest::debit("1100", Money::from_cents(-5)),
            LineRequest::credit("2100", Money::from_cents(-5)),
        ];
        assert!(matches!(validate_lines(&lines), Err(LedgerError::InvalidLine { .. })));
    }

    #[test]
    fn test_validate_lines_rejects_unbalanced() {
        let lines = vec![
            LineRequest::debit("1100", Money::from_cents(100)),
            LineRequest::credit("2100", Money::from_cents(90)),
        ];
        assert!(matches!(validate_lines(&lines), Err(LedgerError::UnbalancedEntry { .. })));
    }

    #[test]
    fn test_draft_numbers_lines_and_totals() {
        let (bank, payable) = accounts();
        let entry = JournalEntry::draft("JE-202401-000001".into(), request(500), &[bank, payable], Utc::now()).unwrap();
        assert_eq!(entry.status, EntryStatus::Draft);
        assert_eq!(entry.total_debit, Money::from_cents(500));
        assert_eq!(entry.total_credit, Money::from_cents(500));
        assert_eq!(entry.lines.iter().map(|l| l.line_number).collect::<Vec<_>>(), vec![1, 2]);
        assert!(entry.ensure_balanced().is_ok());
    }

    #[test]
    fn test_draft_rejects_inactive_account() {
        let (bank, mut payable) = accounts();
        payable.deactivate(Utc::now()).unwrap();
        let result = JournalEntry::draft("JE-202401-000001".into(), request(500), &[bank, payable], Utc::now());
        assert!(matches!(result, Err(LedgerError::AccountNotActive { .. })));
    }

    #[test]
    fn test_approve_requires_pending_approval() {
        let (bank, payable) = accounts();
        let mut entry = JournalEntry::draft("JE-202401-000001".into(), request(500), &[bank, payable], Utc::now()).unwrap();
        let err = entry.approve("checker", Utc::now()).unwrap_err();
        assert_eq!(err.kind(), core_kernel::ErrorKind::InvalidStateTransition);

        entry.submit(Utc::now()).unwrap();
        entry.approve("checker", Utc::now()).unwrap();
        assert_eq!(entry.status, EntryStatus::Approved);
        assert_eq!(entry.approved_by.as_deref(), Some("checker"));
    }

    #[test]
    fn test_tampered_line_detected() {
        let (bank, payable) = accounts();
        let mut entry = JournalEntry::draft("JE-202401-000001".into(), request(500), &[bank, payable], Utc::now()).unwrap();
        entry.lines[0].debit = Money::from_cents(501);
        assert!(matches!(entry.ensure_balanced(), Err(LedgerError::UnbalancedEntry { .. })));
    }

    #[test]
    fn test_reversal_request_requires_posted() {
        let (bank, payable) = accounts();
        let entry = JournalEntry::draft("JE-202401-000001".into(), request(500), &[bank, payable], Utc::now()).unwrap();
        assert!(entry.reversal_request("mistake", "ops", Utc::now()).is_err());
    }

    #[test]
    fn test_entry_type_parts_round_trip() {
        let types = [
            EntryType::PaymentReceipt { kind: PaymentKind::Daily },
            EntryType::Remittance,
            EntryType::FeeDistribution { partner: PartnerType::Kba },
            EntryType::Refund,
            EntryType::Commission { partner: PartnerType::RobsInsurance },
            EntryType::Adjustment,
        ];
        for t in types {
            assert_eq!(EntryType::from_parts(t.category().code(), t.detail()).unwrap(), t);
        }
        assert!(EntryType::from_parts("COMMISSION", None).is_err());
    }
}
