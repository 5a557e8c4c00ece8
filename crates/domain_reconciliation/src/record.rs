//! Reconciliation records and their statement items

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{JournalEntryId, Money, Period, ReconciliationId, ReconciliationItemId, Timezone};
use domain_ledger::EntryCategory;
use crate::error::ReconciliationError;

/// What is being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationType {
    /// Mobile-money paybill statement for one business day
    DailyMpesa,
    /// Bank statement for one business month
    MonthlyBank,
    /// Partner settlement statement for one business month
    PartnerSettlement,
}

impl ReconciliationType {
    pub fn code(&self) -> &'static str {
        match self {
            ReconciliationType::DailyMpesa => "DAILY_MPESA",
            ReconciliationType::MonthlyBank => "MONTHLY_BANK",
            ReconciliationType::PartnerSettlement => "PARTNER_SETTLEMENT",
        }
    }

    /// Entry categories that appear on this kind of statement
    pub fn is_eligible(&self, category: EntryCategory) -> bool {
        match self {
            ReconciliationType::DailyMpesa => {
                matches!(category, EntryCategory::PaymentReceipt | EntryCategory::Refund)
            }
            ReconciliationType::MonthlyBank => matches!(
                category,
                EntryCategory::Remittance | EntryCategory::FeeDistribution | EntryCategory::Refund
            ),
            ReconciliationType::PartnerSettlement => {
                matches!(category, EntryCategory::FeeDistribution | EntryCategory::Commission)
            }
        }
    }

    /// Ledger window compared against the statement
    pub fn window(&self, date: NaiveDate, tz: &Timezone) -> Result<Period, ReconciliationError> {
        let period = match self {
            ReconciliationType::DailyMpesa => tz.day_period(date)?,
            ReconciliationType::MonthlyBank | ReconciliationType::PartnerSettlement => tz.month_period(date)?,
        };
        Ok(period)
    }
}

impl FromStr for ReconciliationType {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY_MPESA" => Ok(ReconciliationType::DailyMpesa),
            "MONTHLY_BANK" => Ok(ReconciliationType::MonthlyBank),
            "PARTNER_SETTLEMENT" => Ok(ReconciliationType::PartnerSettlement),
            other => Err(ReconciliationError::Validation(format!("unknown reconciliation type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Pending,
    InProgress,
    Matched,
    Unmatched,
    PartiallyResolved,
    Resolved,
}

impl ReconciliationStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "PENDING",
            ReconciliationStatus::InProgress => "IN_PROGRESS",
            ReconciliationStatus::Matched => "MATCHED",
            ReconciliationStatus::Unmatched => "UNMATCHED",
            ReconciliationStatus::PartiallyResolved => "PARTIALLY_RESOLVED",
            ReconciliationStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReconciliationStatus {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReconciliationStatus::Pending),
            "IN_PROGRESS" => Ok(ReconciliationStatus::InProgress),
            "MATCHED" => Ok(ReconciliationStatus::Matched),
            "UNMATCHED" => Ok(ReconciliationStatus::Unmatched),
            "PARTIALLY_RESOLVED" => Ok(ReconciliationStatus::PartiallyResolved),
            "RESOLVED" => Ok(ReconciliationStatus::Resolved),
            other => Err(ReconciliationError::Validation(format!("unknown reconciliation status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Unmatched,
    AutoMatched,
    ManuallyMatched,
    ResolvedNoMatch,
}

impl MatchStatus {
    pub fn code(&self) -> &'static str {
        match self {
            MatchStatus::Unmatched => "UNMATCHED",
            MatchStatus::AutoMatched => "AUTO_MATCHED",
            MatchStatus::ManuallyMatched => "MANUALLY_MATCHED",
            MatchStatus::ResolvedNoMatch => "RESOLVED_NO_MATCH",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MatchStatus {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNMATCHED" => Ok(MatchStatus::Unmatched),
            "AUTO_MATCHED" => Ok(MatchStatus::AutoMatched),
            "MANUALLY_MATCHED" => Ok(MatchStatus::ManuallyMatched),
            "RESOLVED_NO_MATCH" => Ok(MatchStatus::ResolvedNoMatch),
            other => Err(ReconciliationError::Validation(format!("unknown match status '{}'", other))),
        }
    }
}

/// One line of an external statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub reference: String,
    /// Signed: money in is positive, money out negative
    pub amount: Money,
    pub date: NaiveDate,
}

/// A statement line under reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub id: ReconciliationItemId,
    pub reconciliation_id: ReconciliationId,
    pub line_number: u32,
    pub external_reference: String,
    pub amount: Money,
    pub transaction_date: NaiveDate,
    pub match_status: MatchStatus,
    /// Linked ledger transaction
    pub journal_entry_id: Option<JournalEntryId>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReconciliationItem {
    pub fn is_unmatched(&self) -> bool {
        self.match_status == MatchStatus::Unmatched
    }

    /// UNMATCHED → AUTO_MATCHED
    pub fn auto_match(&mut self, entry_id: JournalEntryId, at: DateTime<Utc>) -> Result<(), ReconciliationError> {
        match self.match_status {
            MatchStatus::Unmatched => {
                self.match_status = MatchStatus::AutoMatched;
                self.journal_entry_id = Some(entry_id);
                self.resolved_by = Some("auto-matcher".to_string());
                self.resolved_at = Some(at);
                Ok(())
            }
            MatchStatus::AutoMatched | MatchStatus::ManuallyMatched | MatchStatus::ResolvedNoMatch => {
                Err(self.invalid_transition("auto-match"))
            }
        }
    }

    /// Operator link; permitted whatever the auto-matcher decided
    pub fn manual_match(
        &mut self,
        entry_id: JournalEntryId,
        resolver: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), ReconciliationError> {
        if resolver.trim().is_empty() {
            return Err(ReconciliationError::Validation("resolver identity is required".to_string()));
        }
        self.match_status = MatchStatus::ManuallyMatched;
        self.journal_entry_id = Some(entry_id);
        self.resolved_by = Some(resolver.to_string());
        self.notes = notes;
        self.resolved_at = Some(at);
        Ok(())
    }

    /// Closes a genuine discrepancy that will never match; the note is mandatory
    pub fn resolve_without_match(&mut self, resolver: &str, note: &str, at: DateTime<Utc>) -> Result<(), ReconciliationError> {
        if note.trim().is_empty() {
            return Err(ReconciliationError::Validation("a note is required to resolve without a match".to_string()));
        }
        if resolver.trim().is_empty() {
            return Err(ReconciliationError::Validation("resolver identity is required".to_string()));
        }
        match self.match_status {
            MatchStatus::Unmatched | MatchStatus::AutoMatched => {
                self.match_status = MatchStatus::ResolvedNoMatch;
                self.journal_entry_id = None;
                self.resolved_by = Some(resolver.to_string());
                self.notes = Some(note.to_string());
                self.resolved_at = Some(at);
                Ok(())
            }
            MatchStatus::ManuallyMatched | MatchStatus::ResolvedNoMatch => {
                Err(self.invalid_transition("resolve without match"))
            }
        }
    }

    fn invalid_transition(&self, action: &str) -> ReconciliationError {
        ReconciliationError::InvalidTransition {
            entity: format!("Item {} ({})", self.line_number, self.external_reference),
            from: self.match_status.to_string(),
            action: action.to_string(),
        }
    }
}

/// A reconciliation of one statement against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: ReconciliationId,
    pub reconciliation_type: ReconciliationType,
    pub reconciliation_date: NaiveDate,
    pub source_name: String,
    pub source_balance: Money,
    pub ledger_balance: Money,
    /// source_balance - ledger_balance
    pub variance: Money,
    pub status: ReconciliationStatus,
    pub total_items: u32,
    /// Auto plus manual matches
    pub matched_items: u32,
    pub unmatched_items: u32,
    pub auto_matched_items: u32,
    pub manual_matched_items: u32,
    pub resolved_no_match_items: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Snapshot instant of `ledger_balance`
    pub ledger_as_of: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    /// Creates a PENDING record
    pub fn new(
        reconciliation_type: ReconciliationType,
        reconciliation_date: NaiveDate,
        source_name: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Self, ReconciliationError> {
        if source_name.trim().is_empty() {
            return Err(ReconciliationError::Validation("statement source name is required".to_string()));
        }
        Ok(Self {
            id: ReconciliationId::new_v7(),
            reconciliation_type,
            reconciliation_date,
            source_name: source_name.to_string(),
            source_balance: Money::ZERO,
            ledger_balance: Money::ZERO,
            variance: Money::ZERO,
            status: ReconciliationStatus::Pending,
            total_items: 0,
            matched_items: 0,
            unmatched_items: 0,
            auto_matched_items: 0,
            manual_matched_items: 0,
            resolved_no_match_items: 0,
            created_by: actor.to_string(),
            created_at: at,
            ledger_as_of: None,
            resolved_by: None,
            resolved_at: None,
            notes: None,
            updated_at: at,
        })
    }

    /// PENDING → IN_PROGRESS with one UNMATCHED item per statement line
    pub fn ingest(&mut self, lines: &[StatementLine], at: DateTime<Utc>) -> Result<Vec<ReconciliationItem>, ReconciliationError> {
        if self.status != ReconciliationStatus::Pending {
            return Err(self.invalid_transition("ingest a statement"));
        }
        for (i, line) in lines.iter().enumerate() {
            if line.reference.trim().is_empty() {
                return Err(ReconciliationError::Validation(format!("statement line {} has no reference", i + 1)));
            }
            if line.amount.is_zero() {
                return Err(ReconciliationError::Validation(format!("statement line {} has a zero amount", i + 1)));
            }
        }

        let items: Vec<ReconciliationItem> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| ReconciliationItem {
                id: ReconciliationItemId::new_v7(),
                reconciliation_id: self.id,
                line_number: (i + 1) as u32,
                external_reference: line.reference.clone(),
                amount: line.amount,
                transaction_date: line.date,
                match_status: MatchStatus::Unmatched,
                journal_entry_id: None,
                resolved_by: None,
                notes: None,
                resolved_at: None,
            })
            .collect();

        self.source_balance = Money::checked_sum(lines.iter().map(|l| l.amount))?;
        self.count_items(&items)?;
        self.variance = self.source_balance.checked_sub(self.ledger_balance)?;
        self.status = ReconciliationStatus::InProgress;
        self.updated_at = at;
        Ok(items)
    }

    /// Records a fresh ledger balance snapshot
    pub fn refresh_ledger_balance(&mut self, ledger_balance: Money, as_of: DateTime<Utc>) -> Result<(), ReconciliationError> {
        self.ledger_balance = ledger_balance;
        self.variance = self.source_balance.checked_sub(ledger_balance)?;
        self.ledger_as_of = Some(as_of);
        self.updated_at = as_of;
        Ok(())
    }

    /// Recomputes counters, balances and status after item changes
    pub fn refresh(
        &mut self,
        items: &[ReconciliationItem],
        ledger_balance: Money,
        as_of: DateTime<Utc>,
    ) -> Result<(), ReconciliationError> {
        self.ensure_open("update items")?;
        self.count_items(items)?;
        self.refresh_ledger_balance(ledger_balance, as_of)?;

        self.status = if self.total_items == 0 {
            ReconciliationStatus::InProgress
        } else if self.unmatched_items == 0 {
            ReconciliationStatus::Matched
        } else if self.unmatched_items == self.total_items {
            ReconciliationStatus::Unmatched
        } else {
            ReconciliationStatus::PartiallyResolved
        };
        Ok(())
    }

    fn count_items(&mut self, items: &[ReconciliationItem]) -> Result<(), ReconciliationError> {
        let count = |status: MatchStatus| items.iter().filter(|i| i.match_status == status).count() as u32;

        self.total_items = u32::try_from(items.len())
            .map_err(|_| ReconciliationError::Validation("too many statement lines".to_string()))?;
        self.auto_matched_items = count(MatchStatus::AutoMatched);
        self.manual_matched_items = count(MatchStatus::ManuallyMatched);
        self.resolved_no_match_items = count(MatchStatus::ResolvedNoMatch);
        self.unmatched_items = count(MatchStatus::Unmatched);
        self.matched_items = self.auto_matched_items + self.manual_matched_items;
        Ok(())
    }

    /// No UNMATCHED items left, and there was at least one
    pub fn is_fully_matched(&self) -> bool {
        self.unmatched_items == 0 && self.total_items > 0
    }

    pub fn is_balanced(&self) -> bool {
        self.variance.is_zero()
    }

    pub fn is_closed(&self) -> bool {
        self.status == ReconciliationStatus::Resolved
    }

    /// → RESOLVED, only when fully matched and balanced
    pub fn close(&mut self, resolver: &str, notes: Option<String>, at: DateTime<Utc>) -> Result<(), ReconciliationError> {
        self.ensure_open("close")?;
        if !self.is_fully_matched() {
            return Err(self.invalid_transition(&format!(
                "close with {} unmatched of {} items",
                self.unmatched_items, self.total_items
            )));
        }
        if !self.is_balanced() {
            return Err(self.invalid_transition(&format!("close with variance {}", self.variance)));
        }
        self.status = ReconciliationStatus::Resolved;
        self.resolved_by = Some(resolver.to_string());
        self.resolved_at = Some(at);
        self.notes = notes;
        self.updated_at = at;
        Ok(())
    }

    pub fn ensure_open(&self, action: &str) -> Result<(), ReconciliationError> {
        match self.status {
            ReconciliationStatus::Pending | ReconciliationStatus::Resolved => Err(self.invalid_transition(action)),
            ReconciliationStatus::InProgress
            | ReconciliationStatus::Matched
            | ReconciliationStatus::Unmatched
            | ReconciliationStatus::PartiallyResolved => Ok(()),
        }
    }

    fn invalid_transition(&self, action: &str) -> ReconciliationError {
        ReconciliationError::InvalidTransition {
            entity: format!("Reconciliation {} {}", self.reconciliation_type.code(), self.reconciliation_date),
            from: self.status.to_string(),
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn lines(amounts: &[i64]) -> Vec<StatementLine> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| StatementLine {
                reference: format!("QX{}", i),
                amount: Money::from_cents(*a),
                date: date(),
            })
            .collect()
    }

    fn ingested(amounts: &[i64]) -> (ReconciliationRecord, Vec<ReconciliationItem>) {
        let mut record = ReconciliationRecord::new(ReconciliationType::DailyMpesa, date(), "M-Pesa", "ops", Utc::now()).unwrap();
        let items = record.ingest(&lines(amounts), Utc::now()).unwrap();
        (record, items)
    }

    #[test]
    fn test_ingest_sums_source_balance() {
        let (record, items) = ingested(&[1_000, 2_500, -300]);
        assert_eq!(record.source_balance, Money::from_cents(3_200));
        assert_eq!(record.status, ReconciliationStatus::InProgress);
        assert_eq!(record.unmatched_items, 3);
        assert!(items.iter().all(|i| i.is_unmatched()));
        assert_eq!(items[2].line_number, 3);
    }

    #[test]
    fn test_fully_matched_requires_items() {
        let (mut record, items) = ingested(&[]);
        record.refresh(&items, Money::ZERO, Utc::now()).unwrap();
        assert!(!record.is_fully_matched());
        assert!(record.is_balanced());
        assert!(record.close("ops", None, Utc::now()).is_err());
    }

    #[test]
    fn test_close_requires_zero_variance() {
        let (mut record, mut items) = ingested(&[1_000]);
        items[0].manual_match(JournalEntryId::new(), "ops", None, Utc::now()).unwrap();
        record.refresh(&items, Money::from_cents(900), Utc::now()).unwrap();

        assert!(record.is_fully_matched());
        assert!(!record.is_balanced());
        assert_eq!(record.variance, Money::from_cents(100));
        assert_eq!(record.status, ReconciliationStatus::Matched);
        assert!(record.close("ops", None, Utc::now()).is_err());

        record.refresh(&items, Money::from_cents(1_000), Utc::now()).unwrap();
        record.close("ops", Some("clean".into()), Utc::now()).unwrap();
        assert!(record.is_closed());
        assert!(record.refresh(&items, Money::from_cents(1_000), Utc::now()).is_err());
    }

    #[test]
    fn test_partial_status() {
        let (mut record, mut items) = ingested(&[1_000, 2_000]);
        items[0].resolve_without_match("ops", "bank fee", Utc::now()).unwrap();
        record.refresh(&items, Money::ZERO, Utc::now()).unwrap();
        assert_eq!(record.status, ReconciliationStatus::PartiallyResolved);
        assert_eq!(record.resolved_no_match_items, 1);
        assert_eq!(record.unmatched_items, 1);
    }

    #[test]
    fn test_resolve_requires_note() {
        let (_, mut items) = ingested(&[1_000]);
        assert!(matches!(
            items[0].resolve_without_match("ops", "  ", Utc::now()),
            Err(ReconciliationError::Validation(_))
        ));
        assert!(items[0].is_unmatched());
    }

    #[test]
    fn test_manual_match_overrides_auto_match() {
        let (_, mut items) = ingested(&[1_000]);
        let auto = JournalEntryId::new();
        let manual = JournalEntryId::new();
        items[0].auto_match(auto, Utc::now()).unwrap();
        items[0].manual_match(manual, "ops", Some("wrong receipt".into()), Utc::now()).unwrap();
        assert_eq!(items[0].journal_entry_id, Some(manual));
        assert_eq!(items[0].match_status, MatchStatus::ManuallyMatched);
    }

    #[test]
    fn test_eligibility_by_type() {
        assert!(ReconciliationType::DailyMpesa.is_eligible(EntryCategory::PaymentReceipt));
        assert!(!ReconciliationType::DailyMpesa.is_eligible(EntryCategory::Remittance));
        assert!(ReconciliationType::MonthlyBank.is_eligible(EntryCategory::Remittance));
        assert!(ReconciliationType::PartnerSettlement.is_eligible(EntryCategory::Commission));
        assert!(!ReconciliationType::PartnerSettlement.is_eligible(EntryCategory::Adjustment));
    }
}
