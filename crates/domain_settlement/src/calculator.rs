//! Settlement calculation over posted entries and escrow records
//!
//! Pure aggregation: nothing here moves money or changes state.

use std::collections::HashMap;

use core_kernel::{JournalEntryId, PartnerType, Period};
use domain_escrow::{EscrowRecord, RemittanceStatus};
use domain_ledger::{EntryType, JournalEntry};
use crate::error::SettlementError;
use crate::settlement::{LineDraft, SettlementLineKind};
use crate::shares::FeeShareSchedule;

/// Computes settlement lines for one partner
#[derive(Debug, Clone, Copy)]
pub struct SettlementCalculator {
    schedule: FeeShareSchedule,
}

impl SettlementCalculator {
    pub fn new(schedule: FeeShareSchedule) -> Result<Self, SettlementError> {
        schedule.validate()?;
        Ok(Self { schedule })
    }

    pub fn schedule(&self) -> &FeeShareSchedule {
        &self.schedule
    }

    /// Service-fee lines: the partner's share of each fee whose receipt is
    /// posted within the period
    ///
    /// Refunded records are skipped since their fee went back to the rider.
    pub fn service_fee_lines(
        &self,
        partner: PartnerType,
        period: Period,
        records: &[EscrowRecord],
        entries: &[JournalEntry],
    ) -> Result<Vec<LineDraft>, SettlementError> {
        let receipts: HashMap<JournalEntryId, &JournalEntry> = entries
            .iter()
            .filter(|e| matches!(e.entry_type, EntryType::PaymentReceipt { .. }))
            .map(|e| (e.id, e))
            .collect();

        let mut lines = Vec::new();
        for record in records {
            if record.status == RemittanceStatus::Refunded || record.service_fee_amount.is_zero() {
                continue;
            }
            let Some(receipt) = record.journal_entry_id.and_then(|id| receipts.get(&id)) else {
                continue;
            };
            if !receipt.is_effective() || !period.contains(receipt.entry_date) {
                continue;
            }

            let share = self.schedule.portion(record.service_fee_amount, partner)?;
            if share.is_zero() {
                continue;
            }
            lines.push(LineDraft {
                kind: SettlementLineKind::ServiceFee,
                amount: share,
                rider_id: Some(record.rider_id),
                transaction_id: Some(record.transaction_id),
                escrow_record_id: Some(record.id),
                journal_entry_id: Some(receipt.id),
                description: format!(
                    "{} share of service fee {} ({})",
                    partner, record.service_fee_amount, receipt.entry_number
                ),
            });
        }
        Ok(lines)
    }

    /// Commission lines: posted, non-reversal commission entries for the partner
    pub fn commission_lines(&self, partner: PartnerType, period: Period, entries: &[JournalEntry]) -> Vec<LineDraft> {
        entries
            .iter()
            .filter(|e| e.is_effective() && !e.is_reversal() && period.contains(e.entry_date))
            .filter(|e| matches!(e.entry_type, EntryType::Commission { partner: p } if p == partner))
            .map(|e| LineDraft {
                kind: SettlementLineKind::Commission,
                amount: e.amount(),
                rider_id: e.rider_id,
                transaction_id: None,
                escrow_record_id: None,
                journal_entry_id: Some(e.id),
                description: format!("Commission {}: {}", e.entry_number, e.description),
            })
            .collect()
    }

    /// Service-fee lines followed by commission lines
    pub fn lines_for(
        &self,
        partner: PartnerType,
        period: Period,
        records: &[EscrowRecord],
        entries: &[JournalEntry],
    ) -> Result<Vec<LineDraft>, SettlementError> {
        let mut lines = self.service_fee_lines(partner, period, records, entries)?;
        lines.extend(self.commission_lines(partner, period, entries));
        tracing::debug!(partner = %partner, lines = lines.len(), "settlement lines computed");
        Ok(lines)
    }
}
