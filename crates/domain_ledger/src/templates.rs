//! Builders for the entries the collection platform posts routinely

use chrono::{DateTime, Utc};

use core_kernel::{Money, PartnerType, PaymentKind};
use crate::chart::{codes, partner_account};
use crate::entry::{EntryType, NewJournalEntry};
use crate::error::LedgerError;

/// Builder for common collection-platform entries
pub struct EntryTemplates;

impl EntryTemplates {
    /// Rider payment landing in the escrow bank
    ///
    /// Dr escrow bank (total); Cr premium payable (premium); Cr service fee
    /// payable (fee). Zero-amount sides are left out.
    pub fn payment_receipt(
        kind: PaymentKind,
        total: Money,
        premium: Money,
        service_fee: Money,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<NewJournalEntry, LedgerError> {
        if total != premium.checked_add(service_fee)? {
            return Err(LedgerError::Validation(format!(
                "premium {} + service fee {} does not equal payment {}",
                premium, service_fee, total
            )));
        }

        let description = match kind {
            PaymentKind::Deposit => "Deposit payment received",
            PaymentKind::Daily => "Daily payment received",
        };
        let mut request = NewJournalEntry::new(EntryType::PaymentReceipt { kind }, at, description, actor)
            .debit(codes::ESCROW_BANK, total);
        if premium.is_positive() {
            request = request.credit(codes::PREMIUM_PAYABLE, premium);
        }
        if service_fee.is_positive() {
            request = request.credit(codes::SERVICE_FEE_PAYABLE, service_fee);
        }
        Ok(request)
    }

    /// Transfer of escrowed premium to the underwriter
    ///
    /// Settles the premium-payable liability against the escrow bank asset.
    pub fn remittance(amount: Money, at: DateTime<Utc>, actor: &str) -> NewJournalEntry {
        NewJournalEntry::new(EntryType::Remittance, at, "Premium remitted to underwriter", actor)
            .debit(codes::PREMIUM_PAYABLE, amount)
            .credit(codes::ESCROW_BANK, amount)
    }

    /// Refund of a payment still held in escrow
    pub fn refund(
        premium: Money,
        service_fee: Money,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<NewJournalEntry, LedgerError> {
        let total = premium.checked_add(service_fee)?;
        let mut request = NewJournalEntry::new(EntryType::Refund, at, "Payment refunded to rider", actor);
        if premium.is_positive() {
            request = request.debit(codes::PREMIUM_PAYABLE, premium);
        }
        if service_fee.is_positive() {
            request = request.debit(codes::SERVICE_FEE_PAYABLE, service_fee);
        }
        Ok(request.credit(codes::ESCROW_BANK, total))
    }

    /// Moves a partner's share of collected service fees to what it is owed
    pub fn fee_distribution(partner: PartnerType, amount: Money, at: DateTime<Utc>, actor: &str) -> NewJournalEntry {
        NewJournalEntry::new(
            EntryType::FeeDistribution { partner },
            at,
            format!("Service fee share for {}", partner),
            actor,
        )
        .debit(codes::SERVICE_FEE_PAYABLE, amount)
        .credit(partner_account(partner), amount)
    }

    /// Commission accrued for a partner on a policy issuance
    ///
    /// Commission earned by the platform itself is a receivable; commission
    /// owed to anyone else is an expense.
    pub fn commission(partner: PartnerType, amount: Money, at: DateTime<Utc>, actor: &str) -> NewJournalEntry {
        let request = NewJournalEntry::new(
            EntryType::Commission { partner },
            at,
            format!("Commission accrued for {}", partner),
            actor,
        );
        match partner {
            PartnerType::Atronach => request
                .debit(codes::COMMISSION_RECEIVABLE, amount)
                .credit(codes::COMMISSION_INCOME, amount),
            PartnerType::Kba | PartnerType::RobsInsurance | PartnerType::DefiniteAssurance => request
                .debit(codes::COMMISSION_EXPENSE, amount)
                .credit(partner_account(partner), amount),
        }
    }
}
