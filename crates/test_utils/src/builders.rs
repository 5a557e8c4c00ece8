//! Test Data Builders
//!
//! Builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, NaiveDate, Utc};
use fake::Fake;
use core_kernel::{Money, PaymentCompleted, PaymentKind, RiderId, TransactionId};
use domain_reconciliation::StatementLine;

use crate::fixtures::{MoneyFixtures, TemporalFixtures};

/// An M-Pesa style receipt reference, e.g. `QK48213907`
pub fn receipt_reference() -> String {
    let digits: u64 = (10_000_000..100_000_000).fake();
    format!("QK{}", digits)
}

/// Builder for payments delivered by the payment subsystem
pub struct PaymentBuilder {
    transaction_id: TransactionId,
    rider_id: RiderId,
    amount: Money,
    payment_kind: PaymentKind,
    receipt_reference: String,
    completed_at: DateTime<Utc>,
    payment_day: Option<u32>,
}

impl Default for PaymentBuilder {
    fn default() -> Self {
        Self::deposit()
    }
}

impl PaymentBuilder {
    /// A KES 1,048 deposit on the business morning
    pub fn deposit() -> Self {
        Self {
            transaction_id: TransactionId::new(),
            rider_id: RiderId::new(),
            amount: MoneyFixtures::deposit_total(),
            payment_kind: PaymentKind::Deposit,
            receipt_reference: receipt_reference(),
            completed_at: TemporalFixtures::business_morning(),
            payment_day: None,
        }
    }

    /// A KES 87 daily instalment on the business morning
    pub fn daily() -> Self {
        Self {
            amount: MoneyFixtures::daily_total(),
            payment_kind: PaymentKind::Daily,
            ..Self::deposit()
        }
    }

    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = id;
        self
    }

    pub fn for_rider(mut self, rider_id: RiderId) -> Self {
        self.rider_id = rider_id;
        self
    }

    /// Sets the amount in cents
    pub fn with_amount(mut self, cents: i64) -> Self {
        self.amount = Money::from_cents(cents);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.receipt_reference = reference.into();
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }

    pub fn on_payment_day(mut self, day: u32) -> Self {
        self.payment_day = Some(day);
        self
    }

    pub fn build(self) -> PaymentCompleted {
        PaymentCompleted {
            transaction_id: self.transaction_id,
            rider_id: self.rider_id,
            amount: self.amount,
            payment_kind: self.payment_kind,
            receipt_reference: self.receipt_reference,
            completed_at: self.completed_at,
            payment_day: self.payment_day,
        }
    }
}

/// Builder for an external statement
pub struct StatementBuilder {
    date: NaiveDate,
    lines: Vec<StatementLine>,
}

impl StatementBuilder {
    /// An empty statement whose lines default to `date`
    pub fn on(date: NaiveDate) -> Self {
        Self { date, lines: Vec::new() }
    }

    /// Adds money in (positive) or out (negative)
    pub fn line(mut self, reference: impl Into<String>, cents: i64) -> Self {
        self.lines.push(StatementLine {
            reference: reference.into(),
            amount: Money::from_cents(cents),
            date: self.date,
        });
        self
    }

    /// Adds a line dated away from the statement date
    pub fn line_on(mut self, reference: impl Into<String>, cents: i64, date: NaiveDate) -> Self {
        self.lines.push(StatementLine {
            reference: reference.into(),
            amount: Money::from_cents(cents),
            date,
        });
        self
    }

    /// Adds one line per payment, as the paybill statement shows them
    pub fn receipts<'a>(mut self, payments: impl IntoIterator<Item = &'a PaymentCompleted>) -> Self {
        for payment in payments {
            self = self.line(payment.receipt_reference.clone(), payment.amount.cents());
        }
        self
    }

    pub fn build(self) -> Vec<StatementLine> {
        self.lines
    }
}
