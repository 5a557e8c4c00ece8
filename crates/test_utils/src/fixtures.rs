//! Pre-built Test Fixtures
//!
//! Ready-to-use data for the collection ledger: the business calendar, the
//! standard chart opened as live accounts, and the reference payments the
//! fee split is specified against.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use core_kernel::{Money, PaymentCompleted, PaymentKind, Period, RiderId, Timezone, TransactionId};
use domain_ledger::{standard_chart, GlAccount};
use domain_reconciliation::StatementLine;

/// Fixture for money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// KES 1,048: the standard deposit
    pub fn deposit_total() -> Money {
        Money::from_cents(104_800)
    }

    /// KES 1,018 of premium within the standard deposit
    pub fn deposit_premium() -> Money {
        Money::from_cents(101_800)
    }

    /// KES 30 deposit service fee
    pub fn deposit_fee() -> Money {
        Money::from_cents(3_000)
    }

    /// KES 87: a daily instalment
    pub fn daily_total() -> Money {
        Money::from_cents(8_700)
    }

    /// KES 3 daily service fee
    pub fn daily_fee() -> Money {
        Money::from_cents(300)
    }
}

/// Fixture for business-calendar test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Africa/Nairobi, the business timezone
    pub fn nairobi() -> Timezone {
        Timezone::default()
    }

    /// A business day in the middle of a month
    pub fn business_date() -> NaiveDate {
        Self::date(2024, 3, 15)
    }

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
    }

    /// A Nairobi wall-clock time as a UTC instant
    pub fn local_instant(date: NaiveDate, hour: i64, minute: i64) -> DateTime<Utc> {
        let midnight = Self::nairobi().start_of_day(date).expect("Nairobi has no DST gaps");
        midnight + Duration::hours(hour) + Duration::minutes(minute)
    }

    /// 10:30 on the business date
    pub fn business_morning() -> DateTime<Utc> {
        Self::local_instant(Self::business_date(), 10, 30)
    }

    /// The business month containing the business date
    pub fn business_month() -> Period {
        Self::nairobi()
            .month_period(Self::business_date())
            .expect("valid business month")
    }
}

/// Fixture for the chart of accounts
pub struct ChartFixtures;

impl ChartFixtures {
    /// The standard chart opened as live, zero-balance accounts
    pub fn standard_accounts(at: DateTime<Utc>) -> Vec<GlAccount> {
        let mut ids = HashMap::new();
        let mut accounts = Vec::new();
        for request in standard_chart() {
            let parent_id = request.parent_code.as_ref().map(|code| ids[code]);
            let account = GlAccount::open(request, parent_id, at).expect("standard chart is valid");
            ids.insert(account.code.clone(), account.id);
            accounts.push(account);
        }
        accounts
    }

    /// The account with `code`
    pub fn by_code<'a>(accounts: &'a [GlAccount], code: &str) -> &'a GlAccount {
        accounts
            .iter()
            .find(|a| a.code == code)
            .unwrap_or_else(|| panic!("no account {} in fixture chart", code))
    }
}

/// Fixture for payments delivered by the payment subsystem
pub struct PaymentFixtures;

impl PaymentFixtures {
    /// The KES 1,048 deposit, completed on the business morning
    pub fn deposit(rider_id: RiderId) -> PaymentCompleted {
        Self::deposit_at(rider_id, TemporalFixtures::business_morning())
    }

    pub fn deposit_at(rider_id: RiderId, completed_at: DateTime<Utc>) -> PaymentCompleted {
        PaymentCompleted {
            transaction_id: TransactionId::new(),
            rider_id,
            amount: MoneyFixtures::deposit_total(),
            payment_kind: PaymentKind::Deposit,
            receipt_reference: format!("QKD{}", rider_id.as_uuid().simple()).chars().take(10).collect(),
            completed_at,
            payment_day: None,
        }
    }

    /// A KES 87 daily instalment with the next payment day left to the ledger
    pub fn daily_at(rider_id: RiderId, completed_at: DateTime<Utc>) -> PaymentCompleted {
        PaymentCompleted {
            transaction_id: TransactionId::new(),
            rider_id,
            amount: MoneyFixtures::daily_total(),
            payment_kind: PaymentKind::Daily,
            receipt_reference: format!("QKA{}", completed_at.timestamp()),
            completed_at,
            payment_day: None,
        }
    }
}

/// Fixture for statement lines
pub struct StatementFixtures;

impl StatementFixtures {
    pub fn line(reference: impl Into<String>, cents: i64, date: NaiveDate) -> StatementLine {
        StatementLine {
            reference: reference.into(),
            amount: Money::from_cents(cents),
            date,
        }
    }
}
