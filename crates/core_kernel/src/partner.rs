//! Partner organizations and payment vocabulary shared by every domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identifiers::{RiderId, TransactionId};
use crate::money::Money;

/// Organizations that receive a share of collected funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerType {
    /// Cooperative body representing riders
    Kba,
    /// Insurance agency
    RobsInsurance,
    /// Underwriter
    DefiniteAssurance,
    /// Platform operator
    Atronach,
}

impl PartnerType {
    pub const ALL: [PartnerType; 4] = [
        PartnerType::Kba,
        PartnerType::RobsInsurance,
        PartnerType::DefiniteAssurance,
        PartnerType::Atronach,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PartnerType::Kba => "KBA",
            PartnerType::RobsInsurance => "ROBS_INSURANCE",
            PartnerType::DefiniteAssurance => "DEFINITE_ASSURANCE",
            PartnerType::Atronach => "ATRONACH",
        }
    }
}

impl fmt::Display for PartnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PartnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartnerType::ALL
            .into_iter()
            .find(|p| p.code() == s)
            .ok_or_else(|| format!("unknown partner type '{}'", s))
    }
}

/// Kind of rider payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    /// Initial deposit, always payment day 1
    Deposit,
    /// Daily instalment
    Daily,
}

impl PaymentKind {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentKind::Deposit => "DEPOSIT",
            PaymentKind::Daily => "DAILY",
        }
    }
}

impl FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(PaymentKind::Deposit),
            "DAILY" => Ok(PaymentKind::Daily),
            other => Err(format!("unknown payment kind '{}'", other)),
        }
    }
}

/// Completed-transaction event delivered by the payment subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub transaction_id: TransactionId,
    pub rider_id: RiderId,
    pub amount: Money,
    pub payment_kind: PaymentKind,
    /// M-Pesa style receipt reference
    pub receipt_reference: String,
    pub completed_at: DateTime<Utc>,
    /// Payment-day ordinal if the payment subsystem already knows it
    pub payment_day: Option<u32>,
}
