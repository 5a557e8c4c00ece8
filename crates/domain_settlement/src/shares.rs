//! Service-fee shares per partner

use serde::{Deserialize, Serialize};

use core_kernel::{Money, PartnerType};
use crate::error::SettlementError;

/// Basis points in a whole fee
pub const FULL_SHARE_BPS: u32 = 10_000;

/// How each service fee is divided between the partners
///
/// Shares are kept in `PartnerType::ALL` order so allocation is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeShareSchedule {
    bps: [u32; 4],
}

impl FeeShareSchedule {
    /// Builds a schedule; the shares must sum to 10 000 basis points
    pub fn new(kba: u32, robs_insurance: u32, definite_assurance: u32, atronach: u32) -> Result<Self, SettlementError> {
        let schedule = Self {
            bps: [kba, robs_insurance, definite_assurance, atronach],
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), SettlementError> {
        let total: u32 = self.bps.iter().sum();
        if total != FULL_SHARE_BPS {
            return Err(SettlementError::SharesIncomplete(total));
        }
        Ok(())
    }

    pub fn bps_for(&self, partner: PartnerType) -> u32 {
        self.bps[Self::index(partner)]
    }

    /// Splits one fee; the parts always sum to the fee
    pub fn split(&self, fee: Money) -> Result<Vec<(PartnerType, Money)>, SettlementError> {
        if fee.is_negative() {
            return Err(SettlementError::Validation(format!("cannot split a negative fee {}", fee)));
        }
        let parts = fee.allocate_by_bps(&self.bps)?;
        Ok(PartnerType::ALL.into_iter().zip(parts).collect())
    }

    /// The partner's part of one fee
    pub fn portion(&self, fee: Money, partner: PartnerType) -> Result<Money, SettlementError> {
        let parts = self.split(fee)?;
        Ok(parts[Self::index(partner)].1)
    }

    fn index(partner: PartnerType) -> usize {
        match partner {
            PartnerType::Kba => 0,
            PartnerType::RobsInsurance => 1,
            PartnerType::DefiniteAssurance => 2,
            PartnerType::Atronach => 3,
        }
    }
}

impl Default for FeeShareSchedule {
    fn default() -> Self {
        Self {
            bps: [2_000, 2_000, 1_000, 5_000],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_is_complete() {
        assert!(FeeShareSchedule::default().validate().is_ok());
    }

    #[test]
    fn test_incomplete_schedule_rejected() {
        assert_eq!(
            FeeShareSchedule::new(2_000, 2_000, 2_000, 2_000),
            Err(SettlementError::SharesIncomplete(8_000))
        );
    }

    #[test]
    fn test_split_of_daily_fee() {
        let schedule = FeeShareSchedule::default();
        let parts = schedule.split(Money::from_cents(300)).unwrap();
        assert_eq!(
            parts,
            vec![
                (PartnerType::Kba, Money::from_cents(60)),
                (PartnerType::RobsInsurance, Money::from_cents(60)),
                (PartnerType::DefiniteAssurance, Money::from_cents(30)),
                (PartnerType::Atronach, Money::from_cents(150)),
            ]
        );
    }

    #[test]
    fn test_odd_cent_goes_somewhere() {
        let schedule = FeeShareSchedule::new(3_333, 3_333, 3_334, 0).unwrap();
        let parts = schedule.split(Money::from_cents(1)).unwrap();
        let total: i64 = parts.iter().map(|(_, m)| m.cents()).sum();
        assert_eq!(total, 1);
        assert_eq!(schedule.portion(Money::from_cents(1), PartnerType::Atronach).unwrap(), Money::ZERO);
    }
}
