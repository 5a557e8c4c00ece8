//! Unit tests for the Money module
//!
//! Tests cover creation, checked arithmetic, allocation and display.

use core_kernel::{Amount, Money, MoneyError};
use proptest::prelude::*;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_from_cents_keeps_minor_units() {
        let m = Money::from_cents(10_050);
        assert_eq!(m.cents(), 10_050);
        assert_eq!(m.to_major(), dec!(100.50));
    }

    #[test]
    fn test_from_major_scales_by_one_hundred() {
        assert_eq!(Money::from_major(30).unwrap(), Money::from_cents(3_000));
    }

    #[test]
    fn test_from_major_overflow() {
        assert_eq!(Money::from_major(i64::MAX), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_zero_constant() {
        assert!(Money::ZERO.is_zero());
        assert!(!Money::ZERO.is_positive());
        assert!(!Money::ZERO.is_negative());
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_add_and_sub() {
        let a = Money::from_cents(104_800);
        let b = Money::from_cents(3_000);
        assert_eq!(a.checked_sub(b).unwrap(), Money::from_cents(101_800));
        assert_eq!(a.checked_add(b).unwrap(), Money::from_cents(107_800));
    }

    #[test]
    fn test_checked_add_overflow() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.checked_add(Money::from_cents(1)), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_checked_sum_of_empty_is_zero() {
        assert_eq!(Money::checked_sum(Vec::new()).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_abs_of_min_overflows() {
        assert_eq!(Money::from_cents(i64::MIN).abs(), Err(MoneyError::Overflow));
        assert_eq!(Money::from_cents(-250).abs().unwrap(), Money::from_cents(250));
    }

    #[test]
    fn test_negation() {
        assert_eq!(-Money::from_cents(300), Money::from_cents(-300));
    }
}

mod allocation {
    use super::*;

    #[test]
    fn test_allocate_equal_parts_with_remainder() {
        let parts = Money::from_cents(100).allocate(3).unwrap();
        assert_eq!(parts, vec![Money::from_cents(34), Money::from_cents(33), Money::from_cents(33)]);
    }

    #[test]
    fn test_allocate_zero_parts_rejected() {
        assert!(Money::from_cents(100).allocate(0).is_err());
    }

    #[test]
    fn test_allocate_by_bps_exact() {
        let parts = Money::from_cents(10_000)
            .allocate_by_bps(&[2_500, 2_500, 2_500, 2_500])
            .unwrap();
        assert!(parts.iter().all(|p| *p == Money::from_cents(2_500)));
    }

    #[test]
    fn test_allocate_by_bps_leftover_goes_to_largest_remainder() {
        // 100 cents at 3333/3333/3334 -> 33.33, 33.33, 33.34
        let parts = Money::from_cents(100).allocate_by_bps(&[3_333, 3_333, 3_334]).unwrap();
        assert_eq!(parts, vec![Money::from_cents(33), Money::from_cents(33), Money::from_cents(34)]);
    }

    #[test]
    fn test_allocate_by_bps_rejects_negative_amount() {
        assert!(Money::from_cents(-1).allocate_by_bps(&[10_000]).is_err());
    }

    #[test]
    fn test_allocate_by_bps_rejects_zero_total() {
        assert!(Money::from_cents(100).allocate_by_bps(&[0, 0]).is_err());
    }
}

mod display {
    use super::*;

    #[test]
    fn test_display_in_major_units() {
        assert_eq!(Money::from_cents(104_800).to_string(), "KES 1048.00");
        assert_eq!(Money::from_cents(5).to_string(), "KES 0.05");
    }

    #[test]
    fn test_amount_carries_both_representations() {
        let amount = Amount::from(Money::from_cents(30_050));
        assert_eq!(amount.minor, 30_050);
        assert_eq!(amount.major, dec!(300.50));
    }
}

proptest! {
    #[test]
    fn prop_allocate_by_bps_preserves_total(
        cents in 0i64..10_000_000_000,
        shares in prop::collection::vec(1u32..10_000, 1..6),
    ) {
        let parts = Money::from_cents(cents).allocate_by_bps(&shares).unwrap();
        let total = Money::checked_sum(parts.iter().copied()).unwrap();
        prop_assert_eq!(total, Money::from_cents(cents));
        prop_assert!(parts.iter().all(|p| !p.is_negative()));
    }

    #[test]
    fn prop_allocate_preserves_total(cents in -1_000_000i64..1_000_000, n in 1u32..20) {
        let parts = Money::from_cents(cents).allocate(n).unwrap();
        prop_assert_eq!(Money::checked_sum(parts).unwrap(), Money::from_cents(cents));
    }
}
