//! Realized P&L of a resolved binary bet

use crate::types::Side;
use rust_decimal::Decimal;

/// Shares bought at `entry_price` redeem at 1.0 when the backed outcome wins,
/// and are worth nothing otherwise. No rounding is applied.
pub fn settle(side: Side, entry_price: Decimal, size: Decimal, resolved_outcome: &str) -> Decimal {
    if side.backed_outcome().eq_ignore_ascii_case(resolved_outcome.trim()) {
        (Decimal::ONE - entry_price) * size
    } else {
        -entry_price * size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BetStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_settlement_table() {
        assert_eq!(settle(Side::Buy, dec!(0.40), dec!(100), "YES"), dec!(60));
        assert_eq!(settle(Side::Buy, dec!(0.40), dec!(100), "NO"), dec!(-40));
        assert_eq!(settle(Side::Sell, dec!(0.40), dec!(100), "NO"), dec!(40));
        assert_eq!(settle(Side::Sell, dec!(0.40), dec!(100), "YES"), dec!(-40));
    }

    #[test]
    fn test_outcome_compare_is_case_insensitive() {
        assert_eq!(settle(Side::Buy, dec!(0.30), dec!(50), "yes"), dec!(35));
    }

    #[test]
    fn test_non_binary_outcome_loses() {
        assert_eq!(settle(Side::Buy, dec!(0.25), dec!(8), "CELTICS"), dec!(-2));
    }

    #[test]
    fn test_zero_stake_settles_flat_as_won() {
        let pnl = settle(Side::Sell, dec!(0.6), Decimal::ZERO, "YES");
        assert!(pnl.is_zero());
        assert_eq!(BetStatus::from_pnl(pnl), BetStatus::Won);
    }

    #[test]
    fn test_no_rounding() {
        assert_eq!(settle(Side::Buy, dec!(0.333), dec!(7), "YES"), dec!(4.669));
    }
}
