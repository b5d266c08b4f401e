//! Settlement math
//!
//! Pure functions over pool figures; no locking and no fund movement.
//!
//! # Rules
//! 1. Void iff the winning pool or the losing pool is empty. No fee on a void market.
//! 2. fee = floor(total * 5%), net pot = total - fee.
//! 3. No-loss guarantee: if the net pot would be below the winning pool, the fee is waived.
//! 4. Winner payout = stake * net pot / winning pool, truncated. The remainder stays as dust.
//!
//! Products are taken in 256 bits: at 18-decimal token scale `stake * net_pot`
//! is far above `u128::MAX` even though the quotient always fits.

use alloy_primitives::U256;

use crate::error::LedgerError;
use crate::types::{Amount, Resolution, Settlement};
use crate::{BPS_DENOMINATOR, FEE_RATE_BPS};

/// Sum of all option pools
pub fn total_pool(option_pools: &[Amount]) -> Result<Amount, LedgerError> {
    option_pools
        .iter()
        .try_fold(0u128, |acc, p| acc.checked_add(*p))
        .ok_or(LedgerError::ArithmeticOverflow)
}

/// floor(a * b / divisor) with a 256-bit intermediate product
fn mul_div(a: Amount, b: Amount, divisor: Amount) -> Result<Amount, LedgerError> {
    if divisor == 0 {
        return Err(LedgerError::ArithmeticOverflow);
    }
    let quotient = U256::from(a) * U256::from(b) / U256::from(divisor);
    Amount::try_from(quotient).map_err(|_| LedgerError::ArithmeticOverflow)
}

/// Protocol fee on a pool, rounded down
pub fn protocol_fee(total: Amount) -> Result<Amount, LedgerError> {
    mul_div(total, FEE_RATE_BPS, BPS_DENOMINATOR)
}

/// Decide how a market settles if `winning_option_index` wins.
/// The caller has already range-checked the index.
pub fn settle(
    option_pools: &[Amount],
    winning_option_index: usize,
) -> Result<Resolution, LedgerError> {
    let total = total_pool(option_pools)?;
    let winning_pool = option_pools[winning_option_index];
    let losing_pool = total - winning_pool;

    if winning_pool == 0 || losing_pool == 0 {
        return Ok(Resolution::Voided);
    }

    let fee = protocol_fee(total)?;
    let net_pot = total - fee;

    let settlement = if net_pot < winning_pool {
        Settlement { winning_option_index, winning_pool, fee: 0, net_pot: total, fee_waived: true }
    } else {
        Settlement { winning_option_index, winning_pool, fee, net_pot, fee_waived: false }
    };

    Ok(Resolution::Settled(settlement))
}

/// Payout for a winning stake under a fixed settlement
pub fn winner_payout(stake: Amount, settlement: &Settlement) -> Result<Amount, LedgerError> {
    if stake == 0 {
        return Ok(0);
    }
    mul_div(stake, settlement.net_pot, settlement.winning_pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(pools: &[Amount], winner: usize) -> Settlement {
        match settle(pools, winner).unwrap() {
            Resolution::Settled(s) => s,
            Resolution::Voided => panic!("expected settled market for {:?}", pools),
        }
    }

    #[test]
    fn test_standard_fee() {
        let s = settled(&[100, 100], 0);
        assert_eq!(s.fee, 10);
        assert_eq!(s.net_pot, 190);
        assert_eq!(s.winning_pool, 100);
        assert!(!s.fee_waived);
        assert_eq!(winner_payout(100, &s).unwrap(), 190);
    }

    #[test]
    fn test_fee_waived_when_principal_at_risk() {
        // fee = floor(50.5) = 50, net 960 < 1000
        let s = settled(&[1000, 10], 0);
        assert!(s.fee_waived);
        assert_eq!(s.fee, 0);
        assert_eq!(s.net_pot, 1010);
        assert_eq!(winner_payout(1000, &s).unwrap(), 1010);
    }

    #[test]
    fn test_fee_kept_at_exact_boundary() {
        // total 1000, fee 50, net 950 == winning pool 950
        let s = settled(&[950, 50], 0);
        assert!(!s.fee_waived);
        assert_eq!(s.net_pot, 950);
    }

    #[test]
    fn test_void_conditions() {
        assert_eq!(settle(&[200, 0], 0).unwrap(), Resolution::Voided);
        assert_eq!(settle(&[0, 100], 0).unwrap(), Resolution::Voided);
        assert_eq!(settle(&[0, 0, 0], 1).unwrap(), Resolution::Voided);
        assert!(matches!(settle(&[0, 5, 5], 1).unwrap(), Resolution::Settled(_)));
    }

    #[test]
    fn test_fee_rounds_down() {
        assert_eq!(protocol_fee(19).unwrap(), 0);
        assert_eq!(protocol_fee(20).unwrap(), 1);
        assert_eq!(protocol_fee(1010).unwrap(), 50);
    }

    #[test]
    fn test_payouts_never_exceed_net_pot() {
        let pools = [7, 13, 29];
        let s = settled(&pools, 1);
        let stakes = [3u128, 4, 6];
        let paid: Amount = stakes.iter().map(|st| winner_payout(*st, &s).unwrap()).sum();
        assert!(paid <= s.net_pot);
        // dust is bounded by one unit per winner
        assert!(s.net_pot - paid < stakes.len() as Amount);
    }

    const TOKEN: Amount = 1_000_000_000_000_000_000;

    #[test]
    fn test_standard_fee_at_token_scale() {
        let s = settled(&[100 * TOKEN, 100 * TOKEN], 0);
        assert_eq!(s.fee, 10 * TOKEN);
        assert_eq!(s.net_pot, 190 * TOKEN);
        assert_eq!(winner_payout(100 * TOKEN, &s).unwrap(), 190 * TOKEN);
    }

    #[test]
    fn test_fee_waiver_at_token_scale() {
        let s = settled(&[1000 * TOKEN, 10 * TOKEN], 0);
        assert!(s.fee_waived);
        assert_eq!(s.net_pot, 1010 * TOKEN);
        assert_eq!(winner_payout(1000 * TOKEN, &s).unwrap(), 1010 * TOKEN);
        // one of several winners, product well above u128::MAX
        assert_eq!(winner_payout(250 * TOKEN, &s).unwrap(), 2525 * TOKEN / 10);
    }

    #[test]
    fn test_fee_on_huge_pool() {
        let total = Amount::MAX / 2;
        assert_eq!(protocol_fee(total).unwrap(), total / 20);
    }

    #[test]
    fn test_overflow_is_reported() {
        let s = Settlement {
            winning_option_index: 0,
            winning_pool: 1,
            fee: 0,
            net_pot: Amount::MAX,
            fee_waived: false,
        };
        assert_eq!(winner_payout(2, &s), Err(LedgerError::ArithmeticOverflow));
        assert_eq!(total_pool(&[Amount::MAX, 1]), Err(LedgerError::ArithmeticOverflow));
    }
}
