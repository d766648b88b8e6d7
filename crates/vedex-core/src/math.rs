//! Checked fixed-point helpers shared by both ledgers.

use crate::{LedgerError, Result, Timestamp};

// The macro body needs the std two-argument `Result` in scope.
mod wide {
    use uint::construct_uint;

    construct_uint! {
        /// 256-bit integer for `a * b / c` intermediates on 18-decimal `u128` amounts.
        pub struct U256(4);
    }
}

pub use wide::U256;

/// One token unit at 18 decimals.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// `floor(a * b / denom)` without intermediate overflow.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(LedgerError::Overflow("division by zero"));
    }
    let out = U256::from(a) * U256::from(b) / U256::from(denom);
    if out > U256::from(u128::MAX) {
        return Err(LedgerError::Overflow("u128 overflow in mul_div"));
    }
    Ok(out.low_u128())
}

pub fn add_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b)
        .ok_or(LedgerError::Overflow("u128 overflow in add"))
}

pub fn sub_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b)
        .ok_or(LedgerError::Overflow("u128 underflow in sub"))
}

pub fn add_ts(a: Timestamp, b: u64) -> Result<Timestamp> {
    a.checked_add(b)
        .ok_or(LedgerError::Overflow("timestamp overflow"))
}

/// Round `t` down to the start of its epoch.
pub fn round_to_epoch(t: Timestamp, epoch_length: u64) -> Timestamp {
    if epoch_length == 0 {
        return t;
    }
    (t / epoch_length) * epoch_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_handles_wide_intermediates() {
        let r = mul_div_floor(10 * WAD, 3 * WAD, 4 * WAD).unwrap();
        assert_eq!(r, 7_500_000_000_000_000_000);
        // (2^127)^2 overflows u128 but the quotient fits.
        let big = 1u128 << 127;
        assert_eq!(mul_div_floor(big, big, big).unwrap(), big);
    }

    #[test]
    fn mul_div_floors_and_rejects_zero_denominator() {
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert!(matches!(
            mul_div_floor(1, 1, 0),
            Err(LedgerError::Overflow(_))
        ));
        assert!(mul_div_floor(u128::MAX, u128::MAX, 1).is_err());
    }

    #[test]
    fn wide_type_parses_and_formats() {
        let v = U256::from_dec_str("340282366920938463463374607431768211456").unwrap();
        assert_eq!(v, U256::from(u128::MAX) + U256::from(1u8));
        assert_eq!(v.to_string(), "340282366920938463463374607431768211456");
        assert!(U256::from_dec_str("12x").is_err());
    }

    #[test]
    fn epoch_rounding_is_floor() {
        let week = 604_800;
        assert_eq!(round_to_epoch(0, week), 0);
        assert_eq!(round_to_epoch(week - 1, week), 0);
        assert_eq!(round_to_epoch(week, week), week);
        assert_eq!(round_to_epoch(3 * week + 17, week), 3 * week);
    }
}
