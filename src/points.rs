//! Point balance policy.
//!
//! Balances never go below zero: every award, deduction and violation goes
//! through [`apply_delta`].

pub fn apply_delta(balance: i64, delta: i64) -> i64 {
    balance.saturating_add(delta).max(0)
}

/// True when the floor (or an `i64` overflow on a deduction) cut `delta` short.
pub fn is_clamped(balance: i64, delta: i64) -> bool {
    balance.checked_add(delta).map_or(delta < 0, |v| v < 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deductions_clamp_at_zero() {
        assert_eq!(apply_delta(10, -3), 7);
        assert_eq!(apply_delta(2, -5), 0);
        assert_eq!(apply_delta(0, 4), 4);
    }

    #[test]
    fn extreme_deltas_saturate_without_overflow() {
        assert_eq!(apply_delta(5, i64::MAX), i64::MAX);
        assert!(!is_clamped(5, i64::MAX));
        assert_eq!(apply_delta(5, i64::MIN), 0);
        assert!(is_clamped(5, i64::MIN));
        assert!(is_clamped(2, -5));
        assert!(!is_clamped(10, -3));
    }

    #[test]
    fn negative_legacy_balance_is_lifted() {
        assert_eq!(apply_delta(-4, 1), 0);
    }
}
