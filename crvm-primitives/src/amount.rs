/// Converts an amount in smallest chain units into whole coins, given the
/// chain-wide `UNIT` constant (smallest units per whole coin).
///
/// Every component that speaks of "coins" (behavior analyzer volume
/// score, HAT economic component) derives the conversion from this
/// single constant rather than assuming a fixed number of decimals.
#[inline]
pub fn smallest_units_to_coins(amount: i64, unit: u64) -> f64 {
    if unit == 0 {
        return 0.0;
    }
    amount as f64 / unit as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_using_unit() {
        // 1 UNIT == 100_000_000 smallest units (Cascoin-style 8 decimals).
        assert_eq!(smallest_units_to_coins(150_000_000, 100_000_000), 1.5);
    }

    #[test]
    fn zero_unit_is_defined_as_zero() {
        assert_eq!(smallest_units_to_coins(1_000, 0), 0.0);
    }
}
