//! Inventory-skew calculator
//!
//! Maps current base/quote holdings and a target base percentage to a pair
//! of bid/ask size multipliers in [0, 2]. Within the tolerated inventory
//! range the two ratios average to 1 so total quoted size is preserved;
//! outside it one side saturates at 0 and the other at 2.
//!
//! Internal math runs on f64; the ratios are converted back to decimals
//! before they touch order sizes.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Bid/ask size multipliers produced by the skew calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidAskRatios {
    pub bid_ratio: Decimal,
    pub ask_ratio: Decimal,
}

impl BidAskRatios {
    fn new(bid_ratio: f64, ask_ratio: f64) -> Self {
        Self {
            bid_ratio: Decimal::from_f64(bid_ratio).unwrap_or(Decimal::ZERO),
            ask_ratio: Decimal::from_f64(ask_ratio).unwrap_or(Decimal::ZERO),
        }
    }
}

/// Compute bid/ask multipliers from the current base asset ratio.
///
/// `base_amount` is the base inventory available to sell, `quote_amount`
/// the quote inventory available to buy with, `base_range` the tolerated
/// inventory range in base units (total order size times the range
/// multiplier).
pub fn bid_ask_ratios_from_base_ratio(
    base_amount: f64,
    quote_amount: f64,
    price: f64,
    target_base_pct: f64,
    base_range: f64,
) -> BidAskRatios {
    let total_value = base_amount * price + quote_amount;
    if !total_value.is_finite() || total_value <= 0.0 {
        return BidAskRatios::new(0.0, 0.0);
    }

    let base_value = base_amount * price;
    let deviation = base_value / total_value - target_base_pct;
    let range_value = base_range * price;
    if range_value <= 0.0 {
        // Degenerate range: saturate on any deviation at all.
        if deviation > 0.0 {
            return BidAskRatios::new(0.0, 2.0);
        }
        if deviation < 0.0 {
            return BidAskRatios::new(2.0, 0.0);
        }
        return BidAskRatios::new(1.0, 1.0);
    }

    let tilt = (deviation.abs() * total_value / range_value).min(1.0);
    if deviation >= 0.0 {
        // Too much base: shrink bids, grow asks.
        BidAskRatios::new(1.0 - tilt, 1.0 + tilt)
    } else {
        BidAskRatios::new(1.0 + tilt, 1.0 - tilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn on_target_ratios_are_one() {
        // 1 base @ 100 + 100 quote = 200 total, base ratio exactly 0.5.
        let ratios = bid_ask_ratios_from_base_ratio(1.0, 100.0, 100.0, 0.5, 1.0);
        assert_eq!(ratios.bid_ratio, dec!(1));
        assert_eq!(ratios.ask_ratio, dec!(1));
    }

    #[test]
    fn ratios_average_to_one_within_range() {
        // Base ratio 0.625 vs target 0.5 with range value 100: the tilt is
        // 0.125 * 200 / 100 = 0.25, so bids shrink to 0.75 and asks grow to
        // 1.25 (all dyadic, so the f64 internals are exact).
        let ratios = bid_ask_ratios_from_base_ratio(1.25, 75.0, 100.0, 0.5, 1.0);
        assert_eq!(ratios.bid_ratio, dec!(0.75));
        assert_eq!(ratios.ask_ratio, dec!(1.25));
        assert_eq!(ratios.bid_ratio + ratios.ask_ratio, dec!(2));
    }

    #[test]
    fn too_much_base_saturates_at_zero_and_two() {
        // All base, nothing in quote, tiny range: bids off, asks doubled.
        let ratios = bid_ask_ratios_from_base_ratio(10.0, 0.0, 100.0, 0.5, 0.1);
        assert_eq!(ratios.bid_ratio, dec!(0));
        assert_eq!(ratios.ask_ratio, dec!(2));
    }

    #[test]
    fn too_little_base_saturates_the_other_way() {
        let ratios = bid_ask_ratios_from_base_ratio(0.0, 1000.0, 100.0, 0.5, 0.1);
        assert_eq!(ratios.bid_ratio, dec!(2));
        assert_eq!(ratios.ask_ratio, dec!(0));
    }

    #[test]
    fn ratios_stay_in_bounds_across_inputs() {
        for base in [0.0, 0.5, 1.0, 5.0, 50.0] {
            for quote in [0.0, 10.0, 100.0, 10_000.0] {
                for target in [0.1, 0.5, 0.9] {
                    let ratios =
                        bid_ask_ratios_from_base_ratio(base, quote, 37.0, target, 2.0);
                    assert!(ratios.bid_ratio >= Decimal::ZERO && ratios.bid_ratio <= dec!(2));
                    assert!(ratios.ask_ratio >= Decimal::ZERO && ratios.ask_ratio <= dec!(2));
                }
            }
        }
    }

    #[test]
    fn empty_portfolio_quotes_nothing() {
        let ratios = bid_ask_ratios_from_base_ratio(0.0, 0.0, 100.0, 0.5, 1.0);
        assert_eq!(ratios.bid_ratio, dec!(0));
        assert_eq!(ratios.ask_ratio, dec!(0));
    }
}
