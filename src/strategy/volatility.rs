//! Rolling range-based volatility estimator
//!
//! Keeps a bounded mid-price history per market and computes an average
//! range ratio: the buffer is partitioned into consecutive windows of
//! `interval` samples walking backward from the newest one, each window
//! contributes `(max - min) / min`, and the volatility is the mean over up
//! to `periods` windows. Markets without a full window are undefined.

use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

use crate::domain::TradingPair;

pub struct VolatilityEstimator {
    interval: usize,
    periods: usize,
    mid_prices: HashMap<TradingPair, VecDeque<Decimal>>,
    volatility: HashMap<TradingPair, Option<Decimal>>,
}

impl VolatilityEstimator {
    pub fn new(interval: usize, periods: usize) -> Self {
        Self {
            interval: interval.max(1),
            periods: periods.max(1),
            mid_prices: HashMap::new(),
            volatility: HashMap::new(),
        }
    }

    /// Maximum retained history per market.
    fn max_len(&self) -> usize {
        self.interval * self.periods
    }

    /// Append the latest mid price for a market, dropping the oldest sample
    /// once the buffer is full.
    pub fn record(&mut self, market: &TradingPair, mid_price: Decimal) {
        let max_len = self.max_len();
        let buffer = self.mid_prices.entry(market.clone()).or_default();
        buffer.push_back(mid_price);
        while buffer.len() > max_len {
            buffer.pop_front();
        }
    }

    /// Recompute the volatility map from the current buffers.
    pub fn update(&mut self) {
        let mut volatility = HashMap::new();
        for (market, buffer) in &self.mid_prices {
            volatility.insert(market.clone(), Self::average_range_ratio(
                buffer,
                self.interval,
                self.periods,
            ));
        }
        self.volatility = volatility;
    }

    /// Latest computed volatility; `None` until a full window exists or when
    /// the market has no sensible ratio.
    pub fn volatility(&self, market: &TradingPair) -> Option<Decimal> {
        self.volatility.get(market).copied().flatten()
    }

    /// Snapshot of the full volatility map for status rendering.
    pub fn all(&self) -> &HashMap<TradingPair, Option<Decimal>> {
        &self.volatility
    }

    pub fn history_len(&self, market: &TradingPair) -> usize {
        self.mid_prices.get(market).map_or(0, VecDeque::len)
    }

    fn average_range_ratio(
        buffer: &VecDeque<Decimal>,
        interval: usize,
        periods: usize,
    ) -> Option<Decimal> {
        let samples: Vec<Decimal> = buffer.iter().copied().collect();
        let mut ratios: Vec<Decimal> = Vec::new();
        let mut end = samples.len();
        while end >= interval && ratios.len() < periods {
            let window = &samples[end - interval..end];
            let mut min = window[0];
            let mut max = window[0];
            for price in &window[1..] {
                if *price < min {
                    min = *price;
                }
                if *price > max {
                    max = *price;
                }
            }
            if min.is_zero() {
                return None;
            }
            ratios.push((max - min) / min);
            end -= interval;
        }
        if ratios.is_empty() {
            return None;
        }
        let sum: Decimal = ratios.iter().sum();
        Some(sum / Decimal::from(ratios.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(raw: &str) -> TradingPair {
        raw.parse().expect("valid pair")
    }

    fn record_all(est: &mut VolatilityEstimator, market: &TradingPair, prices: &[Decimal]) {
        for price in prices {
            est.record(market, *price);
        }
        est.update();
    }

    #[test]
    fn undefined_until_a_full_window() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(3, 2);
        record_all(&mut est, &market, &[dec!(100), dec!(101)]);
        assert_eq!(est.volatility(&market), None);
    }

    #[test]
    fn flat_prices_yield_zero() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(3, 2);
        record_all(&mut est, &market, &[dec!(100); 6]);
        assert_eq!(est.volatility(&market), Some(Decimal::ZERO));
    }

    #[test]
    fn triangle_wave_yields_exact_mean_range_ratio() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(3, 2);
        // Oldest window [100, 102, 100] -> (102-100)/100 = 0.02
        // Newest window [100, 104, 100] -> (104-100)/100 = 0.04
        record_all(
            &mut est,
            &market,
            &[dec!(100), dec!(102), dec!(100), dec!(100), dec!(104), dec!(100)],
        );
        assert_eq!(est.volatility(&market), Some(dec!(0.03)));
    }

    #[test]
    fn incomplete_trailing_window_is_skipped() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(3, 3);
        // 7 samples: newest two windows are full, the oldest single sample
        // cannot form a window and is ignored.
        record_all(
            &mut est,
            &market,
            &[
                dec!(500),
                dec!(100),
                dec!(102),
                dec!(100),
                dec!(100),
                dec!(104),
                dec!(100),
            ],
        );
        assert_eq!(est.volatility(&market), Some(dec!(0.03)));
    }

    #[test]
    fn zero_minimum_is_undefined() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(2, 2);
        record_all(&mut est, &market, &[dec!(0), dec!(1), dec!(1), dec!(1)]);
        assert_eq!(est.volatility(&market), None);
    }

    #[test]
    fn buffer_is_bounded_to_interval_times_periods() {
        let market = pair("ETH-USDT");
        let mut est = VolatilityEstimator::new(2, 2);
        for i in 0..10 {
            est.record(&market, Decimal::from(100 + i));
        }
        assert_eq!(est.history_len(&market), 4);
    }
}
