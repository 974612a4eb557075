use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradingPair;

/// Funding state for one perpetual market on one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingInfo {
    /// Current funding rate per payment interval.
    pub rate: Decimal,
    /// Wall-clock time of the next funding payment.
    pub next_funding_utc: DateTime<Utc>,
    /// Venue payment interval in seconds (e.g. 8h on most venues, 1h on
    /// hourly-funding venues).
    pub payment_interval_secs: u64,
}

impl FundingInfo {
    /// Funding rate normalized to a per-second basis.
    pub fn normalized_rate(&self) -> Decimal {
        if self.payment_interval_secs == 0 {
            return Decimal::ZERO;
        }
        self.rate / Decimal::from(self.payment_interval_secs)
    }
}

/// A funding payment received on an open perpetual position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPayment {
    pub venue: String,
    pub trading_pair: TradingPair,
    /// Signed amount in quote currency; negative when funding was paid out.
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalized_rate_divides_by_interval() {
        let info = FundingInfo {
            rate: dec!(0.0001),
            next_funding_utc: Utc::now(),
            payment_interval_secs: 3600,
        };
        assert_eq!(info.normalized_rate() * dec!(3600), dec!(0.0001));
    }

    #[test]
    fn normalized_rate_zero_interval_is_zero() {
        let info = FundingInfo {
            rate: dec!(0.01),
            next_funding_utc: Utc::now(),
            payment_interval_secs: 0,
        };
        assert_eq!(info.normalized_rate(), Decimal::ZERO);
    }
}
