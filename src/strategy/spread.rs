//! Bid/ask spread source
//!
//! Yields per-market (bid_spread, ask_spread) pairs, either statically from
//! configuration or dynamically from the market band feed. The static path
//! widens the configured spread when volatility demands it and honors the
//! optional max-spread cap; the dynamic path falls back to the static
//! computation whenever the feed has no data.

use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::TradingPair;
use crate::feed::MarketBandFeed;

#[derive(Debug, Clone, Copy)]
pub struct SpreadParams {
    /// Configured half-width around mid, as a fraction.
    pub spread: Decimal,
    pub volatility_to_spread_multiplier: Decimal,
    /// Cap on the effective spread; values <= 0 disable the cap.
    pub max_spread: Decimal,
}

/// The spreads to quote for one market on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadQuote {
    pub bid_spread: Decimal,
    pub ask_spread: Decimal,
    /// Set when the dynamic feed had no data and the static computation was
    /// used instead.
    pub fallback: bool,
}

pub enum SpreadSource {
    Static(SpreadParams),
    Dynamic {
        params: SpreadParams,
        feed: MarketBandFeed,
        venue: String,
    },
}

impl SpreadSource {
    pub fn static_spread(params: SpreadParams) -> Self {
        SpreadSource::Static(params)
    }

    pub fn dynamic(params: SpreadParams, feed: MarketBandFeed, venue: &str) -> Self {
        SpreadSource::Dynamic {
            params,
            feed,
            venue: venue.to_string(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, SpreadSource::Dynamic { .. })
    }

    pub fn params(&self) -> &SpreadParams {
        match self {
            SpreadSource::Static(params) => params,
            SpreadSource::Dynamic { params, .. } => params,
        }
    }

    /// Spreads for one market given the current volatility estimate.
    pub async fn spreads(&self, market: &TradingPair, volatility: Option<Decimal>) -> SpreadQuote {
        match self {
            SpreadSource::Static(params) => Self::static_quote(params, volatility),
            SpreadSource::Dynamic { params, feed, venue } => {
                match feed.get_spread(venue, market).await {
                    Ok(Some(band)) => SpreadQuote {
                        bid_spread: band.spread_bid * params.volatility_to_spread_multiplier,
                        ask_spread: band.spread_ask * params.volatility_to_spread_multiplier,
                        fallback: false,
                    },
                    Ok(None) => {
                        debug!(market = %market, "no market band mapping");
                        Self::fallback_quote(params, volatility)
                    }
                    Err(e) => {
                        debug!(market = %market, error = %e, "market band fetch failed");
                        Self::fallback_quote(params, volatility)
                    }
                }
            }
        }
    }

    fn fallback_quote(params: &SpreadParams, volatility: Option<Decimal>) -> SpreadQuote {
        let mut quote = Self::static_quote(params, volatility);
        quote.fallback = true;
        quote
    }

    fn static_quote(params: &SpreadParams, volatility: Option<Decimal>) -> SpreadQuote {
        let mut spread = params.spread;
        if let Some(volatility) = volatility {
            // Volatility applies only when it exceeds the configured spread.
            spread = spread.max(volatility * params.volatility_to_spread_multiplier);
        }
        if params.max_spread > Decimal::ZERO {
            spread = spread.min(params.max_spread);
        }
        SpreadQuote {
            bid_spread: spread,
            ask_spread: spread,
            fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(spread: Decimal, mult: Decimal, max: Decimal) -> SpreadParams {
        SpreadParams {
            spread,
            volatility_to_spread_multiplier: mult,
            max_spread: max,
        }
    }

    fn pair(raw: &str) -> TradingPair {
        raw.parse().expect("valid pair")
    }

    #[test]
    fn static_spread_is_symmetric() {
        let source = SpreadSource::static_spread(params(dec!(0.01), dec!(1), dec!(-1)));
        let quote = tokio_test::block_on(source.spreads(&pair("BTC-USDT"), None));
        assert_eq!(quote.bid_spread, dec!(0.01));
        assert_eq!(quote.ask_spread, dec!(0.01));
        assert!(!quote.fallback);
    }

    #[test]
    fn volatility_widens_static_spread() {
        let source = SpreadSource::static_spread(params(dec!(0.01), dec!(2), dec!(-1)));
        // 0.008 * 2 = 0.016 > 0.01 -> widened.
        let quote = tokio_test::block_on(source.spreads(&pair("BTC-USDT"), Some(dec!(0.008))));
        assert_eq!(quote.bid_spread, dec!(0.016));

        // 0.004 * 2 = 0.008 < 0.01 -> configured spread wins.
        let quote = tokio_test::block_on(source.spreads(&pair("BTC-USDT"), Some(dec!(0.004))));
        assert_eq!(quote.bid_spread, dec!(0.01));
    }

    #[test]
    fn max_spread_caps_the_widened_value() {
        let source = SpreadSource::static_spread(params(dec!(0.01), dec!(2), dec!(0.012)));
        let quote = tokio_test::block_on(source.spreads(&pair("BTC-USDT"), Some(dec!(0.05))));
        assert_eq!(quote.bid_spread, dec!(0.012));
    }

    #[test]
    fn disabled_max_spread_is_ignored() {
        let source = SpreadSource::static_spread(params(dec!(0.01), dec!(1), dec!(-1)));
        let quote = tokio_test::block_on(source.spreads(&pair("BTC-USDT"), Some(dec!(0.05))));
        assert_eq!(quote.bid_spread, dec!(0.05));
    }

    #[test]
    fn dynamic_without_mapping_falls_back_to_static() {
        let source = SpreadSource::dynamic(
            params(dec!(0.01), dec!(1), dec!(-1)),
            MarketBandFeed::new(),
            "binance",
        );
        let quote = tokio_test::block_on(source.spreads(&pair("DOGE-USDT"), None));
        assert!(quote.fallback);
        assert_eq!(quote.bid_spread, dec!(0.01));
        assert_eq!(quote.ask_spread, dec!(0.01));
    }
}
