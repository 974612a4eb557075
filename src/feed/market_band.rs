//! Market band data feed
//!
//! Fetches per-market bid/ask spread bands from the external miner market
//! band endpoint. Lookups are keyed by `(venue, market)` through a static
//! market-id table; anything the feed cannot answer is reported as no data
//! so the caller can fall back to static spreads.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::domain::TradingPair;
use crate::error::{CrossmakerError, Result};

const DEFAULT_API_URL: &str =
    "https://markets.crossmaker.io/charts/market_band?market_id={market_id}&chart_interval=1";

/// One spread band sample as returned by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BandSpread {
    pub spread_ask: Decimal,
    pub spread_bid: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct BandResponse {
    status: String,
    #[serde(default)]
    data: Vec<BandSpread>,
}

/// Client for the market band endpoint.
pub struct MarketBandFeed {
    client: reqwest::Client,
    api_url: String,
    market_ids: HashMap<(String, String), u32>,
}

impl MarketBandFeed {
    pub fn new() -> Self {
        let mut market_ids = HashMap::new();
        market_ids.insert(("binance".to_string(), "FIRO-USDT".to_string()), 59);
        market_ids.insert(("binance".to_string(), "BIFI-USDT".to_string()), 304);
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            market_ids,
        }
    }

    /// Override the endpoint template (`{market_id}` placeholder required).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Register or replace a `(venue, market) -> market_id` mapping.
    pub fn register_market(&mut self, venue: &str, market: &TradingPair, market_id: u32) {
        self.market_ids
            .insert((venue.to_ascii_lowercase(), market.to_string()), market_id);
    }

    fn market_id(&self, venue: &str, market: &TradingPair) -> Option<u32> {
        self.market_ids
            .get(&(venue.to_ascii_lowercase(), market.to_string()))
            .copied()
    }

    /// Fetch the current band spread for a market.
    ///
    /// `Ok(None)` when the feed has no mapping for this `(venue, market)`;
    /// `DataFeedUnavailable` for transport failures, non-success payloads and
    /// empty data. Both are treated as "no data" by callers.
    pub async fn get_spread(
        &self,
        venue: &str,
        market: &TradingPair,
    ) -> Result<Option<BandSpread>> {
        let Some(market_id) = self.market_id(venue, market) else {
            return Ok(None);
        };
        let url = Url::parse(&self.api_url.replace("{market_id}", &market_id.to_string()))
            .map_err(|e| {
                CrossmakerError::DataFeedUnavailable(format!("bad market band url: {e}"))
            })?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CrossmakerError::DataFeedUnavailable(format!(
                "market band HTTP status {} for {market}",
                response.status()
            )));
        }
        let body: BandResponse = response.json().await?;
        Self::first_band(body, market)
    }

    fn first_band(body: BandResponse, market: &TradingPair) -> Result<Option<BandSpread>> {
        if body.status != "success" {
            return Err(CrossmakerError::DataFeedUnavailable(format!(
                "market band status {} for {market}",
                body.status
            )));
        }
        match body.data.first() {
            Some(band) => Ok(Some(*band)),
            None => Err(CrossmakerError::DataFeedUnavailable(format!(
                "market band returned empty data for {market}"
            ))),
        }
    }
}

impl Default for MarketBandFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(raw: &str) -> TradingPair {
        raw.parse().expect("valid pair")
    }

    #[test]
    fn unknown_mapping_returns_no_data() {
        let feed = MarketBandFeed::new();
        let market = pair("DOGE-USDT");
        assert!(feed.market_id("binance", &market).is_none());
    }

    #[test]
    fn mapping_lookup_ignores_venue_case() {
        let mut feed = MarketBandFeed::new();
        let market = pair("LTC-USDT");
        feed.register_market("Binance", &market, 17);
        assert_eq!(feed.market_id("BINANCE", &market), Some(17));
        assert_eq!(feed.market_id("binance", &pair("FIRO-USDT")), Some(59));
    }

    #[test]
    fn parses_success_payload() {
        let body: BandResponse = serde_json::from_str(
            r#"{"status":"success","data":[
                {"spread_ask":"0.004","spread_bid":"0.003","timestamp":1700000000},
                {"spread_ask":"0.005","spread_bid":"0.004","timestamp":1699999940}
            ]}"#,
        )
        .expect("payload should parse");
        let band = MarketBandFeed::first_band(body, &pair("FIRO-USDT"))
            .expect("success payload")
            .expect("band present");
        assert_eq!(band.spread_bid, dec!(0.003));
        assert_eq!(band.spread_ask, dec!(0.004));
    }

    #[test]
    fn non_success_status_is_unavailable() {
        let body: BandResponse =
            serde_json::from_str(r#"{"status":"error","data":[]}"#).expect("payload should parse");
        let err = MarketBandFeed::first_band(body, &pair("FIRO-USDT")).unwrap_err();
        assert!(matches!(err, CrossmakerError::DataFeedUnavailable(_)));
    }

    #[test]
    fn empty_data_is_unavailable() {
        let body: BandResponse =
            serde_json::from_str(r#"{"status":"success","data":[]}"#).expect("payload should parse");
        let err = MarketBandFeed::first_band(body, &pair("FIRO-USDT")).unwrap_err();
        assert!(matches!(err, CrossmakerError::DataFeedUnavailable(_)));
    }
}
