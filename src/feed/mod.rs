pub mod market_band;

pub use market_band::{BandSpread, MarketBandFeed};
