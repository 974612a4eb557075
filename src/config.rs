use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

use crate::domain::TradingPair;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Liquidity-mining market maker section
    #[serde(default)]
    pub liquidity_mining: Option<LiquidityMiningConfig>,
    /// Funding-rate arbitrage section
    #[serde(default)]
    pub funding_rate_arb: Option<FundingRateArbConfig>,
    /// Seed data for the paper venue used by dry runs
    #[serde(default)]
    pub paper: Option<PaperVenueConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Liquidity-mining market maker configuration.
///
/// Spread-like fields (`spread`, `target_base_pct`,
/// `order_refresh_tolerance_pct`, `max_spread`) are entered as percentages
/// (1 = 1%) and converted to fractions when strategy parameters are built.
#[derive(Debug, Clone, Deserialize)]
pub struct LiquidityMiningConfig {
    /// Spot venue to quote on
    pub exchange: String,
    /// Comma-separated list of `BASE-QUOTE` markets
    pub markets: String,
    /// Campaign token (base or quote) budgets are denominated in
    pub token: String,
    /// Size of each order in `token` amount
    pub order_amount: Decimal,
    /// Half-width around mid price, percent
    pub spread: Decimal,
    #[serde(default)]
    pub dynamic_spread: bool,
    #[serde(default = "default_true")]
    pub inventory_skew_enabled: bool,
    /// Target base asset percentage, percent
    #[serde(default = "default_target_base_pct")]
    pub target_base_pct: Decimal,
    /// Seconds between order refreshes
    #[serde(default = "default_order_refresh_time")]
    pub order_refresh_time: f64,
    /// Price drift needed to refresh orders, percent
    #[serde(default = "default_order_refresh_tolerance_pct")]
    pub order_refresh_tolerance_pct: Decimal,
    /// Tolerable inventory range around the target, in multiples of total
    /// order size
    #[serde(default = "default_inventory_range_multiplier")]
    pub inventory_range_multiplier: Decimal,
    /// Seconds of mid-price history per volatility window
    #[serde(default = "default_volatility_interval")]
    pub volatility_interval: u32,
    /// Number of windows averaged into the volatility estimate
    #[serde(default = "default_avg_volatility_period")]
    pub avg_volatility_period: u32,
    /// Multiplier converting average volatility to spread
    #[serde(default = "default_volatility_to_spread_multiplier")]
    pub volatility_to_spread_multiplier: Decimal,
    /// Maximum spread, percent; -1 disables the cap
    #[serde(default = "default_max_spread")]
    pub max_spread: Decimal,
    /// Maximum life time of orders in seconds
    #[serde(default = "default_max_order_age")]
    pub max_order_age: f64,
}

fn default_true() -> bool {
    true
}

fn default_target_base_pct() -> Decimal {
    Decimal::new(50, 0)
}

fn default_order_refresh_time() -> f64 {
    10.0
}

fn default_order_refresh_tolerance_pct() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_inventory_range_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_volatility_interval() -> u32 {
    60 * 5
}

fn default_avg_volatility_period() -> u32 {
    10
}

fn default_volatility_to_spread_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_max_spread() -> Decimal {
    Decimal::NEGATIVE_ONE
}

fn default_max_order_age() -> f64 {
    60.0 * 60.0
}

impl LiquidityMiningConfig {
    /// Parse and validate the configured market list.
    pub fn market_pairs(&self) -> Result<Vec<TradingPair>, Vec<String>> {
        let mut errors = Vec::new();
        let mut pairs: Vec<TradingPair> = Vec::new();
        if self.markets.trim().is_empty() {
            return Err(vec!["markets: the given entry is empty".to_string()]);
        }
        for raw in self.markets.split(',') {
            if raw.trim().is_empty() {
                errors.push("markets: the list contains an empty market".to_string());
                continue;
            }
            match raw.parse::<TradingPair>() {
                Ok(pair) => {
                    if pairs.contains(&pair) {
                        errors.push(format!("markets: duplicate market {pair}"));
                    } else {
                        pairs.push(pair);
                    }
                }
                Err(e) => errors.push(format!("markets: {e}")),
            }
        }
        if errors.is_empty() {
            Ok(pairs)
        } else {
            Err(errors)
        }
    }

    /// Validate config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let pairs = match self.market_pairs() {
            Ok(pairs) => pairs,
            Err(mut market_errors) => {
                errors.append(&mut market_errors);
                Vec::new()
            }
        };

        if self.exchange.trim().is_empty() {
            errors.push("exchange must not be empty".to_string());
        }

        let token = self.token.trim().to_ascii_uppercase();
        if !pairs.is_empty()
            && !pairs
                .iter()
                .any(|p| p.base() == token || p.quote() == token)
        {
            errors.push(format!("token {token} is not part of any configured market"));
        }

        if self.order_amount <= Decimal::ZERO {
            errors.push(format!("order_amount must be > 0, got {}", self.order_amount));
        }
        if self.spread <= Decimal::ZERO || self.spread >= Decimal::ONE_HUNDRED {
            errors.push(format!("spread must be in (0, 100), got {}", self.spread));
        }
        if self.target_base_pct <= Decimal::ZERO || self.target_base_pct >= Decimal::ONE_HUNDRED {
            errors.push(format!(
                "target_base_pct must be in (0, 100), got {}",
                self.target_base_pct
            ));
        }
        if self.order_refresh_time <= 0.0 {
            errors.push(format!(
                "order_refresh_time must be > 0, got {}",
                self.order_refresh_time
            ));
        }
        let tolerance_limit = Decimal::TEN;
        if self.order_refresh_tolerance_pct < -tolerance_limit
            || self.order_refresh_tolerance_pct > tolerance_limit
        {
            errors.push(format!(
                "order_refresh_tolerance_pct must be in [-10, 10], got {}",
                self.order_refresh_tolerance_pct
            ));
        }
        if self.inventory_range_multiplier <= Decimal::ZERO {
            errors.push(format!(
                "inventory_range_multiplier must be > 0, got {}",
                self.inventory_range_multiplier
            ));
        }
        if self.volatility_interval <= 1 {
            errors.push(format!(
                "volatility_interval must be > 1, got {}",
                self.volatility_interval
            ));
        }
        if self.avg_volatility_period <= 1 {
            errors.push(format!(
                "avg_volatility_period must be > 1, got {}",
                self.avg_volatility_period
            ));
        }
        if self.volatility_to_spread_multiplier <= Decimal::ZERO {
            errors.push(format!(
                "volatility_to_spread_multiplier must be > 0, got {}",
                self.volatility_to_spread_multiplier
            ));
        }
        if self.max_order_age <= 0.0 {
            errors.push(format!(
                "max_order_age must be > 0, got {}",
                self.max_order_age
            ));
        }
        errors
    }
}

/// Funding-rate arbitrage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FundingRateArbConfig {
    /// Perpetual venues, comma separated (at least two)
    #[serde(default = "default_connectors")]
    pub connectors: String,
    /// Tokens to arbitrage, comma separated
    #[serde(default = "default_tokens")]
    pub tokens: String,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Per-day normalized funding-rate differential needed to enter
    #[serde(default = "default_min_funding_rate_profitability")]
    pub min_funding_rate_profitability: Decimal,
    /// Quote size opened on each venue
    #[serde(default = "default_position_size_quote")]
    pub position_size_quote: Decimal,
    /// Combined PnL fraction of position size that takes profit
    #[serde(default = "default_profitability_to_take_profit")]
    pub profitability_to_take_profit: Decimal,
    /// Per-day funding-rate gap below which the position is stopped
    #[serde(default = "default_funding_rate_diff_stop_loss")]
    pub funding_rate_diff_stop_loss: Decimal,
    /// Require non-negative trade profitability after fees to enter
    #[serde(default)]
    pub trade_profitability_condition_to_enter: bool,
}

impl Default for FundingRateArbConfig {
    fn default() -> Self {
        Self {
            connectors: default_connectors(),
            tokens: default_tokens(),
            leverage: default_leverage(),
            min_funding_rate_profitability: default_min_funding_rate_profitability(),
            position_size_quote: default_position_size_quote(),
            profitability_to_take_profit: default_profitability_to_take_profit(),
            funding_rate_diff_stop_loss: default_funding_rate_diff_stop_loss(),
            trade_profitability_condition_to_enter: false,
        }
    }
}

fn default_connectors() -> String {
    "hyperliquid_perpetual,binance_perpetual".to_string()
}

fn default_tokens() -> String {
    "WIF,FET".to_string()
}

fn default_leverage() -> u32 {
    20
}

fn default_min_funding_rate_profitability() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_position_size_quote() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn default_profitability_to_take_profit() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_funding_rate_diff_stop_loss() -> Decimal {
    Decimal::new(-1, 3) // -0.001
}

impl FundingRateArbConfig {
    pub fn connector_list(&self) -> Vec<String> {
        parse_string_list(&self.connectors)
    }

    pub fn token_list(&self) -> Vec<String> {
        parse_string_list(&self.tokens)
            .into_iter()
            .map(|t| t.to_ascii_uppercase())
            .collect()
    }

    /// Validate config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.connector_list().len() < 2 {
            errors.push(format!(
                "connectors needs at least 2 venues, got \"{}\"",
                self.connectors
            ));
        }
        if self.token_list().is_empty() {
            errors.push("tokens must not be empty".to_string());
        }
        if self.leverage == 0 {
            errors.push("leverage must be > 0".to_string());
        }
        if self.position_size_quote <= Decimal::ZERO {
            errors.push(format!(
                "position_size_quote must be > 0, got {}",
                self.position_size_quote
            ));
        }
        errors
    }
}

/// Seed data for the in-process paper venue
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaperVenueConfig {
    /// Token balances to start with
    #[serde(default)]
    pub balances: std::collections::HashMap<String, Decimal>,
    /// Mid prices per `BASE-QUOTE` market
    #[serde(default)]
    pub mids: std::collections::HashMap<String, Decimal>,
    /// Flat fee fraction applied to every estimate
    #[serde(default)]
    pub fee_pct: Decimal,
    #[serde(default)]
    pub price_step: Decimal,
    #[serde(default)]
    pub amount_step: Decimal,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from either a config directory or a single TOML file
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder();

        // Accept either a config directory (`config/`) or a single TOML file.
        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("CROSSMAKER_ENV")
                            .unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            // Override with environment variables (CROSSMAKER_LIQUIDITY_MINING__SPREAD, etc.)
            Environment::with_prefix("CROSSMAKER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate every configured section at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Some(lm) = &self.liquidity_mining {
            errors.extend(lm.validate());
        }
        if let Some(fra) = &self.funding_rate_arb {
            errors.extend(fra.validate());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() || seen.iter().any(|s: &String| s == item) {
            continue;
        }
        seen.push(item.to_string());
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lm_config() -> LiquidityMiningConfig {
        LiquidityMiningConfig {
            exchange: "binance".to_string(),
            markets: "BTC-USDT,ETH-USDT".to_string(),
            token: "USDT".to_string(),
            order_amount: dec!(100),
            spread: dec!(1),
            dynamic_spread: false,
            inventory_skew_enabled: true,
            target_base_pct: dec!(50),
            order_refresh_time: 10.0,
            order_refresh_tolerance_pct: dec!(0.2),
            inventory_range_multiplier: dec!(1),
            volatility_interval: 300,
            avg_volatility_period: 10,
            volatility_to_spread_multiplier: dec!(1),
            max_spread: dec!(-1),
            max_order_age: 3600.0,
        }
    }

    #[test]
    fn valid_lm_config_passes() {
        assert!(lm_config().validate().is_empty());
    }

    #[test]
    fn duplicate_markets_are_rejected() {
        let mut cfg = lm_config();
        cfg.markets = "BTC-USDT,btc-usdt".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("duplicate market")));
    }

    #[test]
    fn malformed_market_is_rejected() {
        let mut cfg = lm_config();
        cfg.markets = "BTCUSDT".to_string();
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn token_must_appear_in_a_market() {
        let mut cfg = lm_config();
        cfg.token = "DOGE".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("DOGE")));
    }

    #[test]
    fn spread_bounds_are_exclusive() {
        let mut cfg = lm_config();
        cfg.spread = dec!(0);
        assert!(!cfg.validate().is_empty());
        cfg.spread = dec!(100);
        assert!(!cfg.validate().is_empty());
        cfg.spread = dec!(99.9);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn tolerance_bounds_are_inclusive() {
        let mut cfg = lm_config();
        cfg.order_refresh_tolerance_pct = dec!(10);
        assert!(cfg.validate().is_empty());
        cfg.order_refresh_tolerance_pct = dec!(10.01);
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn volatility_window_bounds() {
        let mut cfg = lm_config();
        cfg.volatility_interval = 1;
        cfg.avg_volatility_period = 1;
        let errors = cfg.validate();
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.contains("volatility_interval") || e.contains("avg_volatility_period"))
                .count(),
            2
        );
    }

    #[test]
    fn fra_defaults_are_valid() {
        let cfg = FundingRateArbConfig::default();
        assert!(cfg.validate().is_empty());
        assert_eq!(
            cfg.connector_list(),
            vec!["hyperliquid_perpetual", "binance_perpetual"]
        );
        assert_eq!(cfg.token_list(), vec!["WIF", "FET"]);
    }

    #[test]
    fn fra_requires_two_connectors() {
        let cfg = FundingRateArbConfig {
            connectors: "binance_perpetual".to_string(),
            ..Default::default()
        };
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn string_list_dedupes_and_trims() {
        assert_eq!(parse_string_list("a, b,,a , c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn app_config_loads_from_toml() {
        let raw = r#"
            [logging]
            level = "debug"

            [liquidity_mining]
            exchange = "binance"
            markets = "BTC-USDT"
            token = "USDT"
            order_amount = "100"
            spread = "1"
        "#;
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("config should parse");
        assert_eq!(cfg.logging.level, "debug");
        let lm = cfg.liquidity_mining.clone().expect("lm section");
        assert_eq!(lm.order_refresh_time, 10.0);
        assert!(lm.inventory_skew_enabled);
        assert_eq!(lm.max_spread, dec!(-1));
        assert!(cfg.validate().is_ok());
    }
}
