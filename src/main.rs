use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crossmaker::config::{AppConfig, LoggingConfig, PaperVenueConfig};
use crossmaker::domain::{FundingInfo, TradingPair};
use crossmaker::error::{CrossmakerError, Result};
use crossmaker::gateway::{MarketGateway, PaperGateway, PerpetualGateway};
use crossmaker::strategy::{
    status, FundingArbParams, FundingRateArbitrageStrategy, HostedFundingArbitrage,
    LiquidityMiningParams, LiquidityMiningStrategy, SimulatedExecutorHost, SpreadSource,
    StrategyRunner,
};

#[derive(Parser)]
#[command(name = "crossmaker", about = "Cross-venue market-making and funding-rate arbitrage")]
struct Cli {
    /// Config file or directory
    #[arg(long, default_value = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the liquidity-mining market maker against the paper venue
    Lm,
    /// Run the funding-rate arbitrage strategy against paper venues
    Fra,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", cli.config.display());
            AppConfig::default()
        }
    };
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("config: {problem}");
        }
        return Err(CrossmakerError::Validation(errors.join("; ")));
    }

    match cli.command {
        Commands::Lm => run_liquidity_mining(config).await,
        Commands::Fra => run_funding_arb(config).await,
    }
}

async fn run_liquidity_mining(config: AppConfig) -> Result<()> {
    let lm_config = config.liquidity_mining.as_ref().ok_or_else(|| {
        CrossmakerError::Validation("missing [liquidity_mining] config section".to_string())
    })?;
    let params = LiquidityMiningParams::from_config(lm_config)?;
    let gateway = build_paper_gateway(config.paper.as_ref(), &params.exchange)?;

    let spread_source = if lm_config.dynamic_spread {
        SpreadSource::dynamic(
            params.spread_params(),
            crossmaker::feed::MarketBandFeed::new(),
            &params.exchange,
        )
    } else {
        SpreadSource::static_spread(params.spread_params())
    };

    let mut strategy = LiquidityMiningStrategy::new(gateway, params, spread_source);
    strategy.start().await;
    info!("\n{}", status::market_status(&strategy));

    let (runner, handle) = StrategyRunner::new(strategy, Duration::from_secs(1));
    let task = tokio::spawn(runner.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.shutdown();
    task.await
        .map_err(|e| CrossmakerError::Internal(format!("runner task failed: {e}")))?
}

async fn run_funding_arb(config: AppConfig) -> Result<()> {
    let fra_config = config.funding_rate_arb.clone().unwrap_or_default();
    let params = FundingArbParams::from_config(&fra_config)?;

    let host = Arc::new(SimulatedExecutorHost::new());
    let mut gateways: HashMap<String, Arc<dyn PerpetualGateway>> = HashMap::new();
    for (index, venue) in params.venues.iter().enumerate() {
        let gateway = build_paper_gateway(config.paper.as_ref(), venue)?;
        seed_paper_perpetual(&gateway, venue, index, &params.tokens)?;
        gateways.insert(venue.clone(), gateway);
    }

    let strategy = FundingRateArbitrageStrategy::new(gateways, host.clone(), params)?;
    strategy.start().await?;
    info!("\n{}", status::funding_status(&strategy));

    let hosted = HostedFundingArbitrage::new(strategy, host);
    let (runner, handle) = StrategyRunner::new(hosted, Duration::from_secs(1));
    let task = tokio::spawn(runner.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.shutdown();
    task.await
        .map_err(|e| CrossmakerError::Internal(format!("runner task failed: {e}")))?
}

fn build_paper_gateway(
    paper: Option<&PaperVenueConfig>,
    name: &str,
) -> Result<Arc<PaperGateway>> {
    let mut gateway = PaperGateway::new(name);
    if let Some(paper) = paper {
        gateway = gateway
            .with_fee(paper.fee_pct)
            .with_steps(paper.price_step, paper.amount_step);
    }
    let gateway = Arc::new(gateway);
    if let Some(paper) = paper {
        for (token, amount) in &paper.balances {
            gateway.set_balance(token, *amount);
        }
        for (market, mid) in &paper.mids {
            let pair: TradingPair = market.parse()?;
            gateway.set_mid(&pair, *mid);
        }
    }
    Ok(gateway)
}

/// Seed one paper perpetual venue with books and a synthetic funding curve
/// so a dry run has something to arbitrage.
fn seed_paper_perpetual(
    gateway: &Arc<PaperGateway>,
    venue: &str,
    index: usize,
    tokens: &[String],
) -> Result<()> {
    let quote = if venue.starts_with("hyperliquid") {
        "USD"
    } else {
        "USDT"
    };
    let interval_secs = if index % 2 == 0 { 60 * 60 } else { 60 * 60 * 8 };
    let rate = dec!(0.0005) * rust_decimal::Decimal::from(index as u64);
    for token in tokens {
        let pair = TradingPair::new(token, quote)?;
        if gateway.get_mid_price(&pair).is_none() {
            gateway.set_book(&pair, Some(dec!(0.999)), Some(dec!(1.001)));
        }
        gateway.set_funding_info(
            &pair,
            FundingInfo {
                rate,
                next_funding_utc: chrono::Utc::now()
                    + chrono::Duration::seconds(interval_secs as i64),
                payment_interval_secs: interval_secs,
            },
        );
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::{Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},crossmaker=debug", config.level)));

    // Optional daily-rotating file layer, enabled via CROSSMAKER_LOG_DIR.
    let file_layer = std::env::var("CROSSMAKER_LOG_DIR").ok().and_then(|dir| {
        if std::fs::create_dir_all(&dir).is_err() {
            eprintln!("Warning: could not create log directory {dir}, file logging disabled");
            return None;
        }
        let appender = tracing_appender::rolling::daily(&dir, "crossmaker.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // Keep the guard alive for the lifetime of the process.
        Box::leak(Box::new(guard));
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        )
    });

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    if std::env::var("CROSSMAKER_LOG_DIR").is_ok() {
        warn!("file logging enabled");
    }
}
