//! Status reporters
//!
//! Pure renderers of tabular strategy status. They never mutate strategy
//! state and tolerate undefined volatility, empty books and the absence of
//! active arbitrages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tabled::{Table, Tabled};

use crate::strategy::funding_arb::{
    FundingRateArbitrageStrategy, FUNDING_PROFITABILITY_INTERVAL_SECS,
};
use crate::strategy::liquidity_mining::LiquidityMiningStrategy;

#[derive(Tabled)]
struct MarketStatusRow {
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Mid price")]
    mid_price: String,
    #[tabled(rename = "Best bid")]
    best_bid: String,
    #[tabled(rename = "Best ask")]
    best_ask: String,
    #[tabled(rename = "Volatility")]
    volatility: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct BudgetStatusRow {
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Budget")]
    budget: String,
    #[tabled(rename = "Base bal")]
    base_bal: String,
    #[tabled(rename = "Quote bal")]
    quote_bal: String,
    #[tabled(rename = "Base/Quote")]
    split: String,
}

#[derive(Tabled)]
struct OrderStatusRow {
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Spread")]
    spread: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct FundingRateRow {
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "Venue")]
    venue: String,
    #[tabled(rename = "Rate/day")]
    rate_per_day: String,
}

#[derive(Tabled)]
struct BestPathRow {
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "Best path")]
    path: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Rate diff/day")]
    rate_diff: String,
}

/// Mid prices, top-of-book offsets and volatility per market.
pub fn market_status(strategy: &LiquidityMiningStrategy) -> String {
    let gateway = strategy.gateway();
    let rows: Vec<MarketStatusRow> = strategy
        .params()
        .markets
        .iter()
        .map(|market| {
            let mid = gateway.get_mid_price(market);
            let best_bid = gateway.get_price(market, false);
            let best_ask = gateway.get_price(market, true);
            let offset = |price: Option<Decimal>| match (price, mid) {
                (Some(price), Some(mid)) if mid > Decimal::ZERO => {
                    pct((price - mid).abs() / mid)
                }
                _ => String::new(),
            };
            MarketStatusRow {
                market: market.to_string(),
                mid_price: mid.map(|m| m.to_string()).unwrap_or_default(),
                best_bid: offset(best_bid),
                best_ask: offset(best_ask),
                volatility: strategy
                    .volatility(market)
                    .map(pct)
                    .unwrap_or_default(),
                state: strategy.market_state(market).to_string(),
            }
        })
        .collect();
    render(rows)
}

/// Per-market budgets in the campaign token with the base/quote split.
pub fn budget_status(strategy: &LiquidityMiningStrategy) -> String {
    let gateway = strategy.gateway();
    let budgets = strategy.budgets();
    let token_is_quote = budgets.is_token_quote(&strategy.params().markets);
    let rows: Vec<BudgetStatusRow> = strategy
        .params()
        .markets
        .iter()
        .map(|market| {
            let base_bal = budgets.sell_budget(market);
            let quote_bal = budgets.buy_budget(market);
            let mid = gateway.get_mid_price(market).unwrap_or(Decimal::ZERO);
            let total_in_quote = base_bal * mid + quote_bal;
            let total_in_token = if token_is_quote || mid <= Decimal::ZERO {
                total_in_quote
            } else {
                base_bal + quote_bal / mid
            };
            let (base_pct, quote_pct) = if total_in_quote > Decimal::ZERO {
                (base_bal * mid / total_in_quote, quote_bal / total_in_quote)
            } else {
                (Decimal::ZERO, Decimal::ZERO)
            };
            BudgetStatusRow {
                market: market.to_string(),
                budget: format!("{total_in_token:.4} {}", budgets.token()),
                base_bal: base_bal.to_string(),
                quote_bal: quote_bal.to_string(),
                split: format!("{} / {}", pct0(base_pct), pct0(quote_pct)),
            }
        })
        .collect();
    render(rows)
}

/// Live maker orders with spreads to mid and ages.
pub fn active_orders_status(strategy: &LiquidityMiningStrategy, now: DateTime<Utc>) -> String {
    let gateway = strategy.gateway();
    let mut orders = gateway.limit_orders();
    orders.sort_by(|a, b| {
        (a.trading_pair.to_string(), !a.is_buy).cmp(&(b.trading_pair.to_string(), !b.is_buy))
    });
    let rows: Vec<OrderStatusRow> = orders
        .iter()
        .map(|order| {
            let mid = gateway.get_mid_price(&order.trading_pair);
            let spread = match mid {
                Some(mid) if mid > Decimal::ZERO => pct((order.price - mid).abs() / mid),
                _ => String::new(),
            };
            OrderStatusRow {
                market: order.trading_pair.to_string(),
                side: if order.is_buy { "buy" } else { "sell" }.to_string(),
                price: order.price.to_string(),
                spread,
                amount: order.quantity.to_string(),
                age: format_age(order.age(now).num_seconds()),
            }
        })
        .collect();
    if rows.is_empty() {
        return "No active maker orders.".to_string();
    }
    render(rows)
}

/// Per-venue funding rates, the best venue pair per token, and a summary of
/// active arbitrages.
pub fn funding_status(strategy: &FundingRateArbitrageStrategy) -> String {
    let interval = Decimal::from(FUNDING_PROFITABILITY_INTERVAL_SECS);
    let mut rate_rows: Vec<FundingRateRow> = Vec::new();
    let mut path_rows: Vec<BestPathRow> = Vec::new();
    for token in &strategy.params().tokens {
        let report = strategy.funding_info_by_token(token);
        for venue in &strategy.params().venues {
            let rate = report
                .get(venue)
                .map(|info| pct(info.normalized_rate() * interval))
                .unwrap_or_default();
            rate_rows.push(FundingRateRow {
                token: token.clone(),
                venue: venue.clone(),
                rate_per_day: rate,
            });
        }
        if let Some(best) = strategy.best_combination(&report) {
            path_rows.push(BestPathRow {
                token: token.clone(),
                path: format!("{}_{}", best.venue_1, best.venue_2),
                side: best.side.to_string(),
                rate_diff: pct(best.rate_diff),
            });
        }
    }

    let mut lines = vec![
        format!(
            "Min funding rate profitability: {}",
            pct(strategy.params().min_funding_rate_profitability)
        ),
        format!(
            "Profitability to take profit: {}",
            pct(strategy.params().profitability_to_take_profit)
        ),
        String::new(),
        render(rate_rows),
        render(path_rows),
    ];
    for token in &strategy.params().tokens {
        let Some(arb) = strategy.active_arbitrages().get(token) else {
            continue;
        };
        lines.push(format!(
            "{token}: long {} | short {} | funding collected {} over {} payments",
            arb.long_venue(),
            arb.short_venue(),
            arb.funding_payments_total(),
            arb.funding_payments.len(),
        ));
    }
    lines.join("\n")
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    if rows.is_empty() {
        return "(no data)".to_string();
    }
    Table::new(rows).to_string()
}

fn pct(fraction: Decimal) -> String {
    format!("{:.2}%", fraction * Decimal::ONE_HUNDRED)
}

fn pct0(fraction: Decimal) -> String {
    format!("{:.0}%", fraction * Decimal::ONE_HUNDRED)
}

fn format_age(total_secs: i64) -> String {
    if total_secs <= 0 {
        return "n/a".to_string();
    }
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
