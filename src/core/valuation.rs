//! Valuation and rebalancing calculations over a holdings snapshot.
//!
//! All values are converted to KRW: US instruments and US cash are multiplied by
//! the KRW per USD rate, KR and CRYPTO values are already KRW. Nothing is rounded
//! here; display code rounds.
use crate::core::model::{CashBalance, Holding, Market};
use std::collections::BTreeMap;

/// Value, cost and profit of a single holding in KRW.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HoldingValuation {
    pub eval_value: f64,
    pub cost_basis: f64,
    pub profit_loss: f64,
    pub profit_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceAction {
    Buy,
    Sell,
    Hold,
}

/// Distance of a position from its target weight within its market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceValuation {
    pub target_amount: f64,
    /// Positive when under target.
    pub diff_amount: f64,
    pub rebalance_qty: f64,
}

impl RebalanceValuation {
    pub fn action(&self) -> RebalanceAction {
        if self.rebalance_qty <= 0.0 || self.diff_amount == 0.0 {
            RebalanceAction::Hold
        } else if self.diff_amount > 0.0 {
            RebalanceAction::Buy
        } else {
            RebalanceAction::Sell
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketSummary {
    pub stock_value: f64,
    pub cost_basis: f64,
    pub cash_value: f64,
    pub total_value: f64,
    pub profit_loss: f64,
    pub profit_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub total_profit_pct: f64,
    pub markets: BTreeMap<Market, MarketSummary>,
    /// Sector code to evaluated value in KRW, across markets.
    pub sectors: BTreeMap<String, f64>,
}

impl PortfolioSummary {
    pub fn market(&self, market: Market) -> MarketSummary {
        self.markets.get(&market).copied().unwrap_or_default()
    }
}

/// Conversion factor to KRW for values quoted in `market`'s currency.
pub fn fx_rate_for(market: Market, usd_krw: f64) -> f64 {
    match market {
        Market::Us => usd_krw,
        Market::Kr | Market::Crypto => 1.0,
    }
}

fn pct(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

pub fn valuate_holding(holding: &Holding, usd_krw: f64) -> HoldingValuation {
    let rate = fx_rate_for(holding.market, usd_krw);
    // Without a recorded cost the position shows no profit rather than its full value.
    let buy_price = if holding.buy_price > 0.0 {
        holding.buy_price
    } else {
        holding.current_price
    };

    let cost_basis = buy_price * rate * holding.holding_qty;
    let eval_value = holding.current_price * rate * holding.holding_qty;
    let profit_loss = eval_value - cost_basis;

    HoldingValuation {
        eval_value,
        cost_basis,
        profit_loss,
        profit_pct: pct(profit_loss, cost_basis),
    }
}

pub fn valuate_rebalance(
    holding: &Holding,
    market_total_value: f64,
    usd_krw: f64,
) -> RebalanceValuation {
    let rate = fx_rate_for(holding.market, usd_krw);
    let eval_value = holding.current_price * rate * holding.holding_qty;

    let target_amount = market_total_value * holding.target_weight / 100.0;
    let diff_amount = target_amount - eval_value;
    let unit_value = holding.current_price * rate;
    let rebalance_qty = if unit_value > 0.0 {
        (diff_amount.abs() / unit_value).floor()
    } else {
        0.0
    };

    RebalanceValuation {
        target_amount,
        diff_amount,
        rebalance_qty,
    }
}

/// Target versus actual for a market's cash line. `rebalance_qty` is the
/// amount of cash in the market's own currency to add (positive diff) or spend.
pub fn valuate_cash_rebalance(
    cash: &CashBalance,
    market_total_value: f64,
    usd_krw: f64,
) -> RebalanceValuation {
    let rate = fx_rate_for(cash.market, usd_krw);
    let cash_value = cash.amount * rate;
    let target_amount = market_total_value * cash.target_weight / 100.0;
    let diff_amount = target_amount - cash_value;
    let rebalance_qty = if rate > 0.0 {
        diff_amount.abs() / rate
    } else {
        0.0
    };

    RebalanceValuation {
        target_amount,
        diff_amount,
        rebalance_qty,
    }
}

pub fn summarize_portfolio(
    holdings: &[Holding],
    cash: &[CashBalance],
    usd_krw: f64,
) -> PortfolioSummary {
    let mut markets: BTreeMap<Market, MarketSummary> = Market::ALL
        .iter()
        .map(|m| (*m, MarketSummary::default()))
        .collect();
    let mut sectors: BTreeMap<String, f64> = BTreeMap::new();

    for holding in holdings {
        let valuation = valuate_holding(holding, usd_krw);
        let summary = markets.entry(holding.market).or_default();
        summary.stock_value += valuation.eval_value;
        summary.cost_basis += valuation.cost_basis;

        *sectors.entry(holding.sector.clone()).or_insert(0.0) += valuation.eval_value;
    }

    for balance in cash {
        let summary = markets.entry(balance.market).or_default();
        summary.cash_value = balance.amount * fx_rate_for(balance.market, usd_krw);
    }

    for summary in markets.values_mut() {
        summary.total_value = summary.stock_value + summary.cash_value;
        summary.profit_loss = summary.stock_value - summary.cost_basis;
        summary.profit_pct = pct(summary.profit_loss, summary.cost_basis);
    }

    // Cash carries no cost basis, so profit is stock-only.
    let total_value = markets.values().map(|m| m.total_value).sum();
    let total_cost = markets.values().map(|m| m.cost_basis).sum();
    let total_profit = markets.values().map(|m| m.profit_loss).sum();

    PortfolioSummary {
        total_value,
        total_cost,
        total_profit,
        total_profit_pct: pct(total_profit, total_cost),
        markets,
        sectors,
    }
}
