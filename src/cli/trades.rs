use super::summary::require_account;
use super::ui;
use crate::AppContext;
use crate::core::ledger::{ExchangeRequest, TradeRequest};
use crate::core::model::{ExchangeDirection, Market, Trade, TradeKind};
use crate::core::trading::{TradeFilter, trading_date};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use comfy_table::Cell;

fn describe(trade: &Trade) -> String {
    let market = trade.market.unwrap_or(Market::Kr);
    match trade.kind {
        TradeKind::Buy | TradeKind::Sell => format!(
            "{} {} x {} @ {}",
            trade.name.as_deref().or(trade.code.as_deref()).unwrap_or("?"),
            trade.market.map(|m| m.as_str()).unwrap_or(""),
            ui::quantity(trade.qty.unwrap_or(0.0)),
            ui::money(trade.price.unwrap_or(0.0), market)
        ),
        TradeKind::Deposit | TradeKind::Withdraw => format!(
            "{} cash {}",
            market,
            ui::money(trade.amount.unwrap_or(0.0), market)
        ),
        TradeKind::Exchange => {
            let (from, to) = trade
                .direction
                .map(|d| d.legs())
                .unwrap_or((Market::Kr, Market::Us));
            format!(
                "{} -> {} at {:.2}",
                ui::money(trade.from_amount.unwrap_or(0.0), from),
                ui::money(trade.to_amount.unwrap_or(0.0), to),
                trade.rate.unwrap_or(0.0)
            )
        }
    }
}

pub fn render_trades(trades: &[Trade]) -> String {
    if trades.is_empty() {
        return ui::style_text("No trades", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Trading Day"),
        ui::header_cell("Type"),
        ui::header_cell("Details"),
        ui::header_cell("Realized"),
        ui::header_cell("Id"),
    ]);
    for trade in trades {
        let market = trade.market.unwrap_or(Market::Kr);
        table.add_row(vec![
            Cell::new(trading_date(trade.date)),
            Cell::new(trade.kind),
            Cell::new(describe(trade)),
            trade.pnl.map_or_else(
                || ui::format_optional_cell(None::<f64>, |p| p.to_string()),
                |pnl| ui::pnl_cell(ui::money(pnl, market), pnl),
            ),
            Cell::new(ui::style_text(&trade.id, ui::StyleType::Subtle)),
        ]);
    }
    table.to_string()
}

pub async fn run_list(ctx: &AppContext, account_id: &str, filter: &TradeFilter) -> Result<()> {
    if let Some((from, to)) = filter.from.zip(filter.to).filter(|(from, to)| from > to) {
        bail!("--from {from} is after --to {to}");
    }
    require_account(ctx, account_id).await?;
    let trades = ctx.trades.list_trades(account_id, filter).await?;
    println!("{}", render_trades(&trades));
    Ok(())
}

pub async fn run_apply(ctx: &AppContext, account_id: &str, request: TradeRequest) -> Result<()> {
    let trade = ctx.trades.apply(account_id, &request).await?;
    println!(
        "{} {}",
        ui::style_text(&format!("Recorded {}:", trade.kind), ui::StyleType::TotalLabel),
        describe(&trade)
    );
    if let Some(pnl) = trade.pnl {
        let market = trade.market.unwrap_or(Market::Kr);
        println!("Realized P/L: {}", ui::money(pnl, market));
    }
    Ok(())
}

/// Converts cash between KRW and USD at `to_amount`, or at the current rate when omitted.
pub async fn run_exchange(
    ctx: &AppContext,
    account_id: &str,
    direction: ExchangeDirection,
    from_amount: f64,
    to_amount: Option<f64>,
    date: Option<DateTime<Utc>>,
) -> Result<()> {
    let (to_amount, rate) = match to_amount {
        Some(to_amount) => {
            let rate = match direction {
                ExchangeDirection::KrToUs if to_amount > 0.0 => from_amount / to_amount,
                ExchangeDirection::UsToKr if from_amount > 0.0 => to_amount / from_amount,
                _ => bail!("Exchange amounts must be positive"),
            };
            (to_amount, rate)
        }
        None => {
            let quote = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
            (direction.convert(from_amount, quote.rate), quote.rate)
        }
    };

    let request = TradeRequest::Exchange(ExchangeRequest {
        direction,
        from_amount,
        to_amount,
        rate: Some(rate),
        date,
    });
    run_apply(ctx, account_id, request).await
}

pub async fn run_delete(ctx: &AppContext, trade_id: &str) -> Result<()> {
    let trade = ctx.trades.delete_trade(trade_id).await?;
    println!("Deleted {} {}", trade.kind, describe(&trade));
    if trade.kind == TradeKind::Sell {
        println!(
            "{}",
            ui::style_text(
                "Realized P/L was reversed; holding quantity and cash were left unchanged",
                ui::StyleType::Subtle
            )
        );
    }
    Ok(())
}
