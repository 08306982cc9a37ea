use super::summary::require_account;
use super::ui;
use crate::AppContext;
use crate::core::ledger::Snapshot;
use crate::core::model::Market;
use crate::core::valuation::{
    RebalanceAction, RebalanceValuation, fx_rate_for, summarize_portfolio, valuate_cash_rebalance,
    valuate_rebalance,
};
use anyhow::Result;
use comfy_table::{Cell, Color};

fn action_cell(valuation: &RebalanceValuation, qty_text: String) -> (Cell, Cell) {
    match valuation.action() {
        RebalanceAction::Buy => (Cell::new("BUY").fg(Color::Red), ui::right_cell(qty_text)),
        RebalanceAction::Sell => (Cell::new("SELL").fg(Color::Blue), ui::right_cell(qty_text)),
        RebalanceAction::Hold => (Cell::new("-").fg(Color::DarkGrey), ui::right_cell("-".into())),
    }
}

/// One table per market with holdings or a cash target.
pub fn render_rebalance(snapshot: &Snapshot, usd_krw: f64) -> String {
    let summary = summarize_portfolio(&snapshot.holdings, &snapshot.cash, usd_krw);
    let mut sections = Vec::new();

    for market in Market::ALL {
        let market_total = summary.market(market).total_value;
        let holdings: Vec<_> = snapshot
            .holdings
            .iter()
            .filter(|h| h.market == market && (h.holding_qty > 0.0 || h.target_weight > 0.0))
            .collect();
        let cash = snapshot.cash(market);
        if holdings.is_empty() && cash.is_none_or(|c| c.amount == 0.0 && c.target_weight == 0.0) {
            continue;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Name"),
            ui::header_cell("Target %"),
            ui::header_cell("Current %"),
            ui::header_cell("Target (KRW)"),
            ui::header_cell("Diff (KRW)"),
            ui::header_cell("Action"),
            ui::header_cell("Qty"),
        ]);

        let rate = fx_rate_for(market, usd_krw);
        let current_pct = |value: f64| {
            if market_total > 0.0 {
                value / market_total * 100.0
            } else {
                0.0
            }
        };

        for holding in holdings {
            let valuation = valuate_rebalance(holding, market_total, usd_krw);
            let value = holding.current_price * rate * holding.holding_qty;
            let (action, qty) = action_cell(&valuation, ui::quantity(valuation.rebalance_qty));
            table.add_row(vec![
                Cell::new(if holding.name.is_empty() {
                    &holding.code
                } else {
                    &holding.name
                }),
                ui::right_cell(ui::percent(holding.target_weight)),
                ui::right_cell(ui::percent(current_pct(value))),
                ui::right_cell(ui::krw(valuation.target_amount)),
                ui::pnl_cell(ui::krw(valuation.diff_amount), valuation.diff_amount),
                action,
                qty,
            ]);
        }

        if let Some(cash) = cash {
            let valuation = valuate_cash_rebalance(cash, market_total, usd_krw);
            let (action, qty) =
                action_cell(&valuation, ui::money(valuation.rebalance_qty, market));
            table.add_row(vec![
                Cell::new("Cash"),
                ui::right_cell(ui::percent(cash.target_weight)),
                ui::right_cell(ui::percent(current_pct(cash.amount * rate))),
                ui::right_cell(ui::krw(valuation.target_amount)),
                ui::pnl_cell(ui::krw(valuation.diff_amount), valuation.diff_amount),
                action,
                qty,
            ]);
        }

        sections.push(format!(
            "{} {}\n{table}",
            ui::style_text(market.as_str(), ui::StyleType::Title),
            ui::style_text(&format!("total {}", ui::krw(market_total)), ui::StyleType::Subtle)
        ));
    }

    if sections.is_empty() {
        return ui::style_text("Nothing to rebalance", ui::StyleType::Subtle);
    }
    sections.join("\n\n")
}

pub async fn run(ctx: &AppContext, account_id: &str) -> Result<()> {
    require_account(ctx, account_id).await?;
    let rate = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
    let snapshot = ctx.repository.load_snapshot(account_id).await?;
    println!("{}", render_rebalance(&snapshot, rate.rate));
    Ok(())
}
