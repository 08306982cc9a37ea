use super::ui;
use crate::AppContext;
use crate::core::currency::RateQuote;
use crate::core::ledger::Snapshot;
use crate::core::model::{Account, Market, Sector};
use crate::core::price::RefreshReport;
use crate::core::sectors::{load_or_seed, sector_name};
use crate::core::valuation::{summarize_portfolio, valuate_holding};
use anyhow::{Result, anyhow};
use comfy_table::Cell;

pub(crate) async fn require_account(ctx: &AppContext, account_id: &str) -> Result<Account> {
    ctx.repository
        .get_account(account_id)
        .await?
        .ok_or_else(|| anyhow!("Account not found: {account_id}"))
}

fn rate_line(rate: &RateQuote) -> String {
    let source = if rate.fallback {
        ui::style_text("fallback", ui::StyleType::Error)
    } else if rate.cached {
        ui::style_text("cached", ui::StyleType::Subtle)
    } else {
        ui::style_text("live", ui::StyleType::Subtle)
    };
    format!("USD/KRW {:.2} ({source})", rate.rate)
}

pub fn render_summary(
    account: &Account,
    snapshot: &Snapshot,
    sectors: &[Sector],
    rate: &RateQuote,
) -> String {
    let usd_krw = rate.rate;
    let summary = summarize_portfolio(&snapshot.holdings, &snapshot.cash, usd_krw);

    let mut holdings_table = ui::new_styled_table();
    holdings_table.set_header(vec![
        ui::header_cell("Market"),
        ui::header_cell("Name"),
        ui::header_cell("Sector"),
        ui::header_cell("Qty"),
        ui::header_cell("Avg Price"),
        ui::header_cell("Price"),
        ui::header_cell("Value (KRW)"),
        ui::header_cell("P/L (KRW)"),
        ui::header_cell("P/L %"),
    ]);

    let mut holdings: Vec<_> = snapshot
        .holdings
        .iter()
        .filter(|h| h.holding_qty > 0.0)
        .map(|h| (h, valuate_holding(h, usd_krw)))
        .collect();
    holdings.sort_by(|a, b| b.1.eval_value.total_cmp(&a.1.eval_value));

    for (holding, valuation) in &holdings {
        let name = if holding.name.is_empty() || holding.name == holding.code {
            holding.code.clone()
        } else {
            format!("{} ({})", holding.name, holding.code)
        };
        holdings_table.add_row(vec![
            Cell::new(holding.market),
            Cell::new(name),
            Cell::new(sector_name(sectors, &holding.sector)),
            ui::right_cell(ui::quantity(holding.holding_qty)),
            ui::right_cell(ui::money(holding.buy_price, holding.market)),
            ui::right_cell(ui::money(holding.current_price, holding.market)),
            ui::right_cell(ui::krw(valuation.eval_value)),
            ui::pnl_cell(ui::krw(valuation.profit_loss), valuation.profit_loss),
            ui::pnl_cell(ui::percent(valuation.profit_pct), valuation.profit_pct),
        ]);
    }

    let mut market_table = ui::new_styled_table();
    market_table.set_header(vec![
        ui::header_cell("Market"),
        ui::header_cell("Stocks (KRW)"),
        ui::header_cell("Cash (KRW)"),
        ui::header_cell("Total (KRW)"),
        ui::header_cell("Weight"),
        ui::header_cell("P/L (KRW)"),
        ui::header_cell("P/L %"),
        ui::header_cell("Realized"),
    ]);
    for market in Market::ALL {
        let m = summary.market(market);
        let weight = if summary.total_value > 0.0 {
            m.total_value / summary.total_value * 100.0
        } else {
            0.0
        };
        let realized = snapshot.realized.get(market);
        market_table.add_row(vec![
            Cell::new(market),
            ui::right_cell(ui::krw(m.stock_value)),
            ui::right_cell(ui::krw(m.cash_value)),
            ui::right_cell(ui::krw(m.total_value)),
            ui::right_cell(ui::percent(weight)),
            ui::pnl_cell(ui::krw(m.profit_loss), m.profit_loss),
            ui::pnl_cell(ui::percent(m.profit_pct), m.profit_pct),
            ui::pnl_cell(ui::money(realized, market), realized),
        ]);
    }

    let mut sector_table = ui::new_styled_table();
    sector_table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Value (KRW)"),
        ui::header_cell("Share of stocks"),
    ]);
    let stock_total: f64 = summary.sectors.values().sum();
    let mut sector_rows: Vec<_> = summary.sectors.iter().filter(|(_, v)| **v > 0.0).collect();
    sector_rows.sort_by(|a, b| b.1.total_cmp(a.1));
    for (code, value) in sector_rows {
        let share = if stock_total > 0.0 {
            value / stock_total * 100.0
        } else {
            0.0
        };
        sector_table.add_row(vec![
            Cell::new(sector_name(sectors, code)),
            ui::right_cell(ui::krw(*value)),
            ui::right_cell(ui::percent(share)),
        ]);
    }

    let mut output = format!(
        "Account: {}\n\n",
        ui::style_text(&account.name, ui::StyleType::Title)
    );
    if holdings.is_empty() {
        output.push_str(&ui::style_text("No open positions", ui::StyleType::Subtle));
    } else {
        output.push_str(&holdings_table.to_string());
    }
    output.push_str("\n\n");
    output.push_str(&market_table.to_string());
    if stock_total > 0.0 {
        output.push_str("\n\n");
        output.push_str(&sector_table.to_string());
    }

    let total_style = if summary.total_profit >= 0.0 {
        ui::StyleType::TotalValue
    } else {
        ui::StyleType::Error
    };
    output.push_str(&format!(
        "\n\n{}: {}   {}: {}\n{}",
        ui::style_text("Total Value (KRW)", ui::StyleType::TotalLabel),
        ui::style_text(&ui::krw(summary.total_value), ui::StyleType::TotalValue),
        ui::style_text("P/L", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!(
                "{} ({})",
                ui::krw(summary.total_profit),
                ui::percent(summary.total_profit_pct)
            ),
            total_style
        ),
        rate_line(rate)
    ));
    output
}

async fn refresh_with_progress(ctx: &AppContext, account_id: &str) -> Result<RefreshReport> {
    let count = ctx.repository.load_holdings(account_id).await?.len();
    let pb = ui::new_progress_bar(count as u64, true);
    pb.set_message("Fetching prices...");
    let report = ctx
        .quotes
        .refresh_holdings(ctx.repository.as_ref(), &ctx.locks, account_id, &|| {
            pb.inc(1)
        })
        .await;
    pb.finish_and_clear();
    report
}

pub async fn run(ctx: &AppContext, account_id: &str, refresh: bool) -> Result<()> {
    let account = require_account(ctx, account_id).await?;
    if refresh {
        refresh_with_progress(ctx, account_id).await?;
    }

    let rate = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
    let snapshot = ctx.repository.load_snapshot(account_id).await?;
    let sectors = load_or_seed(ctx.repository.as_ref()).await?;

    println!("{}", render_summary(&account, &snapshot, &sectors, &rate));
    Ok(())
}

pub async fn run_refresh(ctx: &AppContext, account_id: &str) -> Result<()> {
    require_account(ctx, account_id).await?;
    let report = refresh_with_progress(ctx, account_id).await?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Market"),
        ui::header_cell("Code"),
        ui::header_cell("Price"),
    ]);
    for ((market, code), price) in &report.updated {
        table.add_row(vec![
            Cell::new(market),
            Cell::new(code),
            ui::right_cell(ui::money(*price, *market)),
        ]);
    }
    for (market, code) in &report.missing {
        table.add_row(vec![
            Cell::new(market),
            Cell::new(code),
            ui::format_optional_cell(None::<f64>, |p| p.to_string()),
        ]);
    }
    println!("{table}");
    println!(
        "Updated {} of {} holdings",
        report.updated.len(),
        report.updated.len() + report.missing.len()
    );
    Ok(())
}

pub async fn run_rate(ctx: &AppContext) -> Result<()> {
    let rate = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
    println!("{}", rate_line(&rate));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{CashBalance, Holding, RealizedPnl};
    use crate::core::sectors::default_sectors;

    #[test]
    fn test_render_summary_lists_positions_markets_and_sectors() {
        let mut samsung = Holding::new(Market::Kr, "005930");
        samsung.name = "Samsung".to_string();
        samsung.sector = "AI".to_string();
        samsung.buy_price = 60_000.0;
        samsung.current_price = 70_000.0;
        samsung.holding_qty = 10.0;

        let mut closed = Holding::new(Market::Us, "TSLA");
        closed.holding_qty = 0.0;

        let mut realized = RealizedPnl::default();
        realized.set(Market::Us, 12.5);
        let snapshot = Snapshot {
            holdings: vec![samsung, closed],
            cash: vec![CashBalance {
                market: Market::Kr,
                amount: 300_000.0,
                target_weight: 0.0,
                memo: None,
            }],
            realized,
        };
        let account = Account {
            account_id: "main".to_string(),
            name: "Main".to_string(),
        };
        let rate = RateQuote {
            rate: 1350.0,
            cached: false,
            fallback: false,
        };

        let output = console::strip_ansi_codes(&render_summary(
            &account,
            &snapshot,
            &default_sectors(),
            &rate,
        ))
        .to_string();

        assert!(output.contains("Samsung (005930)"));
        assert!(output.contains("AI/반도체"));
        assert!(!output.contains("TSLA"));
        assert!(output.contains("₩700,000"));
        assert!(output.contains("₩1,000,000"));
        assert!(output.contains("$12.50"));
        assert!(output.contains("USD/KRW 1350.00 (live)"));
    }
}
