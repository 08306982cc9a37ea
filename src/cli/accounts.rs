use super::ui;
use crate::AppContext;
use crate::core::model::{Account, Market};
use crate::core::positions::{CashEdit, PositionEdit, edit_cash, edit_position};
use anyhow::{Result, bail};
use comfy_table::Cell;

pub async fn run_list(ctx: &AppContext) -> Result<()> {
    let accounts = ctx.repository.list_accounts().await?;
    if accounts.is_empty() {
        println!(
            "{}",
            ui::style_text(
                "No accounts yet. Create one with `folio account add <id>`",
                ui::StyleType::Subtle
            )
        );
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Open Positions"),
    ]);
    for account in accounts {
        let open = ctx
            .repository
            .load_holdings(&account.account_id)
            .await?
            .iter()
            .filter(|h| h.holding_qty > 0.0)
            .count();
        let marker = if account.account_id == ctx.config.default_account {
            " *"
        } else {
            ""
        };
        table.add_row(vec![
            Cell::new(format!("{}{marker}", account.account_id)),
            Cell::new(account.name),
            ui::right_cell(open.to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Creates the account, or renames it when it exists.
pub async fn run_add(ctx: &AppContext, id: &str, name: Option<String>) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        bail!("Account id must not be empty");
    }
    let existing = ctx.repository.get_account(id).await?;
    let name = name.unwrap_or_else(|| {
        existing
            .as_ref()
            .map_or_else(|| id.to_string(), |a| a.name.clone())
    });
    ctx.repository
        .upsert_account(&Account {
            account_id: id.to_string(),
            name: name.clone(),
        })
        .await?;

    let verb = if existing.is_some() { "Updated" } else { "Created" };
    println!("{verb} account {id} ({name})");
    Ok(())
}

/// Deletes the account and everything recorded under it.
pub async fn run_remove(ctx: &AppContext, id: &str) -> Result<()> {
    if !ctx.repository.remove_account(id).await? {
        bail!("Account not found: {id}");
    }
    println!("Removed account {id} with its positions, cash and trades");
    if id == ctx.config.default_account {
        println!(
            "{}",
            ui::style_text(
                "This was the default account; update default_account in the config",
                ui::StyleType::Error
            )
        );
    }
    Ok(())
}

pub async fn run_set_position(
    ctx: &AppContext,
    account_id: &str,
    market: Market,
    code: &str,
    edit: PositionEdit,
) -> Result<()> {
    let holding = edit_position(
        ctx.repository.as_ref(),
        &ctx.locks,
        account_id,
        market,
        code,
        edit,
    )
    .await?;
    println!(
        "{} {} {}: target {}, sector {}, price {}",
        ui::style_text("Saved", ui::StyleType::TotalLabel),
        holding.market,
        holding.code,
        ui::percent(holding.target_weight),
        holding.sector,
        ui::money(holding.current_price, holding.market)
    );
    Ok(())
}

pub async fn run_set_cash(
    ctx: &AppContext,
    account_id: &str,
    market: Market,
    edit: CashEdit,
) -> Result<()> {
    let balance = edit_cash(ctx.repository.as_ref(), &ctx.locks, account_id, market, edit).await?;
    println!(
        "{} {} cash: {}, target {}",
        ui::style_text("Saved", ui::StyleType::TotalLabel),
        balance.market,
        ui::money(balance.amount, balance.market),
        ui::percent(balance.target_weight)
    );
    Ok(())
}
