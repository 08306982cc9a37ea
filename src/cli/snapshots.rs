use super::ui;
use crate::AppContext;
use crate::core::history::{delete_snapshot, list_snapshots, take_snapshot};
use crate::core::model::AssetSnapshot;
use anyhow::Result;
use chrono::FixedOffset;
use comfy_table::Cell;

const KST_OFFSET_SECS: i32 = 9 * 3600;

fn signed_krw(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", ui::krw(value))
    } else {
        ui::krw(value)
    }
}

fn kst_timestamp(snapshot: &AssetSnapshot) -> String {
    match FixedOffset::east_opt(KST_OFFSET_SECS) {
        Some(kst) => snapshot
            .date
            .with_timezone(&kst)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => snapshot.date.format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}

pub fn render_snapshots(snapshots: &[AssetSnapshot]) -> String {
    if snapshots.is_empty() {
        return ui::style_text("No snapshots", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date (KST)"),
        ui::header_cell("Total (KRW)"),
        ui::header_cell("Change"),
        ui::header_cell("Accounts"),
        ui::header_cell("USD/KRW"),
        ui::header_cell("Memo"),
        ui::header_cell("Id"),
    ]);
    for snapshot in snapshots {
        let accounts = snapshot
            .accounts
            .iter()
            .map(|a| {
                format!(
                    "{} {} ({})",
                    a.account_id,
                    ui::krw(a.value),
                    signed_krw(a.change)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(kst_timestamp(snapshot)),
            ui::right_cell(ui::krw(snapshot.total_asset)),
            ui::pnl_cell(
                signed_krw(snapshot.total_asset_change),
                snapshot.total_asset_change,
            ),
            Cell::new(accounts),
            ui::right_cell(format!("{:.2}", snapshot.exchange_rate)),
            ui::format_optional_cell(snapshot.memo.as_deref(), str::to_string),
            Cell::new(ui::style_text(&snapshot.id, ui::StyleType::Subtle)),
        ]);
    }
    table.to_string()
}

/// Records total assets at the current rate using stored prices.
pub async fn run_take(ctx: &AppContext, memo: Option<String>) -> Result<()> {
    let rate = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
    let snapshot = take_snapshot(ctx.repository.as_ref(), rate.rate, memo).await?;
    println!(
        "{} {} ({})",
        ui::style_text("Saved snapshot:", ui::StyleType::TotalLabel),
        ui::style_text(&ui::krw(snapshot.total_asset), ui::StyleType::TotalValue),
        signed_krw(snapshot.total_asset_change)
    );
    Ok(())
}

pub async fn run_list(ctx: &AppContext, limit: Option<usize>) -> Result<()> {
    let snapshots = list_snapshots(ctx.repository.as_ref(), limit).await?;
    println!("{}", render_snapshots(&snapshots));
    Ok(())
}

pub async fn run_delete(ctx: &AppContext, id: &str) -> Result<()> {
    delete_snapshot(ctx.repository.as_ref(), id).await?;
    println!("Deleted snapshot {id}");
    Ok(())
}
