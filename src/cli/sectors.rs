use super::ui;
use crate::AppContext;
use crate::core::sectors::{add_sector, load_or_seed};
use anyhow::Result;
use comfy_table::Cell;

pub async fn run_list(ctx: &AppContext) -> Result<()> {
    let sectors = load_or_seed(ctx.repository.as_ref()).await?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Color"),
    ]);
    for sector in sectors {
        table.add_row(vec![
            ui::right_cell(sector.sort_order.to_string()),
            Cell::new(sector.code),
            Cell::new(sector.name),
            Cell::new(sector.color),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn run_add(ctx: &AppContext, code: &str, name: &str, color: Option<&str>) -> Result<()> {
    let sector = add_sector(ctx.repository.as_ref(), code, name, color).await?;
    println!(
        "Added sector {} ({}) at position {}",
        sector.code, sector.name, sector.sort_order
    );
    Ok(())
}
