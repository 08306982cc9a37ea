use crate::AppContext;
use crate::core::interchange::{ExportDocument, ImportMode, export, import};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Writes the backup document to `output`, or to stdout.
pub async fn run_export(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    let rate = ctx.rates.current_rate(ctx.repository.as_ref()).await?;
    let doc = export(ctx.repository.as_ref(), rate.rate).await?;
    let json = serde_json::to_string_pretty(&doc)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write export file: {}", path.display()))?;
            info!("Exported {} accounts to {}", doc.account_data.len(), path.display());
            eprintln!("Exported {} accounts to {}", doc.account_data.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn run_import(ctx: &AppContext, input: &Path, mode: ImportMode) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read import file: {}", input.display()))?;
    let doc: ExportDocument = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse import file: {}", input.display()))?;

    let summary = import(ctx.repository.as_ref(), doc, mode).await?;
    println!(
        "Imported {} accounts: {} holdings ({} kept as-is), {} cash balances, {} journal entries",
        summary.accounts,
        summary.holdings,
        summary.skipped_holdings,
        summary.cash_balances,
        summary.journal_entries
    );
    Ok(())
}
