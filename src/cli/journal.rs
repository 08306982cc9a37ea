use super::ui;
use crate::AppContext;
use crate::core::journal::{list_entries, save_entry};
use crate::core::model::JournalEntry;
use anyhow::Result;
use comfy_table::{Cell, Color};

pub fn render_journal(entries: &[JournalEntry]) -> String {
    if entries.is_empty() {
        return ui::style_text("No journal entries", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("!"),
        ui::header_cell("Entry"),
    ]);
    for entry in entries {
        let flag = if entry.important {
            Cell::new("★").fg(Color::Yellow)
        } else {
            Cell::new("")
        };
        table.add_row(vec![Cell::new(&entry.date), flag, Cell::new(&entry.content)]);
    }
    table.to_string()
}

pub async fn run_show(ctx: &AppContext, month: Option<&str>) -> Result<()> {
    let entries = list_entries(ctx.repository.as_ref(), month).await?;
    println!("{}", render_journal(&entries));
    Ok(())
}

pub async fn run_set(
    ctx: &AppContext,
    date: &str,
    content: Option<&str>,
    important: Option<bool>,
) -> Result<()> {
    match save_entry(ctx.repository.as_ref(), date, content, important).await? {
        Some(entry) => println!("Saved journal entry for {}", entry.date),
        None => println!("Removed journal entry for {date}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_journal_marks_important() {
        let entries = vec![JournalEntry {
            date: "2024-05-02".to_string(),
            content: "Trimmed semis".to_string(),
            important: true,
        }];
        let output = console::strip_ansi_codes(&render_journal(&entries)).to_string();
        assert!(output.contains("2024-05-02"));
        assert!(output.contains("★"));
        assert!(output.contains("Trimmed semis"));
    }
}
