//! Trading journal: one free-text entry per day.

use crate::core::model::JournalEntry;
use crate::core::repository::Repository;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

const RECENT_LIMIT: usize = 100;

/// Saves the entry for `date`. Omitted fields keep their stored value.
///
/// Blank content with no `important` flag removes the entry and returns `None`.
pub async fn save_entry(
    repo: &dyn Repository,
    date: &str,
    content: Option<&str>,
    important: Option<bool>,
) -> Result<Option<JournalEntry>> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid journal date '{date}', expected YYYY-MM-DD"))?;

    if content.is_none_or(|c| c.trim().is_empty()) && important.is_none() {
        let removed = repo.delete_journal(date).await?;
        debug!(date, removed, "Cleared journal entry");
        return Ok(None);
    }

    let existing = repo
        .load_journal()
        .await?
        .into_iter()
        .find(|e| e.date == date);
    let entry = match existing {
        Some(mut entry) => {
            if let Some(content) = content {
                entry.content = content.to_string();
            }
            if let Some(important) = important {
                entry.important = important;
            }
            entry
        }
        None => JournalEntry {
            date: date.to_string(),
            content: content.unwrap_or_default().to_string(),
            important: important.unwrap_or(false),
        },
    };
    repo.save_journal(&entry).await?;
    Ok(Some(entry))
}

/// Entries of one `YYYY-MM` month in date order, or the latest hundred newest first.
pub async fn list_entries(repo: &dyn Repository, month: Option<&str>) -> Result<Vec<JournalEntry>> {
    let mut entries = repo.load_journal().await?;
    match month {
        Some(month) => {
            entries.retain(|e| e.date.starts_with(month));
            entries.sort_by(|a, b| a.date.cmp(&b.date));
        }
        None => {
            entries.sort_by(|a, b| b.date.cmp(&a.date));
            entries.truncate(RECENT_LIMIT);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRepository;

    #[tokio::test]
    async fn test_save_updates_and_clears() {
        let repo = MemoryRepository::new();
        save_entry(&repo, "2024-05-02", Some("Bought the dip"), None)
            .await
            .unwrap();
        let entry = save_entry(&repo, "2024-05-02", None, Some(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content, "Bought the dip");
        assert!(entry.important);

        assert!(save_entry(&repo, "2024-05-02", Some("  "), None)
            .await
            .unwrap()
            .is_none());
        assert!(repo.load_journal().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flag_alone_keeps_empty_entry() {
        let repo = MemoryRepository::new();
        let entry = save_entry(&repo, "2024-05-03", Some(""), Some(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content, "");
        assert_eq!(repo.load_journal().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_malformed_date() {
        let repo = MemoryRepository::new();
        assert!(save_entry(&repo, "May 2nd", Some("x"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_list_by_month_and_recent() {
        let repo = MemoryRepository::new();
        for date in ["2024-04-30", "2024-05-10", "2024-05-01"] {
            save_entry(&repo, date, Some(date), None).await.unwrap();
        }

        let may: Vec<_> = list_entries(&repo, Some("2024-05"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(may, vec!["2024-05-01", "2024-05-10"]);

        let recent = list_entries(&repo, None).await.unwrap();
        assert_eq!(recent[0].date, "2024-05-10");
        assert_eq!(recent.len(), 3);
    }
}
