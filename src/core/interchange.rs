//! JSON backup document for bulk export and import.

use crate::core::model::{Account, CashBalance, Holding, JournalEntry, Market, StoredRate, Trade};
use crate::core::repository::Repository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Replace every row present in the document.
    #[default]
    Overwrite,
    /// Keep existing holdings, funded cash balances and journal entries.
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountExport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default)]
    pub portfolio: Vec<Holding>,
    #[serde(default)]
    pub cash: BTreeMap<Market, f64>,
    #[serde(default)]
    pub cash_target_weights: BTreeMap<Market, f64>,
    #[serde(default)]
    pub cash_memos: BTreeMap<Market, String>,
    #[serde(default, rename = "realizedPnL")]
    pub realized_pnl: BTreeMap<Market, f64>,
}

/// A journal value is either bare text or text with its flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JournalValue {
    Text(String),
    Entry {
        content: String,
        #[serde(default)]
        important: bool,
    },
}

impl JournalValue {
    fn into_entry(self, date: &str) -> JournalEntry {
        let (content, important) = match self {
            JournalValue::Text(content) => (content, false),
            JournalValue::Entry { content, important } => (content, important),
        };
        JournalEntry {
            date: date.to_string(),
            content,
            important,
        }
    }
}

impl From<&JournalEntry> for JournalValue {
    fn from(entry: &JournalEntry) -> Self {
        if entry.important {
            JournalValue::Entry {
                content: entry.content.clone(),
                important: true,
            }
        } else {
            JournalValue::Text(entry.content.clone())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default)]
    pub account_data: BTreeMap<String, AccountExport>,
    #[serde(default)]
    pub journal_data: BTreeMap<String, JournalValue>,
    /// Written for reference only; import never replays it.
    #[serde(default, skip_deserializing)]
    pub trade_history: Vec<Trade>,
    #[serde(default, rename = "exchangeRateUSD")]
    pub exchange_rate_usd: Option<f64>,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub accounts: usize,
    pub holdings: usize,
    pub skipped_holdings: usize,
    pub cash_balances: usize,
    pub journal_entries: usize,
}

/// Builds a document holding every account, the journal, all trades and `exchange_rate`.
pub async fn export(repo: &dyn Repository, exchange_rate: f64) -> Result<ExportDocument> {
    let mut doc = ExportDocument {
        exchange_rate_usd: Some(exchange_rate),
        exported_at: Some(Utc::now()),
        ..ExportDocument::default()
    };

    for account in repo.list_accounts().await? {
        let id = &account.account_id;
        let mut export = AccountExport {
            account_name: Some(account.name.clone()),
            portfolio: repo.load_holdings(id).await?,
            ..AccountExport::default()
        };
        for balance in repo.load_cash(id).await? {
            export.cash.insert(balance.market, balance.amount);
            export
                .cash_target_weights
                .insert(balance.market, balance.target_weight);
            export
                .cash_memos
                .insert(balance.market, balance.memo.unwrap_or_default());
        }
        export.realized_pnl = repo.load_realized_pnl(id).await?.0;
        doc.trade_history.extend(repo.load_trades(id).await?);
        doc.account_data.insert(id.clone(), export);
    }
    doc.trade_history.sort_by(|a, b| b.date.cmp(&a.date));

    for entry in repo.load_journal().await? {
        doc.journal_data
            .insert(entry.date.clone(), JournalValue::from(&entry));
    }

    debug!(
        accounts = doc.account_data.len(),
        trades = doc.trade_history.len(),
        "Built export document"
    );
    Ok(doc)
}

/// Loads `doc` into the repository. Realized P&L is always replaced by the
/// document's figures, in both modes.
pub async fn import(
    repo: &dyn Repository,
    doc: ExportDocument,
    mode: ImportMode,
) -> Result<ImportSummary> {
    let merge = mode == ImportMode::Merge;
    let mut summary = ImportSummary::default();

    for (account_id, data) in doc.account_data {
        match repo.get_account(&account_id).await? {
            None => {
                let name = data.account_name.clone().unwrap_or_else(|| account_id.clone());
                repo.upsert_account(&Account {
                    account_id: account_id.clone(),
                    name,
                })
                .await?;
            }
            Some(existing) => {
                if let Some(name) = data.account_name.as_ref().filter(|n| **n != existing.name) {
                    repo.upsert_account(&Account {
                        account_id: account_id.clone(),
                        name: name.clone(),
                    })
                    .await?;
                }
            }
        }
        summary.accounts += 1;

        let existing = repo.load_holdings(&account_id).await?;
        for holding in data.portfolio {
            if merge && existing.iter().any(|h| h.is_key(holding.market, &holding.code)) {
                summary.skipped_holdings += 1;
                continue;
            }
            repo.upsert_holding(&account_id, &holding).await?;
            summary.holdings += 1;
        }

        let current_cash = repo.load_cash(&account_id).await?;
        for market in Market::ALL {
            let funded = current_cash
                .iter()
                .any(|c| c.market == market && c.amount != 0.0);
            if merge && funded {
                continue;
            }
            let balance = CashBalance {
                market,
                amount: data.cash.get(&market).copied().unwrap_or(0.0),
                target_weight: data.cash_target_weights.get(&market).copied().unwrap_or(0.0),
                memo: data
                    .cash_memos
                    .get(&market)
                    .filter(|m| !m.is_empty())
                    .cloned(),
            };
            repo.upsert_cash(&account_id, &balance).await?;
            summary.cash_balances += 1;
        }

        for (market, amount) in data.realized_pnl {
            repo.set_realized_pnl(&account_id, market, amount).await?;
        }
    }

    let existing_dates: Vec<String> = if merge {
        repo.load_journal().await?.into_iter().map(|e| e.date).collect()
    } else {
        Vec::new()
    };
    for (date, value) in doc.journal_data {
        let entry = value.into_entry(&date);
        if entry.content.is_empty() && !entry.important {
            continue;
        }
        if existing_dates.contains(&date) {
            continue;
        }
        repo.save_journal(&entry).await?;
        summary.journal_entries += 1;
    }

    // The document's rate only replaces an older persisted one.
    if let Some(rate) = doc.exchange_rate_usd.filter(|r| *r > 0.0) {
        let imported = StoredRate {
            rate,
            updated_at: doc.exported_at.unwrap_or_else(Utc::now),
        };
        let stored = repo.load_exchange_rate().await?;
        if stored.is_none_or(|s| s.updated_at < imported.updated_at) {
            repo.save_exchange_rate(&imported).await?;
        }
    }

    info!(
        accounts = summary.accounts,
        holdings = summary.holdings,
        skipped = summary.skipped_holdings,
        "Imported backup"
    );
    Ok(summary)
}
