//! Point-in-time records of total assets across accounts.

use crate::core::model::{AccountAsset, AssetSnapshot};
use crate::core::repository::Repository;
use crate::core::valuation::summarize_portfolio;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::info;

/// Rows shown by [`list_snapshots`] when no limit is given.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 50;

/// Builds a snapshot from per-account KRW values. Changes are measured
/// against `previous`; without one every change is zero, and an account
/// missing from it changes by its whole value.
pub fn build_snapshot(
    values: Vec<(String, f64)>,
    exchange_rate: f64,
    memo: Option<String>,
    previous: Option<&AssetSnapshot>,
    at: DateTime<Utc>,
) -> AssetSnapshot {
    let total_asset: f64 = values.iter().map(|(_, v)| v).sum();
    let accounts = values
        .into_iter()
        .map(|(account_id, value)| {
            let change = previous.map_or(0.0, |prev| {
                let before = prev
                    .accounts
                    .iter()
                    .find(|a| a.account_id == account_id)
                    .map_or(0.0, |a| a.value);
                value - before
            });
            AccountAsset {
                account_id,
                value,
                change,
            }
        })
        .collect();

    AssetSnapshot {
        id: uuid::Uuid::new_v4().to_string(),
        date: at,
        total_asset,
        total_asset_change: previous.map_or(0.0, |prev| total_asset - prev.total_asset),
        accounts,
        exchange_rate,
        memo: memo.filter(|m| !m.trim().is_empty()),
    }
}

/// Values every account at `usd_krw` from stored prices and saves the result.
pub async fn take_snapshot(
    repo: &dyn Repository,
    usd_krw: f64,
    memo: Option<String>,
) -> Result<AssetSnapshot> {
    let mut values = Vec::new();
    for account in repo.list_accounts().await? {
        let snapshot = repo.load_snapshot(&account.account_id).await?;
        let summary = summarize_portfolio(&snapshot.holdings, &snapshot.cash, usd_krw);
        values.push((account.account_id, summary.total_value));
    }

    let previous = repo.load_asset_snapshots().await?.into_iter().next();
    let snapshot = build_snapshot(values, usd_krw, memo, previous.as_ref(), Utc::now());
    repo.save_asset_snapshot(&snapshot).await?;
    info!(
        id = %snapshot.id,
        total = snapshot.total_asset,
        "Saved asset snapshot"
    );
    Ok(snapshot)
}

pub async fn list_snapshots(
    repo: &dyn Repository,
    limit: Option<usize>,
) -> Result<Vec<AssetSnapshot>> {
    let mut snapshots = repo.load_asset_snapshots().await?;
    snapshots.truncate(limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT));
    Ok(snapshots)
}

pub async fn delete_snapshot(repo: &dyn Repository, id: &str) -> Result<()> {
    if repo.delete_asset_snapshot(id).await? {
        Ok(())
    } else {
        Err(anyhow!("Snapshot not found: {id}"))
    }
}
