//! Direct edits to holdings and cash balances outside the trade ledger.

use crate::core::ledger::LedgerError;
use crate::core::locks::{KeyLocks, LockKey};
use crate::core::model::{CashBalance, Holding, Market};
use crate::core::repository::Repository;
use anyhow::{Result, anyhow};

/// Optional edits to a holding; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionEdit {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub target_weight: Option<f64>,
    pub memo: Option<String>,
    pub current_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CashEdit {
    pub amount: Option<f64>,
    pub target_weight: Option<f64>,
    pub memo: Option<String>,
}

fn check_weight(value: Option<f64>) -> Result<(), LedgerError> {
    match value {
        Some(w) if !w.is_finite() || !(0.0..=100.0).contains(&w) => Err(LedgerError::InvalidAmount {
            field: "target_weight",
            value: w,
        }),
        _ => Ok(()),
    }
}

/// Empty memo text clears the memo.
fn memo(text: String) -> Option<String> {
    Some(text).filter(|m| !m.trim().is_empty())
}

/// Applies `edit` to the holding, creating an empty one when it does not exist yet.
pub async fn edit_position(
    repo: &dyn Repository,
    locks: &KeyLocks,
    account_id: &str,
    market: Market,
    code: &str,
    edit: PositionEdit,
) -> Result<Holding> {
    let code = code.trim();
    if code.is_empty() {
        return Err(LedgerError::MissingCode.into());
    }
    check_weight(edit.target_weight)?;
    if let Some(price) = edit.current_price.filter(|p| !p.is_finite() || *p < 0.0) {
        return Err(LedgerError::InvalidAmount {
            field: "current_price",
            value: price,
        }
        .into());
    }
    repo.get_account(account_id)
        .await?
        .ok_or_else(|| anyhow!("Account not found: {account_id}"))?;

    let _guard = locks
        .acquire(vec![LockKey::holding(account_id, market, code)])
        .await;
    let mut holding = repo
        .load_holdings(account_id)
        .await?
        .into_iter()
        .find(|h| h.is_key(market, code))
        .unwrap_or_else(|| Holding::new(market, code));

    if let Some(name) = edit.name {
        holding.name = name;
    }
    if let Some(sector) = edit.sector {
        holding.sector = sector.trim().to_uppercase();
    }
    if let Some(weight) = edit.target_weight {
        holding.target_weight = weight;
    }
    if let Some(text) = edit.memo {
        holding.memo = memo(text);
    }
    if let Some(price) = edit.current_price {
        holding.current_price = price;
    }

    repo.upsert_holding(account_id, &holding).await?;
    Ok(holding)
}

pub async fn edit_cash(
    repo: &dyn Repository,
    locks: &KeyLocks,
    account_id: &str,
    market: Market,
    edit: CashEdit,
) -> Result<CashBalance> {
    check_weight(edit.target_weight)?;
    if let Some(amount) = edit.amount.filter(|a| !a.is_finite()) {
        return Err(LedgerError::InvalidAmount {
            field: "amount",
            value: amount,
        }
        .into());
    }
    repo.get_account(account_id)
        .await?
        .ok_or_else(|| anyhow!("Account not found: {account_id}"))?;

    let _guard = locks.acquire(vec![LockKey::cash(account_id, market)]).await;
    let mut balance = repo
        .load_cash(account_id)
        .await?
        .into_iter()
        .find(|c| c.market == market)
        .unwrap_or_else(|| CashBalance::zeroed(market));

    if let Some(amount) = edit.amount {
        balance.amount = amount;
    }
    if let Some(weight) = edit.target_weight {
        balance.target_weight = weight;
    }
    if let Some(text) = edit.memo {
        balance.memo = memo(text);
    }

    repo.upsert_cash(account_id, &balance).await?;
    Ok(balance)
}
