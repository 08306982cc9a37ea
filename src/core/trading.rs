//! Applies trade requests against the repository, one key at a time.

use crate::core::ledger::{LedgerError, TradeRequest, apply_trade, reverse_trade};
use crate::core::locks::{KeyLocks, LockKey};
use crate::core::model::{Market, Trade, TradeKind};
use crate::core::repository::{Repository, UnitOfWork};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

const KST_OFFSET_HOURS: i64 = 9;
const SESSION_START_HOUR: i64 = 8;
/// KST hour given to trades entered with a bare date.
const DATE_ONLY_HOUR: u32 = 9;

/// Rows returned by [`TradeService::list_trades`] when no limit is given.
pub const DEFAULT_TRADE_LIMIT: usize = 100;

/// Korean trading day of `at`: the KST calendar day, rolled back one day before 08:00.
pub fn trading_date(at: DateTime<Utc>) -> NaiveDate {
    (at.naive_utc() + Duration::hours(KST_OFFSET_HOURS - SESSION_START_HOUR)).date()
}

/// KST calendar day of `at`.
pub fn kst_date(at: DateTime<Utc>) -> NaiveDate {
    (at.naive_utc() + Duration::hours(KST_OFFSET_HOURS)).date()
}

/// Parses a user-entered trade time: RFC 3339, or KST `YYYY-MM-DD HH:MM`,
/// or a KST `YYYY-MM-DD` that lands inside that trading day.
pub fn parse_trade_time(text: &str) -> Result<DateTime<Utc>, LedgerError> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    let local = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(DATE_ONLY_HOUR, 0, 0))
        })
        .ok_or_else(|| LedgerError::InvalidDate(text.to_string()))?;
    Ok((local - Duration::hours(KST_OFFSET_HOURS)).and_utc())
}

/// Which trades to list. `date` selects one trading day and takes precedence
/// over the inclusive KST range `from..=to`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeFilter {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &Trade) -> bool {
        if let Some(day) = self.date {
            return trading_date(trade.date) == day;
        }
        let day = kst_date(trade.date);
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }
}

/// Serialization keys: the holding for orders, the cash balance for cash movements.
fn lock_keys(account_id: &str, request: &TradeRequest) -> Vec<LockKey> {
    match request {
        TradeRequest::Buy(o) | TradeRequest::Sell(o) => {
            vec![LockKey::holding(account_id, o.market, &o.code)]
        }
        TradeRequest::Deposit(c) | TradeRequest::Withdraw(c) => {
            vec![LockKey::cash(account_id, c.market)]
        }
        TradeRequest::Exchange(e) => {
            let (from, to) = e.direction.legs();
            vec![LockKey::cash(account_id, from), LockKey::cash(account_id, to)]
        }
    }
}

/// Keys a recorded trade touched. Records missing their market fields lock
/// every cash row of the account.
fn trade_keys(trade: &Trade) -> Vec<LockKey> {
    let account = trade.account_id.as_str();
    match (trade.kind, trade.market, trade.code.as_deref(), trade.direction) {
        (TradeKind::Buy | TradeKind::Sell, Some(market), Some(code), _) => {
            vec![LockKey::holding(account, market, code)]
        }
        (TradeKind::Deposit | TradeKind::Withdraw, Some(market), _, _) => {
            vec![LockKey::cash(account, market)]
        }
        (TradeKind::Exchange, _, _, Some(direction)) => {
            let (from, to) = direction.legs();
            vec![LockKey::cash(account, from), LockKey::cash(account, to)]
        }
        _ => Market::ALL
            .iter()
            .map(|m| LockKey::cash(account, *m))
            .collect(),
    }
}

pub struct TradeService {
    repository: Arc<dyn Repository>,
    locks: Arc<KeyLocks>,
}

impl TradeService {
    /// `locks` must be shared with every other writer of holdings and cash.
    pub fn new(repository: Arc<dyn Repository>, locks: Arc<KeyLocks>) -> Self {
        Self { repository, locks }
    }

    /// Validates and applies `request`, persisting the changed rows and the
    /// trade record in one unit of work. Ledger rejections are returned as
    /// [`LedgerError`](crate::core::ledger::LedgerError) inside the error.
    pub async fn apply(&self, account_id: &str, request: &TradeRequest) -> Result<Trade> {
        let _guard = self.locks.acquire(lock_keys(account_id, request)).await;
        if self.repository.get_account(account_id).await?.is_none() {
            return Err(anyhow!("Account not found: {account_id}"));
        }

        let snapshot = self.repository.load_snapshot(account_id).await?;
        let applied = apply_trade(&snapshot, account_id, request)?;

        let mut work = UnitOfWork::from_changes(account_id, &applied.snapshot, &applied.changes)?;
        work.append_trades.push(applied.trade.clone());
        self.repository.commit(work).await?;

        info!(
            account = account_id,
            kind = %applied.trade.kind,
            id = %applied.trade.id,
            "Recorded trade"
        );
        Ok(applied.trade)
    }

    /// Trades of `account_id` newest first, at most [`DEFAULT_TRADE_LIMIT`]
    /// unless the filter says otherwise.
    pub async fn list_trades(&self, account_id: &str, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let trades = self.repository.load_trades(account_id).await?;
        Ok(trades
            .into_iter()
            .filter(|t| filter.matches(t))
            .take(filter.limit.unwrap_or(DEFAULT_TRADE_LIMIT))
            .collect())
    }

    /// Deletes a trade. Only a sell's realized profit is reversed.
    pub async fn delete_trade(&self, trade_id: &str) -> Result<Trade> {
        let not_found = || anyhow!("Trade not found: {trade_id}");
        let found = self
            .repository
            .find_trade(trade_id)
            .await?
            .ok_or_else(not_found)?;

        let _guard = self.locks.acquire(trade_keys(&found)).await;
        // A concurrent delete may have taken the lock first.
        let trade = self
            .repository
            .find_trade(trade_id)
            .await?
            .ok_or_else(not_found)?;

        let snapshot = self.repository.load_snapshot(&trade.account_id).await?;
        let (reversed, changes) = reverse_trade(&snapshot, &trade);
        let mut work = UnitOfWork::from_changes(&trade.account_id, &reversed, &changes)?;
        work.remove_trades.push(trade.id.clone());
        self.repository.commit(work).await?;

        debug!(id = %trade.id, kind = %trade.kind, "Deleted trade");
        Ok(trade)
    }
}
