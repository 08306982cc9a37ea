//! Persistence boundary for accounts, positions and the trade log.

use crate::core::ledger::{Changes, Snapshot};
use crate::core::model::{
    Account, AssetSnapshot, CashBalance, Holding, JournalEntry, Market, RealizedPnl, Sector,
    StoredRate, Trade,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;

/// Writes that must land together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    pub account_id: String,
    pub holdings: Vec<Holding>,
    pub cash: Vec<CashBalance>,
    pub realized_deltas: Vec<(Market, f64)>,
    pub append_trades: Vec<Trade>,
    pub remove_trades: Vec<String>,
}

impl UnitOfWork {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Self::default()
        }
    }

    /// Collects the rows named in `changes` from `snapshot`.
    pub fn from_changes(account_id: &str, snapshot: &Snapshot, changes: &Changes) -> Result<Self> {
        let mut work = Self::new(account_id);
        if let Some((market, code)) = &changes.holding {
            let holding = snapshot
                .holding(*market, code)
                .ok_or_else(|| anyhow!("Changed holding {code} missing from snapshot"))?;
            work.holdings.push(holding.clone());
        }
        for market in &changes.cash {
            let balance = snapshot
                .cash(*market)
                .ok_or_else(|| anyhow!("Changed cash balance {market} missing from snapshot"))?;
            work.cash.push(balance.clone());
        }
        work.realized_deltas.extend(changes.realized_delta);
        Ok(work)
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>>;
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>>;
    /// Creates or renames an account. New accounts get one zeroed cash row per market.
    async fn upsert_account(&self, account: &Account) -> Result<()>;
    /// Deletes the account with its holdings, cash, realized totals and trades.
    /// Returns false when it did not exist.
    async fn remove_account(&self, account_id: &str) -> Result<bool>;

    async fn load_holdings(&self, account_id: &str) -> Result<Vec<Holding>>;
    async fn load_cash(&self, account_id: &str) -> Result<Vec<CashBalance>>;
    async fn load_realized_pnl(&self, account_id: &str) -> Result<RealizedPnl>;

    async fn upsert_holding(&self, account_id: &str, holding: &Holding) -> Result<()>;
    async fn upsert_cash(&self, account_id: &str, balance: &CashBalance) -> Result<()>;
    async fn append_trade(&self, trade: &Trade) -> Result<()>;
    async fn adjust_realized_pnl(&self, account_id: &str, market: Market, delta: f64)
    -> Result<()>;
    async fn set_realized_pnl(&self, account_id: &str, market: Market, amount: f64) -> Result<()>;

    /// Applies every write in `work` atomically. Fails without writing
    /// anything when a trade in `remove_trades` does not exist.
    async fn commit(&self, work: UnitOfWork) -> Result<()>;

    /// Trades of `account_id`, newest first.
    async fn load_trades(&self, account_id: &str) -> Result<Vec<Trade>>;
    async fn find_trade(&self, trade_id: &str) -> Result<Option<Trade>>;

    async fn load_journal(&self) -> Result<Vec<JournalEntry>>;
    async fn save_journal(&self, entry: &JournalEntry) -> Result<()>;
    async fn delete_journal(&self, date: &str) -> Result<bool>;

    async fn load_sectors(&self) -> Result<Vec<Sector>>;
    async fn upsert_sector(&self, sector: &Sector) -> Result<()>;

    async fn load_exchange_rate(&self) -> Result<Option<StoredRate>>;
    async fn save_exchange_rate(&self, rate: &StoredRate) -> Result<()>;

    /// Asset snapshots, newest first.
    async fn load_asset_snapshots(&self) -> Result<Vec<AssetSnapshot>>;
    async fn save_asset_snapshot(&self, snapshot: &AssetSnapshot) -> Result<()>;
    async fn delete_asset_snapshot(&self, id: &str) -> Result<bool>;

    async fn load_snapshot(&self, account_id: &str) -> Result<Snapshot> {
        Ok(Snapshot {
            holdings: self.load_holdings(account_id).await?,
            cash: self.load_cash(account_id).await?,
            realized: self.load_realized_pnl(account_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_of_work_collects_changed_rows() {
        let snapshot = Snapshot {
            holdings: vec![Holding::new(Market::Us, "AAPL"), Holding::new(Market::Kr, "A")],
            cash: Market::ALL.iter().map(|m| CashBalance::zeroed(*m)).collect(),
            realized: RealizedPnl::default(),
        };
        let changes = Changes {
            holding: Some((Market::Us, "AAPL".to_string())),
            cash: vec![Market::Kr, Market::Us],
            realized_delta: Some((Market::Us, 12.5)),
        };

        let work = UnitOfWork::from_changes("main", &snapshot, &changes).unwrap();
        assert_eq!(work.account_id, "main");
        assert_eq!(work.holdings.len(), 1);
        assert_eq!(work.holdings[0].code, "AAPL");
        assert_eq!(work.cash.len(), 2);
        assert_eq!(work.realized_deltas, vec![(Market::Us, 12.5)]);
    }

    #[test]
    fn test_unit_of_work_rejects_unknown_rows() {
        let changes = Changes {
            holding: Some((Market::Us, "MSFT".to_string())),
            ..Changes::default()
        };
        assert!(UnitOfWork::from_changes("main", &Snapshot::default(), &changes).is_err());
    }
}
