use crate::core::model::{
    Account, AssetSnapshot, CashBalance, Holding, JournalEntry, Market, RealizedPnl, Sector,
    StoredRate, Trade,
};
use crate::core::repository::{Repository, UnitOfWork};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct State {
    accounts: BTreeMap<String, Account>,
    holdings: BTreeMap<(String, Market, String), Holding>,
    cash: BTreeMap<(String, Market), CashBalance>,
    realized: BTreeMap<(String, Market), f64>,
    trades: BTreeMap<String, Trade>,
    journal: BTreeMap<String, JournalEntry>,
    sectors: BTreeMap<String, Sector>,
    rate: Option<StoredRate>,
    snapshots: BTreeMap<String, AssetSnapshot>,
}

impl State {
    fn apply(&mut self, work: UnitOfWork) -> Result<()> {
        if let Some(id) = work.remove_trades.iter().find(|id| !self.trades.contains_key(*id)) {
            bail!("Trade not found: {id}");
        }
        let account = work.account_id;
        for holding in work.holdings {
            let key = (account.clone(), holding.market, holding.code.clone());
            self.holdings.insert(key, holding);
        }
        for balance in work.cash {
            self.cash.insert((account.clone(), balance.market), balance);
        }
        for (market, delta) in work.realized_deltas {
            *self.realized.entry((account.clone(), market)).or_insert(0.0) += delta;
        }
        for trade in work.append_trades {
            self.trades.insert(trade.id.clone(), trade);
        }
        for id in work.remove_trades {
            self.trades.remove(&id);
        }
        Ok(())
    }
}

/// Repository kept entirely in memory. Every call takes one lock, so a
/// [`UnitOfWork`] is applied atomically.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.state.lock().await.accounts.values().cloned().collect())
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(account_id).cloned())
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = account.account_id.clone();
        if state.accounts.insert(id.clone(), account.clone()).is_none() {
            debug!("Creating cash balances for new account {}", id);
            for market in Market::ALL {
                state
                    .cash
                    .entry((id.clone(), market))
                    .or_insert_with(|| CashBalance::zeroed(market));
            }
        }
        Ok(())
    }

    async fn remove_account(&self, account_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.accounts.remove(account_id).is_none() {
            return Ok(false);
        }
        state.holdings.retain(|(account, _, _), _| account != account_id);
        state.cash.retain(|(account, _), _| account != account_id);
        state.realized.retain(|(account, _), _| account != account_id);
        state.trades.retain(|_, trade| trade.account_id != account_id);
        Ok(true)
    }

    async fn load_holdings(&self, account_id: &str) -> Result<Vec<Holding>> {
        let state = self.state.lock().await;
        Ok(state
            .holdings
            .iter()
            .filter(|((account, _, _), _)| account == account_id)
            .map(|(_, h)| h.clone())
            .collect())
    }

    async fn load_cash(&self, account_id: &str) -> Result<Vec<CashBalance>> {
        let state = self.state.lock().await;
        Ok(state
            .cash
            .iter()
            .filter(|((account, _), _)| account == account_id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn load_realized_pnl(&self, account_id: &str) -> Result<RealizedPnl> {
        let state = self.state.lock().await;
        let mut pnl = RealizedPnl::default();
        for ((account, market), amount) in &state.realized {
            if account == account_id {
                pnl.set(*market, *amount);
            }
        }
        Ok(pnl)
    }

    async fn upsert_holding(&self, account_id: &str, holding: &Holding) -> Result<()> {
        let mut work = UnitOfWork::new(account_id);
        work.holdings.push(holding.clone());
        self.commit(work).await
    }

    async fn upsert_cash(&self, account_id: &str, balance: &CashBalance) -> Result<()> {
        let mut work = UnitOfWork::new(account_id);
        work.cash.push(balance.clone());
        self.commit(work).await
    }

    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        let mut work = UnitOfWork::new(&trade.account_id);
        work.append_trades.push(trade.clone());
        self.commit(work).await
    }

    async fn adjust_realized_pnl(
        &self,
        account_id: &str,
        market: Market,
        delta: f64,
    ) -> Result<()> {
        let mut work = UnitOfWork::new(account_id);
        work.realized_deltas.push((market, delta));
        self.commit(work).await
    }

    async fn set_realized_pnl(&self, account_id: &str, market: Market, amount: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.realized.insert((account_id.to_string(), market), amount);
        Ok(())
    }

    async fn commit(&self, work: UnitOfWork) -> Result<()> {
        self.state.lock().await.apply(work)
    }

    async fn load_trades(&self, account_id: &str) -> Result<Vec<Trade>> {
        let state = self.state.lock().await;
        let trades = state
            .trades
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        Ok(super::newest_first(trades))
    }

    async fn find_trade(&self, trade_id: &str) -> Result<Option<Trade>> {
        Ok(self.state.lock().await.trades.get(trade_id).cloned())
    }

    async fn load_journal(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.state.lock().await.journal.values().cloned().collect())
    }

    async fn save_journal(&self, entry: &JournalEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal.insert(entry.date.clone(), entry.clone());
        Ok(())
    }

    async fn delete_journal(&self, date: &str) -> Result<bool> {
        Ok(self.state.lock().await.journal.remove(date).is_some())
    }

    async fn load_sectors(&self) -> Result<Vec<Sector>> {
        let state = self.state.lock().await;
        let mut sectors: Vec<Sector> = state.sectors.values().cloned().collect();
        sectors.sort_by_key(|s| s.sort_order);
        Ok(sectors)
    }

    async fn upsert_sector(&self, sector: &Sector) -> Result<()> {
        let mut state = self.state.lock().await;
        state.sectors.insert(sector.code.clone(), sector.clone());
        Ok(())
    }

    async fn load_exchange_rate(&self) -> Result<Option<StoredRate>> {
        Ok(self.state.lock().await.rate)
    }

    async fn save_exchange_rate(&self, rate: &StoredRate) -> Result<()> {
        self.state.lock().await.rate = Some(*rate);
        Ok(())
    }

    async fn load_asset_snapshots(&self) -> Result<Vec<AssetSnapshot>> {
        let snapshots = self.state.lock().await.snapshots.values().cloned().collect();
        Ok(super::latest_snapshots_first(snapshots))
    }

    async fn save_asset_snapshot(&self, snapshot: &AssetSnapshot) -> Result<()> {
        let mut state = self.state.lock().await;
        state.snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete_asset_snapshot(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().await.snapshots.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::TradeKind;
    use chrono::{Duration, Utc};

    fn account(id: &str) -> Account {
        Account {
            account_id: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn test_new_account_gets_one_cash_row_per_market() {
        let repo = MemoryRepository::new();
        repo.upsert_account(&account("main")).await.unwrap();

        let mut funded = CashBalance::zeroed(Market::Kr);
        funded.amount = 5000.0;
        repo.upsert_cash("main", &funded).await.unwrap();

        // Renaming must not reset balances.
        repo.upsert_account(&Account {
            account_id: "main".to_string(),
            name: "Main".to_string(),
        })
        .await
        .unwrap();

        let cash = repo.load_cash("main").await.unwrap();
        assert_eq!(cash.len(), 3);
        assert_eq!(cash.iter().find(|c| c.market == Market::Kr).unwrap().amount, 5000.0);
        assert_eq!(repo.get_account("main").await.unwrap().unwrap().name, "Main");
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let repo = MemoryRepository::new();
        repo.upsert_account(&account("main")).await.unwrap();
        repo.adjust_realized_pnl("main", Market::Us, 10.0).await.unwrap();

        let trade = Trade::new("main", TradeKind::Sell, Utc::now());
        let mut work = UnitOfWork::new("main");
        work.holdings.push(Holding::new(Market::Us, "AAPL"));
        work.realized_deltas.push((Market::Us, 5.5));
        work.append_trades.push(trade.clone());
        repo.commit(work).await.unwrap();

        assert_eq!(repo.load_holdings("main").await.unwrap().len(), 1);
        assert_eq!(repo.load_realized_pnl("main").await.unwrap().get(Market::Us), 15.5);
        assert_eq!(repo.find_trade(&trade.id).await.unwrap(), Some(trade.clone()));

        let mut work = UnitOfWork::new("main");
        work.remove_trades.push(trade.id.clone());
        repo.commit(work).await.unwrap();
        assert!(repo.find_trade(&trade.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_removing_missing_trade_writes_nothing() {
        let repo = MemoryRepository::new();
        repo.upsert_account(&account("main")).await.unwrap();

        let mut work = UnitOfWork::new("main");
        work.realized_deltas.push((Market::Kr, -200.0));
        work.remove_trades.push("gone".to_string());
        let err = repo.commit(work).await.unwrap_err();

        assert_eq!(err.to_string(), "Trade not found: gone");
        assert_eq!(repo.load_realized_pnl("main").await.unwrap().get(Market::Kr), 0.0);
    }

    #[tokio::test]
    async fn test_remove_account_drops_its_rows_only() {
        let repo = MemoryRepository::new();
        repo.upsert_account(&account("main")).await.unwrap();
        repo.upsert_account(&account("other")).await.unwrap();
        repo.upsert_holding("main", &Holding::new(Market::Us, "AAPL"))
            .await
            .unwrap();
        repo.adjust_realized_pnl("main", Market::Us, 3.0).await.unwrap();
        repo.append_trade(&Trade::new("main", TradeKind::Deposit, Utc::now()))
            .await
            .unwrap();
        repo.append_trade(&Trade::new("other", TradeKind::Deposit, Utc::now()))
            .await
            .unwrap();

        assert!(repo.remove_account("main").await.unwrap());
        assert!(!repo.remove_account("main").await.unwrap());

        assert!(repo.get_account("main").await.unwrap().is_none());
        assert!(repo.load_holdings("main").await.unwrap().is_empty());
        assert!(repo.load_cash("main").await.unwrap().is_empty());
        assert_eq!(repo.load_realized_pnl("main").await.unwrap(), RealizedPnl::default());
        assert!(repo.load_trades("main").await.unwrap().is_empty());
        assert_eq!(repo.load_cash("other").await.unwrap().len(), 3);
        assert_eq!(repo.load_trades("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trades_are_scoped_and_sorted() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let older = Trade::new("main", TradeKind::Deposit, now - Duration::days(1));
        let newer = Trade::new("main", TradeKind::Withdraw, now);
        let other = Trade::new("other", TradeKind::Deposit, now);
        for t in [&older, &newer, &other] {
            repo.append_trade(t).await.unwrap();
        }

        let trades = repo.load_trades("main").await.unwrap();
        assert_eq!(trades, vec![newer, older]);
    }
}
