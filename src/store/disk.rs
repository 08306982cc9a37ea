use crate::core::model::{
    Account, AssetSnapshot, CashBalance, Holding, JournalEntry, Market, RealizedPnl, Sector,
    StoredRate, Trade,
};
use crate::core::repository::{Repository, UnitOfWork};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use fjall::{Batch, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const SEP: char = '\u{1f}';
const RATE_KEY: &str = "exchange_rate/USD";

fn key(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(SEP);
        }
        out.push_str(part);
    }
    out
}

fn prefix(account_id: &str) -> String {
    format!("{account_id}{SEP}")
}

fn holding_key(account_id: &str, holding: &Holding) -> String {
    key(&[account_id, holding.market.as_str(), &holding.code])
}

fn market_key(account_id: &str, market: Market) -> String {
    key(&[account_id, market.as_str()])
}

/// Repository persisted in a fjall keyspace, one partition per record type.
/// Values are JSON. Writes are serialized and each [`UnitOfWork`] is a single batch.
pub struct DiskRepository {
    keyspace: Keyspace,
    accounts: PartitionHandle,
    holdings: PartitionHandle,
    cash: PartitionHandle,
    realized: PartitionHandle,
    trades: PartitionHandle,
    journal: PartitionHandle,
    sectors: PartitionHandle,
    snapshots: PartitionHandle,
    meta: PartitionHandle,
    write_lock: Mutex<()>,
}

impl DiskRepository {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open data store at {}", path.display()))?;
        let open = |name: &str| -> Result<PartitionHandle> {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open partition {name}"))
        };

        debug!("Opened data store at {}", path.display());
        Ok(Self {
            accounts: open("accounts")?,
            holdings: open("holdings")?,
            cash: open("cash")?,
            realized: open("realized_pnl")?,
            trades: open("trades")?,
            journal: open("journal")?,
            sectors: open("sectors")?,
            snapshots: open("snapshots")?,
            meta: open("meta")?,
            keyspace,
            write_lock: Mutex::new(()),
        })
    }

    fn read<T: DeserializeOwned>(partition: &PartitionHandle, key: &str) -> Result<Option<T>> {
        match partition.get(key)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt record for key {key:?}"))?,
            )),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(partition: &PartitionHandle, prefix: &str) -> Result<Vec<T>> {
        partition
            .prefix(prefix)
            .map(|entry| -> Result<T> {
                let (_, bytes) = entry?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    fn scan_all<T: DeserializeOwned>(partition: &PartitionHandle) -> Result<Vec<T>> {
        partition
            .iter()
            .map(|entry| -> Result<T> {
                let (_, bytes) = entry?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    fn remove_prefix(batch: &mut Batch, partition: &PartitionHandle, prefix: &str) -> Result<()> {
        for entry in partition.prefix(prefix) {
            let (key, _) = entry?;
            batch.remove(partition, key);
        }
        Ok(())
    }

    fn put<T: Serialize>(
        batch: &mut Batch,
        partition: &PartitionHandle,
        key: &str,
        value: &T,
    ) -> Result<()> {
        batch.insert(partition, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn write(&self, batch: Batch) -> Result<()> {
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for DiskRepository {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Self::scan_all(&self.accounts)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Self::read(&self.accounts, account_id)
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let id = &account.account_id;
        let mut batch = self.keyspace.batch();
        Self::put(&mut batch, &self.accounts, id, account)?;
        if !self.accounts.contains_key(id)? {
            debug!("Creating cash balances for new account {}", id);
            for market in Market::ALL {
                let k = market_key(id, market);
                if !self.cash.contains_key(&k)? {
                    Self::put(&mut batch, &self.cash, &k, &CashBalance::zeroed(market))?;
                }
            }
        }
        self.write(batch)
    }

    async fn remove_account(&self, account_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.accounts.contains_key(account_id)? {
            return Ok(false);
        }
        let mut batch = self.keyspace.batch();
        batch.remove(&self.accounts, account_id);
        let rows = prefix(account_id);
        for partition in [&self.holdings, &self.cash, &self.realized] {
            Self::remove_prefix(&mut batch, partition, &rows)?;
        }
        let trades: Vec<Trade> = Self::scan_all(&self.trades)?;
        for trade in trades.iter().filter(|t| t.account_id == account_id) {
            batch.remove(&self.trades, trade.id.as_str());
        }
        self.write(batch)?;
        debug!("Removed account {}", account_id);
        Ok(true)
    }

    async fn load_holdings(&self, account_id: &str) -> Result<Vec<Holding>> {
        Self::scan(&self.holdings, &prefix(account_id))
    }

    async fn load_cash(&self, account_id: &str) -> Result<Vec<CashBalance>> {
        Self::scan(&self.cash, &prefix(account_id))
    }

    async fn load_realized_pnl(&self, account_id: &str) -> Result<RealizedPnl> {
        let rows: Vec<(Market, f64)> = Self::scan(&self.realized, &prefix(account_id))?;
        let mut pnl = RealizedPnl::default();
        for (market, amount) in rows {
            pnl.set(market, amount);
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
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        Self::put(
            &mut batch,
            &self.realized,
            &market_key(account_id, market),
            &(market, amount),
        )?;
        self.write(batch)
    }

    async fn commit(&self, work: UnitOfWork) -> Result<()> {
        // Held across the read of realized totals so deltas are never lost.
        let _guard = self.write_lock.lock().await;
        for id in &work.remove_trades {
            if !self.trades.contains_key(id.as_str())? {
                bail!("Trade not found: {id}");
            }
        }
        let account = work.account_id.as_str();
        let mut batch = self.keyspace.batch();

        for holding in &work.holdings {
            Self::put(
                &mut batch,
                &self.holdings,
                &holding_key(account, holding),
                holding,
            )?;
        }
        for balance in &work.cash {
            Self::put(
                &mut batch,
                &self.cash,
                &market_key(account, balance.market),
                balance,
            )?;
        }

        let mut realized = RealizedPnl::default();
        for (market, delta) in &work.realized_deltas {
            let k = market_key(account, *market);
            if !realized.0.contains_key(market) {
                let current: Option<(Market, f64)> = Self::read(&self.realized, &k)?;
                realized.set(*market, current.map_or(0.0, |(_, amount)| amount));
            }
            realized.adjust(*market, *delta);
        }
        for (market, amount) in realized.markets() {
            Self::put(
                &mut batch,
                &self.realized,
                &market_key(account, market),
                &(market, amount),
            )?;
        }

        for trade in &work.append_trades {
            Self::put(&mut batch, &self.trades, &trade.id, trade)?;
        }
        for id in &work.remove_trades {
            batch.remove(&self.trades, id.as_str());
        }

        self.write(batch)
    }

    async fn load_trades(&self, account_id: &str) -> Result<Vec<Trade>> {
        let trades: Vec<Trade> = Self::scan_all(&self.trades)?;
        Ok(super::newest_first(
            trades
                .into_iter()
                .filter(|t| t.account_id == account_id)
                .collect(),
        ))
    }

    async fn find_trade(&self, trade_id: &str) -> Result<Option<Trade>> {
        Self::read(&self.trades, trade_id)
    }

    async fn load_journal(&self) -> Result<Vec<JournalEntry>> {
        Self::scan_all(&self.journal)
    }

    async fn save_journal(&self, entry: &JournalEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        Self::put(&mut batch, &self.journal, &entry.date, entry)?;
        self.write(batch)
    }

    async fn delete_journal(&self, date: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.journal.contains_key(date)? {
            return Ok(false);
        }
        let mut batch = self.keyspace.batch();
        batch.remove(&self.journal, date);
        self.write(batch)?;
        Ok(true)
    }

    async fn load_sectors(&self) -> Result<Vec<Sector>> {
        let mut sectors: Vec<Sector> = Self::scan_all(&self.sectors)?;
        sectors.sort_by_key(|s| s.sort_order);
        Ok(sectors)
    }

    async fn upsert_sector(&self, sector: &Sector) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        Self::put(&mut batch, &self.sectors, &sector.code, sector)?;
        self.write(batch)
    }

    async fn load_exchange_rate(&self) -> Result<Option<StoredRate>> {
        Self::read(&self.meta, RATE_KEY)
    }

    async fn save_exchange_rate(&self, rate: &StoredRate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        Self::put(&mut batch, &self.meta, RATE_KEY, rate)?;
        self.write(batch)
    }

    async fn load_asset_snapshots(&self) -> Result<Vec<AssetSnapshot>> {
        Ok(super::latest_snapshots_first(Self::scan_all(&self.snapshots)?))
    }

    async fn save_asset_snapshot(&self, snapshot: &AssetSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        Self::put(&mut batch, &self.snapshots, &snapshot.id, snapshot)?;
        self.write(batch)
    }

    async fn delete_asset_snapshot(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.snapshots.contains_key(id)? {
            return Ok(false);
        }
        let mut batch = self.keyspace.batch();
        batch.remove(&self.snapshots, id);
        self.write(batch)?;
        Ok(true)
    }
}
