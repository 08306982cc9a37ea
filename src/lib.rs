pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::currency::ExchangeRateService;
use crate::core::interchange::ImportMode;
use crate::core::ledger::TradeRequest;
use crate::core::locks::KeyLocks;
use crate::core::model::{ExchangeDirection, Market};
use crate::core::positions::{CashEdit, PositionEdit};
use crate::core::price::QuoteService;
use crate::core::repository::Repository;
use crate::core::trading::{TradeFilter, TradeService};
use crate::providers::{
    CoinGeckoProvider, ExchangeRateApiProvider, NaverProvider, YahooFinanceProvider,
};
use crate::store::DiskRepository;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Summary {
        account: Option<String>,
        refresh: bool,
    },
    Rebalance {
        account: Option<String>,
    },
    RefreshPrices {
        account: Option<String>,
    },
    Rate,
    Trade {
        account: Option<String>,
        request: TradeRequest,
    },
    /// Currency conversion; `to_amount` is derived from the current rate when absent.
    Exchange {
        account: Option<String>,
        direction: ExchangeDirection,
        from_amount: f64,
        to_amount: Option<f64>,
        date: Option<DateTime<Utc>>,
    },
    Trades {
        account: Option<String>,
        filter: TradeFilter,
    },
    DeleteTrade {
        id: String,
    },
    Accounts,
    AddAccount {
        id: String,
        name: Option<String>,
    },
    RemoveAccount {
        id: String,
    },
    SetPosition {
        account: Option<String>,
        market: Market,
        code: String,
        edit: PositionEdit,
    },
    SetCash {
        account: Option<String>,
        market: Market,
        edit: CashEdit,
    },
    JournalShow {
        month: Option<String>,
    },
    JournalSet {
        date: String,
        content: Option<String>,
        important: Option<bool>,
    },
    Sectors,
    AddSector {
        code: String,
        name: String,
        color: Option<String>,
    },
    TakeSnapshot {
        memo: Option<String>,
    },
    Snapshots {
        limit: Option<usize>,
    },
    DeleteSnapshot {
        id: String,
    },
    Export {
        output: Option<PathBuf>,
    },
    Import {
        input: PathBuf,
        mode: ImportMode,
    },
}

/// Services wired from one configuration.
pub struct AppContext {
    pub config: AppConfig,
    pub repository: Arc<dyn Repository>,
    pub quotes: QuoteService,
    pub rates: ExchangeRateService,
    pub trades: TradeService,
    /// Shared by every writer of holding and cash rows.
    pub locks: Arc<KeyLocks>,
}

impl AppContext {
    /// Opens the store at the configured data path and builds the HTTP providers.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        std::fs::create_dir_all(&data_path)
            .with_context(|| format!("Failed to create data directory: {}", data_path.display()))?;
        let repository: Arc<dyn Repository> = Arc::new(DiskRepository::open(&data_path)?);
        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: AppConfig, repository: Arc<dyn Repository>) -> Result<Self> {
        let providers = &config.providers;
        let quotes = QuoteService::new(
            Box::new(NaverProvider::new(
                &providers.naver.mobile_url,
                &providers.naver.realtime_url,
            )?),
            Box::new(YahooFinanceProvider::new(&providers.yahoo.base_url)?),
            Box::new(CoinGeckoProvider::new(&providers.coingecko.base_url)?),
            Arc::new(Cache::new()),
            config.quotes.ttl(),
        );
        let rates = ExchangeRateService::new(
            Box::new(ExchangeRateApiProvider::new(
                &providers.exchange_rate.base_url,
            )?),
            Arc::new(Cache::new()),
            config.exchange_rate.ttl(),
            config.exchange_rate.default_rate,
        );
        let locks = Arc::new(KeyLocks::new());
        let trades = TradeService::new(Arc::clone(&repository), Arc::clone(&locks));

        Ok(AppContext {
            config,
            repository,
            quotes,
            rates,
            trades,
            locks,
        })
    }

    pub fn account_id(&self, account: Option<String>) -> String {
        account.unwrap_or_else(|| self.config.default_account.clone())
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("folio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let ctx = AppContext::from_config(config)?;
    execute(&ctx, command).await
}

pub async fn execute(ctx: &AppContext, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Summary { account, refresh } => {
            cli::summary::run(ctx, &ctx.account_id(account), refresh).await
        }
        AppCommand::Rebalance { account } => {
            cli::rebalance::run(ctx, &ctx.account_id(account)).await
        }
        AppCommand::RefreshPrices { account } => {
            cli::summary::run_refresh(ctx, &ctx.account_id(account)).await
        }
        AppCommand::Rate => cli::summary::run_rate(ctx).await,
        AppCommand::Trade { account, request } => {
            cli::trades::run_apply(ctx, &ctx.account_id(account), request).await
        }
        AppCommand::Exchange {
            account,
            direction,
            from_amount,
            to_amount,
            date,
        } => {
            cli::trades::run_exchange(
                ctx,
                &ctx.account_id(account),
                direction,
                from_amount,
                to_amount,
                date,
            )
            .await
        }
        AppCommand::Trades { account, filter } => {
            cli::trades::run_list(ctx, &ctx.account_id(account), &filter).await
        }
        AppCommand::DeleteTrade { id } => cli::trades::run_delete(ctx, &id).await,
        AppCommand::Accounts => cli::accounts::run_list(ctx).await,
        AppCommand::AddAccount { id, name } => cli::accounts::run_add(ctx, &id, name).await,
        AppCommand::RemoveAccount { id } => cli::accounts::run_remove(ctx, &id).await,
        AppCommand::SetPosition {
            account,
            market,
            code,
            edit,
        } => cli::accounts::run_set_position(ctx, &ctx.account_id(account), market, &code, edit)
            .await,
        AppCommand::SetCash {
            account,
            market,
            edit,
        } => cli::accounts::run_set_cash(ctx, &ctx.account_id(account), market, edit).await,
        AppCommand::JournalShow { month } => cli::journal::run_show(ctx, month.as_deref()).await,
        AppCommand::JournalSet {
            date,
            content,
            important,
        } => cli::journal::run_set(ctx, &date, content.as_deref(), important).await,
        AppCommand::Sectors => cli::sectors::run_list(ctx).await,
        AppCommand::AddSector { code, name, color } => {
            cli::sectors::run_add(ctx, &code, &name, color.as_deref()).await
        }
        AppCommand::TakeSnapshot { memo } => cli::snapshots::run_take(ctx, memo).await,
        AppCommand::Snapshots { limit } => cli::snapshots::run_list(ctx, limit).await,
        AppCommand::DeleteSnapshot { id } => cli::snapshots::run_delete(ctx, &id).await,
        AppCommand::Export { output } => cli::backup::run_export(ctx, output.as_deref()).await,
        AppCommand::Import { input, mode } => cli::backup::run_import(ctx, &input, mode).await,
    }
}
