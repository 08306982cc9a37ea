//! Domain records shared by the valuation engine, the ledger and the store.

use crate::core::ledger::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "KR")]
    Kr,
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "CRYPTO")]
    Crypto,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Kr, Market::Us, Market::Crypto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kr => "KR",
            Market::Us => "US",
            Market::Crypto => "CRYPTO",
        }
    }

    /// Currency the market's prices and cash are quoted in.
    pub fn currency(&self) -> &'static str {
        match self {
            Market::Us => "USD",
            Market::Kr | Market::Crypto => "KRW",
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Market {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "KR" => Ok(Market::Kr),
            "US" => Ok(Market::Us),
            "CRYPTO" => Ok(Market::Crypto),
            _ => Err(LedgerError::InvalidMarket(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub name: String,
}

/// One position per account, market and code. Prices are in the market's currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub market: Market,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_sector")]
    pub sector: String,
    #[serde(default)]
    pub target_weight: f64,
    #[serde(default)]
    pub buy_price: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub holding_qty: f64,
    #[serde(default)]
    pub memo: Option<String>,
}

pub fn default_sector() -> String {
    "ETC".to_string()
}

impl Holding {
    pub fn new(market: Market, code: &str) -> Self {
        Holding {
            market,
            code: code.to_string(),
            name: code.to_string(),
            sector: default_sector(),
            target_weight: 0.0,
            buy_price: 0.0,
            current_price: 0.0,
            holding_qty: 0.0,
            memo: None,
        }
    }

    pub fn is_key(&self, market: Market, code: &str) -> bool {
        self.market == market && self.code == code
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBalance {
    pub market: Market,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub target_weight: f64,
    #[serde(default)]
    pub memo: Option<String>,
}

impl CashBalance {
    pub fn zeroed(market: Market) -> Self {
        CashBalance {
            market,
            amount: 0.0,
            target_weight: 0.0,
            memo: None,
        }
    }
}

/// Cumulative realized profit per market, in the market's currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnl(pub BTreeMap<Market, f64>);

impl RealizedPnl {
    pub fn get(&self, market: Market) -> f64 {
        self.0.get(&market).copied().unwrap_or(0.0)
    }

    pub fn adjust(&mut self, market: Market, delta: f64) {
        *self.0.entry(market).or_insert(0.0) += delta;
    }

    pub fn set(&mut self, market: Market, amount: f64) {
        self.0.insert(market, amount);
    }

    pub fn markets(&self) -> impl Iterator<Item = (Market, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
    Deposit,
    Withdraw,
    Exchange,
}

impl Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
            TradeKind::Deposit => "deposit",
            TradeKind::Withdraw => "withdraw",
            TradeKind::Exchange => "exchange",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeDirection {
    #[serde(rename = "KR_TO_US")]
    KrToUs,
    #[serde(rename = "US_TO_KR")]
    UsToKr,
}

impl ExchangeDirection {
    /// (source, destination) cash markets.
    pub fn legs(&self) -> (Market, Market) {
        match self {
            ExchangeDirection::KrToUs => (Market::Kr, Market::Us),
            ExchangeDirection::UsToKr => (Market::Us, Market::Kr),
        }
    }

    /// Amount received for `from_amount` at `rate` KRW per USD.
    pub fn convert(&self, from_amount: f64, rate: f64) -> f64 {
        match self {
            ExchangeDirection::KrToUs if rate > 0.0 => from_amount / rate,
            ExchangeDirection::KrToUs => 0.0,
            ExchangeDirection::UsToKr => from_amount * rate,
        }
    }
}

impl Display for ExchangeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeDirection::KrToUs => write!(f, "KR_TO_US"),
            ExchangeDirection::UsToKr => write!(f, "US_TO_KR"),
        }
    }
}

/// A ledger event. Which optional fields are set depends on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub account_id: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub market: Option<Market>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub qty: Option<f64>,
    pub amount: Option<f64>,
    pub pnl: Option<f64>,
    pub buy_price: Option<f64>,
    pub direction: Option<ExchangeDirection>,
    pub from_amount: Option<f64>,
    pub to_amount: Option<f64>,
    pub rate: Option<f64>,
}

impl Trade {
    pub fn new(account_id: &str, kind: TradeKind, date: DateTime<Utc>) -> Self {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            date,
            kind,
            market: None,
            code: None,
            name: None,
            price: None,
            qty: None,
            amount: None,
            pnl: None,
            buy_price: None,
            direction: None,
            from_amount: None,
            to_amount: None,
            rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    pub code: String,
    pub name: String,
    pub color: String,
    pub sort_order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    pub content: String,
    #[serde(default)]
    pub important: bool,
}

/// Last successfully fetched KRW per USD rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRate {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Total asset value at one point in time, with the change since the
/// previous snapshot. Values are in KRW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnapshot {
    pub id: String,
    pub date: DateTime<Utc>,
    pub total_asset: f64,
    pub total_asset_change: f64,
    pub accounts: Vec<AccountAsset>,
    pub exchange_rate: f64,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAsset {
    pub account_id: String,
    pub value: f64,
    pub change: f64,
}
