//! Pricing abstractions and the per-market quote router

use crate::core::cache::Cache;
use crate::core::locks::{KeyLocks, LockKey};
use crate::core::model::Market;
use crate::core::repository::Repository;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResult {
    pub price: f64,
    pub currency: String,
    pub short_name: Option<String>,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, code: &str) -> Result<PriceResult>;
}

pub type QuoteKey = (Market, String);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub updated: Vec<(QuoteKey, f64)>,
    pub missing: Vec<QuoteKey>,
}

/// Routes lookups to the provider for each market and caches the answers.
/// Failures are logged and reported as `None`.
pub struct QuoteService {
    kr: Box<dyn PriceProvider>,
    us: Box<dyn PriceProvider>,
    crypto: Box<dyn PriceProvider>,
    cache: Arc<Cache<QuoteKey, f64>>,
    ttl: Duration,
}

impl QuoteService {
    pub fn new(
        kr: Box<dyn PriceProvider>,
        us: Box<dyn PriceProvider>,
        crypto: Box<dyn PriceProvider>,
        cache: Arc<Cache<QuoteKey, f64>>,
        ttl: Duration,
    ) -> Self {
        Self {
            kr,
            us,
            crypto,
            cache,
            ttl,
        }
    }

    fn provider(&self, market: Market) -> &dyn PriceProvider {
        match market {
            Market::Kr => self.kr.as_ref(),
            Market::Us => self.us.as_ref(),
            Market::Crypto => self.crypto.as_ref(),
        }
    }

    pub async fn fetch_price(&self, market: Market, code: &str) -> Option<f64> {
        let key = (market, code.to_string());
        if let Some(price) = self.cache.get(&key).await {
            return Some(price);
        }

        match self.provider(market).fetch_price(code).await {
            Ok(result) if result.price > 0.0 => {
                debug!(%market, code, price = result.price, "Fetched quote");
                self.cache.put(key, result.price, Some(self.ttl)).await;
                Some(result.price)
            }
            Ok(result) => {
                warn!(%market, code, price = result.price, "Ignoring non-positive quote");
                None
            }
            Err(e) => {
                warn!(%market, code, error = %e, "Quote lookup failed");
                None
            }
        }
    }

    /// Fetches all `keys` concurrently, calling `on_done` after each lookup.
    pub async fn fetch_prices(
        &self,
        keys: &[QuoteKey],
        on_done: &(dyn Fn() + Sync),
    ) -> HashMap<QuoteKey, Option<f64>> {
        let futures = keys.iter().map(|(market, code)| async move {
            let price = self.fetch_price(*market, code).await;
            on_done();
            ((*market, code.clone()), price)
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Updates `current_price` of every holding in the account that got a quote.
    /// Each row is re-read and written under its key in `locks`.
    pub async fn refresh_holdings(
        &self,
        repo: &dyn Repository,
        locks: &KeyLocks,
        account_id: &str,
        on_done: &(dyn Fn() + Sync),
    ) -> Result<RefreshReport> {
        let keys: Vec<QuoteKey> = repo
            .load_holdings(account_id)
            .await?
            .into_iter()
            .map(|h| (h.market, h.code))
            .collect();
        let prices = self.fetch_prices(&keys, on_done).await;

        let mut report = RefreshReport::default();
        for key in keys {
            let Some(price) = prices.get(&key).copied().flatten() else {
                report.missing.push(key);
                continue;
            };
            let (market, code) = (key.0, key.1.as_str());
            let _guard = locks
                .acquire(vec![LockKey::holding(account_id, market, code)])
                .await;
            let current = repo
                .load_holdings(account_id)
                .await?
                .into_iter()
                .find(|h| h.is_key(market, code));
            if let Some(mut holding) = current {
                holding.current_price = price;
                repo.upsert_holding(account_id, &holding).await?;
                report.updated.push((key, price));
            }
        }
        Ok(report)
    }
}
