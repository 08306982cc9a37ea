//! USD/KRW exchange rate lookup with caching and fallback

use crate::core::cache::Cache;
use crate::core::model::StoredRate;
use crate::core::repository::Repository;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_USD_KRW: f64 = 1350.0;
const RATE_KEY: &str = "USD";

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// KRW per one USD.
    async fn fetch_usd_krw(&self) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateQuote {
    pub rate: f64,
    pub cached: bool,
    /// Set when the provider failed and an older or default rate was used.
    pub fallback: bool,
}

pub struct ExchangeRateService {
    provider: Box<dyn ExchangeRateProvider>,
    cache: Arc<Cache<String, f64>>,
    ttl: Duration,
    default_rate: f64,
}

impl ExchangeRateService {
    pub fn new(
        provider: Box<dyn ExchangeRateProvider>,
        cache: Arc<Cache<String, f64>>,
        ttl: Duration,
        default_rate: f64,
    ) -> Self {
        Self {
            provider,
            cache,
            ttl,
            default_rate,
        }
    }

    /// Returns the current rate. Never fails: a provider error falls back to the
    /// stale cache entry, then `last_known`, then the configured default.
    pub async fn usd_krw(&self, last_known: Option<f64>) -> RateQuote {
        let key = RATE_KEY.to_string();
        if let Some(rate) = self.cache.get(&key).await {
            return RateQuote {
                rate,
                cached: true,
                fallback: false,
            };
        }

        match self.provider.fetch_usd_krw().await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                debug!(rate, "Fetched exchange rate");
                self.cache.put(key, rate, Some(self.ttl)).await;
                RateQuote {
                    rate,
                    cached: false,
                    fallback: false,
                }
            }
            outcome => {
                match outcome {
                    Ok(rate) => warn!(rate, "Provider returned an unusable exchange rate"),
                    Err(e) => warn!(error = %e, "Exchange rate lookup failed"),
                }
                let rate = match self.cache.get_stale(&key).await {
                    Some(rate) => rate,
                    None => last_known.unwrap_or(self.default_rate),
                };
                RateQuote {
                    rate,
                    cached: true,
                    fallback: true,
                }
            }
        }
    }

    /// Like [`usd_krw`](Self::usd_krw), but treats a persisted rate younger than
    /// the TTL as cached, falls back to it, and persists freshly fetched rates.
    pub async fn current_rate(&self, repo: &dyn Repository) -> Result<RateQuote> {
        let stored = repo.load_exchange_rate().await?;
        if let Some(stored) = stored {
            let age = (Utc::now() - stored.updated_at).to_std().unwrap_or_default();
            if age < self.ttl && self.cache.get_stale(&RATE_KEY.to_string()).await.is_none() {
                debug!(rate = stored.rate, "Using persisted exchange rate");
                let remaining = self.ttl - age;
                self.cache
                    .put(RATE_KEY.to_string(), stored.rate, Some(remaining))
                    .await;
            }
        }

        let quote = self.usd_krw(stored.map(|s| s.rate)).await;
        if !quote.cached && !quote.fallback {
            repo.save_exchange_rate(&StoredRate {
                rate: quote.rate,
                updated_at: Utc::now(),
            })
            .await?;
        }
        Ok(quote)
    }
}
