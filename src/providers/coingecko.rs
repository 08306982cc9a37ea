use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::instrument;

use crate::core::price::{PriceProvider, PriceResult};
use crate::providers::util::{get_json, http_client};

const COIN_IDS: [(&str, &str); 14] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("XRP", "ripple"),
    ("SOL", "solana"),
    ("DOGE", "dogecoin"),
    ("ADA", "cardano"),
    ("USDT", "tether"),
    ("BNB", "binancecoin"),
    ("DOT", "polkadot"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("TRX", "tron"),
    ("MATIC", "matic-network"),
    ("SUI", "sui"),
];

/// CoinGecko id for a ticker symbol; unknown symbols are passed through lower-cased.
pub fn coin_id(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    COIN_IDS
        .iter()
        .find(|(s, _)| *s == upper)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| symbol.to_lowercase())
}

/// Crypto prices in KRW from the CoinGecko simple price API.
pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<PriceResult> {
        let id = coin_id(symbol);
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=krw",
            self.base_url, id
        );
        let data: HashMap<String, HashMap<String, f64>> = get_json(&self.client, &url).await?;

        data.get(&id)
            .and_then(|prices| prices.get("krw"))
            .copied()
            .filter(|p| *p > 0.0)
            .map(|price| PriceResult {
                price,
                currency: "KRW".to_string(),
                short_name: None,
            })
            .ok_or_else(|| anyhow!("No price data found for coin: {} ({})", symbol, id))
    }
}
