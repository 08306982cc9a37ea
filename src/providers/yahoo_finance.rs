use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::price::{PriceProvider, PriceResult};
use crate::providers::util::{get_json, http_client};

/// US equities from the Yahoo chart API, falling back to the v7 quote API.
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    async fn from_chart(&self, symbol: &str) -> Result<Option<PriceResult>> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url, symbol
        );
        let data: YahooChartResponse = get_json(&self.client, &url).await?;
        let Some(item) = data.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(None);
        };

        let last_close = item
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .and_then(|q| q.close)
            .and_then(|closes| closes.into_iter().flatten().last());
        let price = item
            .meta
            .regular_market_price
            .filter(|p| *p > 0.0)
            .or(last_close.filter(|p| *p > 0.0));

        Ok(price.map(|price| PriceResult {
            price,
            currency: item.meta.currency.unwrap_or_else(|| "USD".to_string()),
            short_name: item.meta.short_name,
        }))
    }

    async fn from_quote(&self, symbol: &str) -> Result<Option<PriceResult>> {
        let url = format!("{}/v7/finance/quote?symbols={}", self.base_url, symbol);
        let data: YahooQuoteResponse = get_json(&self.client, &url).await?;
        let quote = data
            .quote_response
            .result
            .into_iter()
            .next()
            .filter(|q| q.regular_market_price.is_some_and(|p| p > 0.0));

        Ok(quote.and_then(|q| {
            Some(PriceResult {
                price: q.regular_market_price?,
                currency: q.currency.unwrap_or_else(|| "USD".to_string()),
                short_name: q.short_name,
            })
        }))
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    currency: Option<String>,
    short_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResult,
}

#[derive(Deserialize, Debug)]
struct QuoteResult {
    #[serde(default)]
    result: Vec<QuoteItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    regular_market_price: Option<f64>,
    currency: Option<String>,
    short_name: Option<String>,
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    #[instrument(name = "YahooPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<PriceResult> {
        match self.from_chart(symbol).await {
            Ok(Some(result)) => return Ok(result),
            Ok(None) => debug!("Chart API returned no price"),
            Err(e) => debug!(error = %e, "Chart API failed"),
        }

        match self.from_quote(symbol).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(anyhow!("No price data found for symbol: {}", symbol)),
            Err(e) => Err(e.context(format!("No price data found for symbol: {symbol}"))),
        }
    }
}
