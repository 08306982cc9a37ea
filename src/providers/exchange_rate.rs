use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::currency::ExchangeRateProvider;
use crate::providers::util::{get_json, http_client};

/// USD/KRW from exchangerate-api's KRW table, inverted and rounded to cents.
pub struct ExchangeRateApiProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, f64>,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(ExchangeRateApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ExchangeRateProvider for ExchangeRateApiProvider {
    #[instrument(name = "ExchangeRateFetch", skip(self))]
    async fn fetch_usd_krw(&self) -> Result<f64> {
        let url = format!("{}/v4/latest/KRW", self.base_url);
        let data: LatestRates = get_json(&self.client, &url).await?;

        let usd_per_krw = data
            .rates
            .get("USD")
            .copied()
            .filter(|r| *r > 0.0)
            .ok_or_else(|| anyhow!("No USD rate in response from {}", url))?;
        let rate = ((1.0 / usd_per_krw) * 100.0).round() / 100.0;
        debug!(usd_per_krw, rate, "Converted KRW table to USD/KRW");
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_with(status: u16, body: &str) -> (MockServer, ExchangeRateApiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/latest/KRW"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        let provider = ExchangeRateApiProvider::new(&mock_server.uri()).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let (_server, provider) =
            provider_with(200, r#"{"base": "KRW", "rates": {"KRW": 1, "USD": 0.000725}}"#).await;
        assert_eq!(provider.fetch_usd_krw().await.unwrap(), 1379.31);
    }

    #[tokio::test]
    async fn test_missing_usd_rate() {
        let (_server, provider) = provider_with(200, r#"{"rates": {"EUR": 0.00068}}"#).await;
        let err = provider.fetch_usd_krw().await.unwrap_err();
        assert!(err.to_string().starts_with("No USD rate in response"));
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let (_server, provider) = provider_with(503, "").await;
        let err = provider.fetch_usd_krw().await.unwrap_err();
        assert!(err.to_string().starts_with("HTTP error: 503"));
    }
}
