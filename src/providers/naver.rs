use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::price::{PriceProvider, PriceResult};
use crate::providers::util::{get_json, http_client, parse_price};

/// Fields of the basic quote payload, in order of preference.
const PRICE_FIELDS: [&str; 5] = ["stockEndPrice", "closePrice", "now", "currentPrice", "price"];

/// Korean equities from Naver Finance: the mobile quote API first, then the
/// realtime polling API.
pub struct NaverProvider {
    mobile_url: String,
    realtime_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug)]
struct RealtimeResponse {
    #[serde(default)]
    datas: Vec<RealtimeItem>,
}

#[derive(Deserialize, Debug)]
struct RealtimeItem {
    nv: Option<Value>,
    nm: Option<String>,
}

impl NaverProvider {
    pub fn new(mobile_url: &str, realtime_url: &str) -> Result<Self> {
        Ok(NaverProvider {
            mobile_url: mobile_url.trim_end_matches('/').to_string(),
            realtime_url: realtime_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    async fn from_basic(&self, code: &str) -> Result<Option<PriceResult>> {
        let url = format!("{}/api/stock/{}/basic", self.mobile_url, code);
        let data: Value = get_json(&self.client, &url).await?;

        let price = PRICE_FIELDS
            .iter()
            .find_map(|field| data.get(*field).and_then(parse_price));
        Ok(price.map(|price| PriceResult {
            price: price.round(),
            currency: "KRW".to_string(),
            short_name: data
                .get("stockName")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }

    async fn from_realtime(&self, code: &str) -> Result<Option<PriceResult>> {
        let url = format!("{}/api/realtime/domestic/stock/{}", self.realtime_url, code);
        let data: RealtimeResponse = get_json(&self.client, &url).await?;
        let Some(item) = data.datas.into_iter().next() else {
            return Ok(None);
        };

        Ok(item
            .nv
            .as_ref()
            .and_then(parse_price)
            .map(|price| PriceResult {
                price: price.trunc(),
                currency: "KRW".to_string(),
                short_name: item.nm,
            }))
    }
}

#[async_trait]
impl PriceProvider for NaverProvider {
    #[instrument(name = "NaverPriceFetch", skip(self), fields(code = %code))]
    async fn fetch_price(&self, code: &str) -> Result<PriceResult> {
        match self.from_basic(code).await {
            Ok(Some(result)) => return Ok(result),
            Ok(None) => debug!("Mobile API returned no price"),
            Err(e) => debug!(error = %e, "Mobile API failed"),
        }

        match self.from_realtime(code).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(anyhow!("No price data found for code: {}", code)),
            Err(e) => Err(e.context(format!("No price data found for code: {code}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route.to_string()))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> NaverProvider {
        NaverProvider::new(&server.uri(), &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_basic_api_uses_first_positive_field() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            "/api/stock/005930/basic",
            200,
            r#"{"stockName": "삼성전자", "stockEndPrice": "0", "closePrice": "71,250.4", "now": 70000}"#,
        )
        .await;

        let result = provider(&mock_server).fetch_price("005930").await.unwrap();
        assert_eq!(result.price, 71250.0);
        assert_eq!(result.currency, "KRW");
        assert_eq!(result.short_name.as_deref(), Some("삼성전자"));
    }

    #[tokio::test]
    async fn test_falls_back_to_realtime_api() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/api/stock/000660/basic", 404, "").await;
        mount(
            &mock_server,
            "/api/realtime/domestic/stock/000660",
            200,
            r#"{"datas": [{"nv": 182500, "nm": "SK하이닉스"}]}"#,
        )
        .await;

        let result = provider(&mock_server).fetch_price("000660").await.unwrap();
        assert_eq!(result.price, 182500.0);
        assert_eq!(result.short_name.as_deref(), Some("SK하이닉스"));
    }

    #[tokio::test]
    async fn test_no_price_anywhere_is_an_error() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/api/stock/999999/basic", 200, r#"{"price": null}"#).await;
        mount(
            &mock_server,
            "/api/realtime/domestic/stock/999999",
            200,
            r#"{"datas": []}"#,
        )
        .await;

        let err = provider(&mock_server).fetch_price("999999").await.unwrap_err();
        assert_eq!(err.to_string(), "No price data found for code: 999999");
    }
}
