use anyhow::{Error, Result, anyhow};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "folio/1.0";
const RETRIES: usize = 1;
const RETRY_DELAY_MS: u64 = 200;

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Runs `operation` up to `retries + 1` times, sleeping `delay_ms` between
/// attempts. Only connection failures and timeouts are retried.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt < retries && is_transient(&err) => {
                attempt += 1;
                debug!(attempt, retries, error = %err, "Transient request failure, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()?)
}

/// GETs `url` and decodes the JSON body. Connection failures are retried once;
/// HTTP error statuses are not.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    debug!("Requesting {}", url);
    let response = with_retry(|| client.get(url).send(), RETRIES, RETRY_DELAY_MS)
        .await
        .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

    if !response.status().is_success() {
        return Err(anyhow!("HTTP error: {} URL: {}", response.status(), url));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| anyhow!("Failed to parse JSON response from {}: {}", url, e))
}

/// Reads a price that may be a JSON number or a string with thousands separators.
pub fn parse_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
    .filter(|p: &f64| p.is_finite() && *p > 0.0)
}
