//! The CoinMarketCap price-oracle client (§6). The collaborator itself is
//! out of scope (§1); this is the narrow interface the `tao_price` shovel
//! is written against: `quote_at(timestamp)` / `quote_latest()`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// CoinMarketCap's internal id for TAO.
const TAO_ID: &str = "22974";
const BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CmcError {
    #[error("CMC request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CMC rejected the request (401/403): {0}")]
    Unauthorized(String),
    #[error("CMC response did not contain a quote for {0}")]
    MissingQuote(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
}

#[derive(Deserialize)]
struct QuoteResponse {
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct UsdQuote {
    price: f64,
    market_cap: f64,
    volume_24h: f64,
}

pub struct CmcClient {
    http: reqwest::Client,
    token: String,
}

impl CmcClient {
    pub fn new(token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with a sane default TLS backend");
        Self { http, token: token.into() }
    }

    /// Historical quote at `at`. Uses the `5m` interval when `at` is
    /// within the last 48 hours (finer granularity is only retained that
    /// long upstream), `24h` otherwise.
    pub async fn quote_at(&self, at: DateTime<Utc>) -> Result<Quote, CmcError> {
        let interval = if Utc::now().signed_duration_since(at).num_hours() < 48 { "5m" } else { "24h" };
        let params = [
            ("id", TAO_ID.to_string()),
            ("convert", "USD".to_string()),
            ("interval", interval.to_string()),
            ("time_start", at.timestamp().to_string()),
            ("count", "1".to_string()),
        ];
        let url = format!("{BASE_URL}/historical");
        let body = self.get(&url, &params).await?;
        let quotes = body
            .data
            .get("quotes")
            .and_then(|q| q.as_array())
            .ok_or_else(|| CmcError::MissingQuote("quotes[]".into()))?;
        let usd = quotes
            .first()
            .and_then(|q| q.get("quote"))
            .and_then(|q| q.get("USD"))
            .ok_or_else(|| CmcError::MissingQuote("quotes[0].quote.USD".into()))?;
        parse_usd_quote(usd)
    }

    /// The latest quote, no historical lookback.
    pub async fn quote_latest(&self) -> Result<Quote, CmcError> {
        let params = [("id", TAO_ID.to_string()), ("convert", "USD".to_string())];
        let url = format!("{BASE_URL}/latest");
        let body = self.get(&url, &params).await?;
        let usd = body
            .data
            .get(TAO_ID)
            .and_then(|d| d.get("quote"))
            .and_then(|q| q.get("USD"))
            .ok_or_else(|| CmcError::MissingQuote(format!("data.{TAO_ID}.quote.USD")))?;
        parse_usd_quote(usd)
    }

    /// GET with the 429/401/403/5xx policy from §6: rate limits honour
    /// `Retry-After` and retry indefinitely, auth failures are fatal, 5xx
    /// is retried with a fixed backoff.
    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<QuoteResponse, CmcError> {
        loop {
            let response = self
                .http
                .get(url)
                .header("X-CMC_PRO_API_KEY", &self.token)
                .query(params)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<QuoteResponse>().await?);
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(CmcError::Unauthorized(status.to_string()));
            }
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30);
                warn!(retry_after, "CMC rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }
            if status.is_server_error() {
                warn!(%status, "CMC server error, retrying after backoff");
                tokio::time::sleep(Duration::from_secs(10)).await;
                continue;
            }
            // Anything else (4xx we don't special-case) — log and retry
            // slowly rather than crash the shovel over a transient payload.
            warn!(%status, "unexpected CMC response, retrying");
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

fn parse_usd_quote(value: &serde_json::Value) -> Result<Quote, CmcError> {
    let usd: UsdQuote =
        serde_json::from_value(value.clone()).map_err(|_| CmcError::MissingQuote("USD quote fields".into()))?;
    Ok(Quote { price: usd.price, market_cap: usd.market_cap, volume_24h: usd.volume_24h })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usd_quote_fields() {
        let json = serde_json::json!({"price": 5.5, "market_cap": 100.0, "volume_24h": 9.0});
        let quote = parse_usd_quote(&json).unwrap();
        assert_eq!(quote.price, 5.5);
        assert_eq!(quote.market_cap, 100.0);
        assert_eq!(quote.volume_24h, 9.0);
    }
}
