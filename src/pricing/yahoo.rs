//! Yahoo finance chart endpoint as the concrete price feed.

use std::time::Duration;

use async_trait::async_trait;

use super::PriceSource;
use crate::error::EngineError;
use crate::types::position::{PRICE_SCALE, Price};

pub struct YahooPriceSource {
    client: reqwest::Client,
    base_url: String,
    suffix: String,
}

impl YahooPriceSource {
    /// `base_url` without trailing slash, e.g. `https://query1.finance.yahoo.com`.
    /// `suffix` is appended to the symbol (".NS" for NSE listings).
    ///
    /// Fails when the HTTP client cannot be constructed; a client without
    /// the request timeout is not an acceptable fallback.
    pub fn new(base_url: &str, suffix: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            suffix: suffix.to_string(),
        })
    }

    fn unavailable(symbol: &str) -> EngineError {
        EngineError::PriceUnavailable {
            symbol: symbol.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<Price, EngineError> {
        let url = format!(
            "{}/v8/finance/chart/{}{}",
            self.base_url, symbol, self.suffix
        );
        let response = self.client.get(&url).send().await.map_err(|err| {
            tracing::warn!(symbol, error = %err, "price fetch failed");
            Self::unavailable(symbol)
        })?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| Self::unavailable(symbol))?;
        let market_price = body["chart"]["result"][0]["meta"]["regularMarketPrice"]
            .as_f64()
            .ok_or_else(|| Self::unavailable(symbol))?;
        Ok((market_price * PRICE_SCALE as f64).round() as Price)
    }
}
