//! Short-TTL memoization so one reconciliation tick (and any concurrent
//! synchronous orders) reuse a single upstream fetch per symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::PriceSource;
use crate::error::EngineError;
use crate::types::position::Price;

pub struct CachedPriceSource {
    inner: Arc<dyn PriceSource>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Price)>>,
}

impl CachedPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PriceSource for CachedPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<Price, EngineError> {
        {
            let entries = self.entries.lock().await;
            if let Some((at, price)) = entries.get(symbol) {
                if at.elapsed() < self.ttl {
                    return Ok(*price);
                }
            }
        }
        // Fetch failures are not cached; the next tick retries.
        let price = self.inner.fetch(symbol).await?;
        self.entries
            .lock()
            .await
            .insert(symbol.to_string(), (Instant::now(), price));
        Ok(price)
    }
}
