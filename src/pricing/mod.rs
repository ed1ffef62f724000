//! Price source adapter: fetch the latest market price for a symbol.

mod cache;
mod yahoo;

pub use cache::CachedPriceSource;
pub use yahoo::YahooPriceSource;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::position::Price;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest observed price for `symbol`. Failures (network, timeout,
    /// unknown symbol) all surface as `PriceUnavailable`; the caller decides
    /// whether that is fatal (synchronous path) or skip-and-retry (sweep).
    async fn fetch(&self, symbol: &str) -> Result<Price, EngineError>;
}

/// Fixed in-memory prices, settable at runtime. Used by tests and useful as
/// an offline mode.
#[derive(Default)]
pub struct FixedPriceSource {
    prices: Mutex<HashMap<String, Price>>,
}

impl FixedPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, price: Price) {
        self.prices
            .lock()
            .expect("price map poisoned")
            .insert(symbol.to_string(), price);
    }

    pub fn clear(&self, symbol: &str) {
        self.prices
            .lock()
            .expect("price map poisoned")
            .remove(symbol);
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<Price, EngineError> {
        self.prices
            .lock()
            .expect("price map poisoned")
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::PriceUnavailable {
                symbol: symbol.to_string(),
            })
    }
}
