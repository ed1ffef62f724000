//! Reconciliation scheduler: a fixed-interval sweep that re-evaluates every
//! pending order against a freshly fetched price.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::engine::{Engine, ResolveOutcome};
use crate::pricing::PriceSource;

pub struct Reconciler {
    engine: Arc<Engine>,
    prices: Arc<dyn PriceSource>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        engine: Arc<Engine>,
        prices: Arc<dyn PriceSource>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            prices,
            interval,
            fetch_timeout,
        }
    }

    /// Run until `shutdown` flips to true. The tick in flight when shutdown
    /// arrives always completes; the signal is only observed between ticks.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("reconciler stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One full pass: list distinct symbols with pending orders, fetch each
    /// price, resolve the symbols concurrently. A failed or timed-out fetch
    /// skips that symbol until the next tick.
    pub async fn sweep_once(&self) -> ResolveOutcome {
        let symbols = self.engine.book().read().await.distinct_pending_symbols();
        if symbols.is_empty() {
            return ResolveOutcome::default();
        }

        let mut tasks: JoinSet<ResolveOutcome> = JoinSet::new();
        for symbol in symbols {
            let engine = Arc::clone(&self.engine);
            let prices = Arc::clone(&self.prices);
            let fetch_timeout = self.fetch_timeout;
            tasks.spawn(async move {
                let fetched = tokio::time::timeout(fetch_timeout, prices.fetch(&symbol)).await;
                match fetched {
                    Ok(Ok(price)) => engine.resolve_symbol(&symbol, price).await,
                    Ok(Err(err)) => {
                        tracing::debug!(%symbol, error = %err, "skipping symbol this tick");
                        ResolveOutcome::default()
                    }
                    Err(_) => {
                        tracing::debug!(%symbol, "price fetch timed out, skipping");
                        ResolveOutcome::default()
                    }
                }
            });
        }

        let mut total = ResolveOutcome::default();
        while let Some(result) = tasks.join_next().await {
            if let Ok(outcome) = result {
                total.buys_executed += outcome.buys_executed;
                total.sells_executed += outcome.sells_executed;
                total.sells_rejected += outcome.sells_rejected;
            }
        }
        if total != ResolveOutcome::default() {
            tracing::info!(
                buys = total.buys_executed,
                sells = total.sells_executed,
                rejected = total.sells_rejected,
                "sweep resolved orders"
            );
        }
        total
    }
}
