use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{RwLock, watch};

use virtutrade::api::routes::{AppState, app_router};
use virtutrade::config::Config;
use virtutrade::engine::Engine;
use virtutrade::notify;
use virtutrade::persistence;
use virtutrade::pricing::{CachedPriceSource, PriceSource, YahooPriceSource};
use virtutrade::reconciler::Reconciler;
use virtutrade::store::{self, SharedBook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();

    let (book, pool): (SharedBook, Option<persistence::PgPool>) = match &config.database_url {
        Some(url) => {
            let pool = persistence::create_pool_and_migrate(url)
                .await
                .context("connecting to database")?;
            let book = persistence::hydrate(&pool).await.context("hydrating state")?;
            tracing::info!("state hydrated from database");
            (Arc::new(RwLock::new(book)), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running memory-only");
            (store::shared(), None)
        }
    };

    let yahoo = Arc::new(
        YahooPriceSource::new(
            &config.price_feed_url,
            &config.price_feed_suffix,
            config.price_fetch_timeout,
        )
        .context("building price feed client")?,
    );
    let prices: Arc<dyn PriceSource> = Arc::new(CachedPriceSource::new(
        yahoo,
        config.price_cache_ttl,
    ));

    let (events, _) = notify::channel(256);
    let engine = Arc::new(Engine::new(
        Arc::clone(&book),
        Arc::clone(&prices),
        events.clone(),
        config.starting_balance,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = Reconciler::new(
        Arc::clone(&engine),
        prices,
        config.reconcile_interval,
        config.price_fetch_timeout,
    );
    let reconciler_task = tokio::spawn(reconciler.run(shutdown_rx.clone()));

    let flush_task = pool.map(|pool| {
        tokio::spawn(persistence::flush::run(
            Arc::clone(&book),
            pool,
            config.flush_interval,
            shutdown_rx.clone(),
        ))
    });

    let state = AppState {
        engine,
        events,
        jwt_secret: config.jwt_secret.clone(),
    };
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving")?;

    // Let the in-flight tick finish, then stop the background tasks.
    let _ = shutdown_tx.send(true);
    let _ = reconciler_task.await;
    if let Some(task) = flush_task {
        let _ = task.await;
    }
    Ok(())
}
