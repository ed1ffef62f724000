//! Reconciliation sweep integration tests: pending order resolution against
//! fresh prices, skip-and-retry on fetch failure, event emission, shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;
use virtutrade::engine::Engine;
use virtutrade::notify::{self, Transition};
use virtutrade::pricing::FixedPriceSource;
use virtutrade::reconciler::Reconciler;
use virtutrade::store;
use virtutrade::types::position::{BuyStatus, Position, SellStatus};

const SYMBOL: &str = "TCS";
const STARTING_BALANCE: i64 = 100_000_000;

fn paise(p: i64) -> i64 {
    p * 100
}

async fn harness() -> (Arc<Engine>, Arc<FixedPriceSource>, Uuid) {
    let prices = Arc::new(FixedPriceSource::new());
    let (events, _) = notify::channel(64);
    let engine = Arc::new(Engine::new(
        store::shared(),
        prices.clone(),
        events,
        STARTING_BALANCE,
    ));
    let user_id = Uuid::new_v4();
    engine.open_account(user_id).await;
    (engine, prices, user_id)
}

fn reconciler(engine: &Arc<Engine>, prices: &Arc<FixedPriceSource>) -> Reconciler {
    Reconciler::new(
        engine.clone(),
        prices.clone(),
        Duration::from_millis(10),
        Duration::from_millis(500),
    )
}

#[tokio::test]
async fn pending_buy_executes_when_price_drops_to_limit() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    let position = engine.place_buy(user, SYMBOL, paise(90), 10).await.unwrap();

    // Price still above the limit: nothing happens.
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed, 0);

    prices.set(SYMBOL, paise(89));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed, 1);

    let positions = engine.list_positions(user).await;
    let buy = match positions.iter().find(|p| p.id() == position.id()).unwrap() {
        Position::Buy(b) => b,
        _ => panic!("expected buy"),
    };
    assert_eq!(buy.status, BuyStatus::Executed);
    // Fills at the observed price, with the reservation difference refunded.
    assert_eq!(buy.buy_price, paise(89));
    assert_eq!(
        engine.balance(user).await.unwrap(),
        STARTING_BALANCE - paise(89) * 10
    );
}

#[tokio::test]
async fn pending_sell_executes_when_price_reaches_limit() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    engine.place_sell(user, SYMBOL, paise(120), 10).await.unwrap();

    prices.set(SYMBOL, paise(121));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.sells_executed, 1);

    let history = engine.list_history(user).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sell_price, paise(121));
    assert_eq!(history[0].profit, (paise(121) - paise(95)) * 10);

    // Principal plus profit credited; holding closed.
    assert_eq!(
        engine.balance(user).await.unwrap(),
        STARTING_BALANCE + (paise(121) - paise(95)) * 10
    );
    let executed = engine.list_executed_or_closed(user).await;
    let closed_buys = executed
        .iter()
        .filter(|p| matches!(p, Position::Buy(b) if b.status == BuyStatus::Closed))
        .count();
    assert_eq!(closed_buys, 1);
}

#[tokio::test]
async fn resolution_is_applied_at_most_once() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    engine.place_sell(user, SYMBOL, paise(120), 10).await.unwrap();
    prices.set(SYMBOL, paise(121));

    let outcome = engine.resolve_symbol(SYMBOL, paise(121)).await;
    assert_eq!(outcome.sells_executed, 1);
    // Re-delivering the same tick must not double-credit or double-write.
    let outcome = engine.resolve_symbol(SYMBOL, paise(121)).await;
    assert_eq!(outcome.sells_executed, 0);

    assert_eq!(engine.list_history(user).await.len(), 1);
    assert_eq!(
        engine.balance(user).await.unwrap(),
        STARTING_BALANCE + (paise(121) - paise(95)) * 10
    );
}

#[tokio::test]
async fn failed_price_fetch_skips_symbol_until_next_tick() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(90), 10).await.unwrap();

    // Feed goes dark: the sweep skips the symbol and keeps the order pending.
    prices.clear(SYMBOL);
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed, 0);
    let positions = engine.list_positions(user).await;
    assert!(positions[0].is_pending());

    // Feed recovers: next tick resolves it.
    prices.set(SYMBOL, paise(88));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed, 1);
}

#[tokio::test]
async fn sweep_covers_all_symbols_with_pending_orders() {
    let (engine, prices, user) = harness().await;
    prices.set("TCS", paise(95));
    prices.set("INFY", paise(200));
    engine.place_buy(user, "TCS", paise(90), 10).await.unwrap();
    engine.place_buy(user, "INFY", paise(190), 5).await.unwrap();

    prices.set("TCS", paise(90));
    prices.set("INFY", paise(189));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed, 2);
}

#[tokio::test]
async fn stale_pending_sell_fills_partially_when_source_shrank() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    // Rests pending for 6 shares...
    engine.place_sell(user, SYMBOL, paise(120), 6).await.unwrap();
    // ...then a manual sell consumes 6 of the 10 first.
    engine.place_sell(user, SYMBOL, paise(90), 6).await.unwrap();

    prices.set(SYMBOL, paise(121));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.sells_executed, 1);

    // The pending sell filled only the 4 that remained.
    let history = engine.list_history(user).await;
    let total_sold: u64 = history.iter().map(|h| h.quantity).sum();
    assert_eq!(total_sold, 10);
    let sells = engine.list_positions(user).await;
    let partial = sells
        .iter()
        .find_map(|p| match p {
            Position::Sell(s) if s.sell_price == paise(121) => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(partial.quantity, 4);
    assert_eq!(partial.status, SellStatus::Executed);
}

#[tokio::test]
async fn stale_pending_sell_rejected_when_source_empty() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    let pending = engine.place_sell(user, SYMBOL, paise(120), 5).await.unwrap();
    // Manual sell empties the holding entirely.
    engine.place_sell(user, SYMBOL, paise(90), 10).await.unwrap();

    prices.set(SYMBOL, paise(121));
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.sells_rejected, 1);
    assert_eq!(outcome.sells_executed, 0);

    // The stale sell is gone and no extra history was written.
    assert!(
        engine
            .list_positions(user)
            .await
            .iter()
            .all(|p| p.id() != pending.id())
    );
    assert_eq!(engine.list_history(user).await.len(), 1);
}

#[tokio::test]
async fn sweep_emits_events_for_resolved_transitions() {
    let (engine, prices, user) = harness().await;
    let mut events = engine.subscribe();
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    engine.place_sell(user, SYMBOL, paise(120), 10).await.unwrap();

    prices.set(SYMBOL, paise(121));
    reconciler(&engine, &prices).sweep_once().await;

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event within 1s")
        .unwrap();
    assert_eq!(event.user_id, user);
    assert_eq!(event.symbol, SYMBOL);
    assert_eq!(event.transition, Transition::SellExecuted);
    assert_eq!(event.profit, Some((paise(121) - paise(95)) * 10));
    assert_eq!(
        event.balance,
        Some(STARTING_BALANCE + (paise(121) - paise(95)) * 10)
    );
}

#[tokio::test]
async fn run_loop_resolves_and_stops_on_shutdown() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(90), 10).await.unwrap();
    prices.set(SYMBOL, paise(89));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(reconciler(&engine, &prices).run(shutdown_rx));

    // Give the 10ms interval a few ticks to resolve the order.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let positions = engine.list_positions(user).await;
        if !positions[0].is_pending() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "order never resolved");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("reconciler stopped after shutdown")
        .unwrap();
}

#[tokio::test]
async fn reset_account_purges_state_and_restores_balance() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    prices.set(SYMBOL, paise(96));
    engine.place_sell(user, SYMBOL, paise(80), 5).await.unwrap();
    assert!(!engine.list_history(user).await.is_empty());

    let balance = engine.reset_account(user).await.unwrap();
    assert_eq!(balance, STARTING_BALANCE);
    assert!(engine.list_positions(user).await.is_empty());
    assert!(engine.list_history(user).await.is_empty());
    assert_eq!(engine.balance(user).await.unwrap(), STARTING_BALANCE);

    // A sweep after the reset finds nothing to do.
    let outcome = reconciler(&engine, &prices).sweep_once().await;
    assert_eq!(outcome.buys_executed + outcome.sells_executed, 0);
}
