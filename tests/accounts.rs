//! Ledger and balance accounting tests: delta application, reservation
//! round-trips, and the credited-total property across multiple sells.

use std::sync::Arc;

use uuid::Uuid;
use virtutrade::engine::Engine;
use virtutrade::error::EngineError;
use virtutrade::ledger;
use virtutrade::notify;
use virtutrade::pricing::FixedPriceSource;
use virtutrade::store::{self, Book, Credential};
use virtutrade::types::account::Account;

const SYMBOL: &str = "TCS";
const STARTING_BALANCE: i64 = 100_000_000;

fn paise(p: i64) -> i64 {
    p * 100
}

fn book_with_account(user_id: Uuid, balance: i64) -> Book {
    let mut book = Book::default();
    book.insert_account(Account { user_id, balance });
    book
}

#[test]
fn apply_delta_credits_and_debits() {
    let user = Uuid::new_v4();
    let mut book = book_with_account(user, 1_000);

    assert_eq!(ledger::apply_delta(&mut book, user, -400).unwrap(), 600);
    assert_eq!(ledger::apply_delta(&mut book, user, 250).unwrap(), 850);
    assert_eq!(ledger::balance(&book, user).unwrap(), 850);
}

#[test]
fn apply_delta_rejects_overdraft() {
    let user = Uuid::new_v4();
    let mut book = book_with_account(user, 1_000);

    let err = ledger::apply_delta(&mut book, user, -1_001).unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientFunds {
            required: 1_001,
            available: 1_000
        }
    );
    // Nothing was committed.
    assert_eq!(ledger::balance(&book, user).unwrap(), 1_000);
}

#[test]
fn apply_delta_allows_debit_to_exactly_zero() {
    let user = Uuid::new_v4();
    let mut book = book_with_account(user, 1_000);
    assert_eq!(ledger::apply_delta(&mut book, user, -1_000).unwrap(), 0);
}

#[test]
fn apply_delta_unknown_account() {
    let mut book = Book::default();
    let err = ledger::apply_delta(&mut book, Uuid::new_v4(), 100).unwrap_err();
    assert_eq!(err, EngineError::AccountNotFound);
}

// --- registration ---

#[test]
fn register_creates_credential_and_account_together() {
    let mut book = Book::default();
    let user = Uuid::new_v4();
    assert!(book.register(
        Credential {
            user_id: user,
            username: "trader".to_string(),
            password_hash: "hash".to_string(),
        },
        STARTING_BALANCE,
    ));
    assert_eq!(book.credential("trader").unwrap().user_id, user);
    assert_eq!(book.account(user).unwrap().balance, STARTING_BALANCE);
}

#[test]
fn register_taken_username_leaves_existing_pair_untouched() {
    let mut book = Book::default();
    let first = Uuid::new_v4();
    assert!(book.register(
        Credential {
            user_id: first,
            username: "trader".to_string(),
            password_hash: "hash".to_string(),
        },
        STARTING_BALANCE,
    ));

    let second = Uuid::new_v4();
    assert!(!book.register(
        Credential {
            user_id: second,
            username: "trader".to_string(),
            password_hash: "other".to_string(),
        },
        STARTING_BALANCE,
    ));
    // No account opened for the rejected registration.
    assert!(book.account(second).is_none());
    assert_eq!(book.credential("trader").unwrap().user_id, first);
}

// --- accounting across the order lifecycle ---

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

#[tokio::test]
async fn sells_credit_exactly_principal_plus_profit() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();
    let after_buy = engine.balance(user).await.unwrap();
    assert_eq!(after_buy, STARTING_BALANCE - paise(95) * 10);

    prices.set(SYMBOL, paise(96));
    engine.place_sell(user, SYMBOL, paise(80), 4).await.unwrap();
    prices.set(SYMBOL, paise(93));
    engine.place_sell(user, SYMBOL, paise(80), 6).await.unwrap();

    // Each sell returns buy_price * qty plus (exec - buy_price) * qty.
    let expected = after_buy
        + paise(95) * 4 + (paise(96) - paise(95)) * 4
        + paise(95) * 6 + (paise(93) - paise(95)) * 6;
    assert_eq!(engine.balance(user).await.unwrap(), expected);

    // Equivalently: start + total realized profit.
    let total_profit: i64 = engine
        .list_history(user)
        .await
        .iter()
        .map(|h| h.profit)
        .sum();
    assert_eq!(
        engine.balance(user).await.unwrap(),
        STARTING_BALANCE + total_profit
    );
}

#[tokio::test]
async fn loss_making_sell_still_returns_principal_minus_loss() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(95));
    engine.place_buy(user, SYMBOL, paise(100), 10).await.unwrap();

    prices.set(SYMBOL, paise(90));
    engine.place_sell(user, SYMBOL, paise(85), 10).await.unwrap();

    let history = engine.list_history(user).await;
    assert_eq!(history[0].profit, (paise(90) - paise(95)) * 10);
    assert_eq!(
        engine.balance(user).await.unwrap(),
        STARTING_BALANCE + (paise(90) - paise(95)) * 10
    );
}

#[tokio::test]
async fn balance_never_negative_through_engine_operations() {
    let (engine, prices, user) = harness().await;
    prices.set(SYMBOL, paise(1_000));

    // Spend nearly everything, then fail to over-commit.
    engine
        .place_buy(user, SYMBOL, paise(1_000), 999)
        .await
        .unwrap();
    let err = engine
        .place_buy(user, SYMBOL, paise(1_000), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    assert!(engine.balance(user).await.unwrap() >= 0);
}

#[tokio::test]
async fn unknown_user_cannot_trade() {
    let (engine, prices, _user) = harness().await;
    prices.set(SYMBOL, paise(95));

    let stranger = Uuid::new_v4(); // no account opened
    let err = engine
        .place_buy(stranger, SYMBOL, paise(100), 1)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::AccountNotFound);
}
