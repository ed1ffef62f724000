//! Order & position lifecycle engine: buy/sell submission, modify/cancel,
//! and the per-symbol execution resolver driven by the reconciliation sweep.
//!
//! Every transition runs under the owner's shared user lock plus the
//! (user, symbol) mutex, then applies all of its mutations (position,
//! history, balance) behind one `Book` write guard.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ledger;
use crate::notify::{EventSender, OrderEvent, Transition};
use crate::pricing::PriceSource;
use crate::store::locks::LockRegistry;
use crate::store::{Book, SharedBook};
use crate::types::account::Account;
use crate::types::history::HistoryRecord;
use crate::types::position::{
    BuyPosition, BuyStatus, Position, PositionId, Price, Qty, SellPosition, SellStatus,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_ATTEMPTS: u32 = 2;

pub struct Engine {
    book: SharedBook,
    locks: LockRegistry,
    prices: Arc<dyn PriceSource>,
    events: EventSender,
    starting_balance: Price,
    lock_timeout: Duration,
}

/// What one reconciliation pass over a symbol did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub buys_executed: usize,
    pub sells_executed: usize,
    pub sells_rejected: usize,
}

impl Engine {
    pub fn new(
        book: SharedBook,
        prices: Arc<dyn PriceSource>,
        events: EventSender,
        starting_balance: Price,
    ) -> Self {
        Self {
            book,
            locks: LockRegistry::default(),
            prices,
            events,
            starting_balance,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    pub fn starting_balance(&self) -> Price {
        self.starting_balance
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    /// Create a cash account at the starting balance (signup path).
    pub async fn open_account(&self, user_id: Uuid) {
        let mut book = self.book.write().await;
        book.insert_account(Account {
            user_id,
            balance: self.starting_balance,
        });
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Price, EngineError> {
        let book = self.book.read().await;
        ledger::balance(&book, user_id)
    }

    // --- order submission ---

    /// Place a buy order. Fills immediately at the observed market price when
    /// `limit_price >= market`; otherwise rests pending with the principal
    /// `limit_price * quantity` reserved from the balance.
    pub async fn place_buy(
        &self,
        user_id: Uuid,
        symbol: &str,
        limit_price: Price,
        quantity: Qty,
    ) -> Result<Position, EngineError> {
        let symbol = validate_order(symbol, limit_price, quantity)?;
        // Network fetch happens before any lock is taken.
        let market = self.prices.fetch(&symbol).await?;

        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, &symbol).await?;
        let mut book = self.book.write().await;

        let (status, buy_price) = if limit_price >= market {
            (BuyStatus::Executed, market)
        } else {
            (BuyStatus::Pending, limit_price)
        };
        // Executed: pay the fill. Pending: reserve the limit principal,
        // refunded or reconciled at cancel/modify/execution.
        let principal = notional(buy_price, quantity)?;
        ledger::apply_delta(&mut book, user_id, -principal)?;

        let position = Position::Buy(BuyPosition {
            id: Uuid::new_v4(),
            user_id,
            symbol,
            buy_price,
            quantity,
            remaining_quantity: quantity,
            status,
            created_at: Utc::now(),
        });
        book.insert_position(position.clone());
        Ok(position)
    }

    /// Place a sell order against the user's executed holding for `symbol`.
    /// Fills immediately at the observed market price when
    /// `limit_price <= market`; otherwise rests pending.
    pub async fn place_sell(
        &self,
        user_id: Uuid,
        symbol: &str,
        limit_price: Price,
        quantity: Qty,
    ) -> Result<Position, EngineError> {
        let symbol = validate_order(symbol, limit_price, quantity)?;
        let market = self.prices.fetch(&symbol).await?;

        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, &symbol).await?;
        let mut book = self.book.write().await;

        let source = book
            .executed_buy_for(user_id, &symbol)
            .ok_or_else(|| EngineError::NoMatchingHolding {
                symbol: symbol.clone(),
            })?;
        if quantity > source.remaining_quantity {
            return Err(EngineError::InsufficientQuantity {
                available: source.remaining_quantity,
            });
        }
        let source_id = source.id;
        let buy_price = source.buy_price;

        let mut sell = SellPosition {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.clone(),
            source_id,
            buy_price,
            sell_price: limit_price,
            quantity,
            status: SellStatus::Pending,
            created_at: Utc::now(),
        };

        if limit_price <= market {
            let settled = settle_sale(&mut book, user_id, source_id, market, quantity)?
                .ok_or(EngineError::InsufficientQuantity { available: 0 })?;
            sell.sell_price = market;
            sell.status = SellStatus::Executed;
            debug_assert_eq!(settled.filled, quantity);
        }

        let position = Position::Sell(sell);
        book.insert_position(position.clone());
        Ok(position)
    }

    /// Replace price and quantity of a pending order. For pending buys the
    /// principal reservation is adjusted by the difference.
    pub async fn modify_order(
        &self,
        user_id: Uuid,
        position_id: PositionId,
        new_price: Price,
        new_quantity: Qty,
    ) -> Result<Position, EngineError> {
        if new_price <= 0 || new_quantity == 0 {
            return Err(EngineError::Validation(
                "price and quantity must be positive".to_string(),
            ));
        }
        let symbol = self.owned_symbol(user_id, position_id).await?;

        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, &symbol).await?;
        let mut book = self.book.write().await;

        match book.position(position_id).cloned() {
            Some(Position::Buy(buy)) if buy.status == BuyStatus::Pending => {
                let old_reserved = notional(buy.buy_price, buy.quantity)?;
                let new_reserved = notional(new_price, new_quantity)?;
                ledger::apply_delta(&mut book, user_id, old_reserved - new_reserved)?;
                let buy = book.buy_mut(position_id).ok_or(EngineError::PositionNotFound)?;
                buy.buy_price = new_price;
                buy.quantity = new_quantity;
                buy.remaining_quantity = new_quantity;
            }
            Some(Position::Sell(sell)) if sell.status == SellStatus::Pending => {
                let available = book
                    .buy_mut(sell.source_id)
                    .map(|b| b.remaining_quantity)
                    .unwrap_or(0);
                if new_quantity > available {
                    return Err(EngineError::InsufficientQuantity { available });
                }
                let sell = book
                    .sell_mut(position_id)
                    .ok_or(EngineError::PositionNotFound)?;
                sell.sell_price = new_price;
                sell.quantity = new_quantity;
            }
            Some(_) => return Err(EngineError::InvalidState),
            None => return Err(EngineError::PositionNotFound),
        }
        book.position(position_id)
            .cloned()
            .ok_or(EngineError::PositionNotFound)
    }

    /// Cancel a pending order: releases the buy principal reservation and
    /// deletes the position. Non-pending positions fail `InvalidState`.
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        let symbol = self.owned_symbol(user_id, position_id).await?;

        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, &symbol).await?;
        let mut book = self.book.write().await;

        match book.position(position_id) {
            Some(Position::Buy(buy)) if buy.status == BuyStatus::Pending => {
                let refund = notional(buy.buy_price, buy.quantity)?;
                ledger::apply_delta(&mut book, user_id, refund)?;
                book.remove_position(position_id);
                Ok(())
            }
            Some(Position::Sell(sell)) if sell.status == SellStatus::Pending => {
                book.remove_position(position_id);
                Ok(())
            }
            Some(_) => Err(EngineError::InvalidState),
            None => Err(EngineError::PositionNotFound),
        }
    }

    // --- read-only projections ---

    pub async fn list_positions(&self, user_id: Uuid) -> Vec<Position> {
        self.book.read().await.positions_for_user(user_id)
    }

    /// Executed or closed buys and executed sells, the "portfolio" view.
    pub async fn list_executed_or_closed(&self, user_id: Uuid) -> Vec<Position> {
        self.book
            .read()
            .await
            .positions_for_user(user_id)
            .into_iter()
            .filter(|p| match p {
                Position::Buy(b) => {
                    b.status == BuyStatus::Executed || b.status == BuyStatus::Closed
                }
                Position::Sell(s) => s.status == SellStatus::Executed,
            })
            .collect()
    }

    pub async fn list_history(&self, user_id: Uuid) -> Vec<HistoryRecord> {
        self.book.read().await.history_for_user(user_id)
    }

    /// Purge the user's positions and history and restore the starting
    /// balance. Holds the user lock exclusively, so no resolution for this
    /// user can be in flight while the purge runs.
    pub async fn reset_account(&self, user_id: Uuid) -> Result<Price, EngineError> {
        let _user = self.locks.user_exclusive(user_id).await;
        let mut book = self.book.write().await;
        if book.account(user_id).is_none() {
            return Err(EngineError::AccountNotFound);
        }
        book.reset_user(user_id, self.starting_balance);
        Ok(self.starting_balance)
    }

    // --- reconciliation path ---

    /// Resolve all pending orders on `symbol` against the observed `price`.
    ///
    /// Both sides fill at the observed price, the better of the two given the
    /// trigger condition: a triggered buy has `limit >= price`, a triggered
    /// sell has `price >= limit`. Each order is re-read under its key lock,
    /// so a transition already applied by a concurrent manual request is
    /// never applied twice.
    pub async fn resolve_symbol(&self, symbol: &str, price: Price) -> ResolveOutcome {
        let symbol = symbol.to_uppercase();
        let mut outcome = ResolveOutcome::default();

        let (buys, sells) = {
            let book = self.book.read().await;
            (
                book.pending_buys_for_symbol(&symbol),
                book.pending_sells_for_symbol(&symbol),
            )
        };

        for buy in buys {
            if buy.buy_price < price {
                continue;
            }
            match self.resolve_buy(&buy, &symbol, price).await {
                Ok(true) => outcome.buys_executed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%symbol, position = %buy.id, error = %err, "buy resolution skipped")
                }
            }
        }

        for sell in sells {
            if price < sell.sell_price {
                continue;
            }
            match self.resolve_sell(&sell, &symbol, price).await {
                Ok(Some(true)) => outcome.sells_executed += 1,
                Ok(Some(false)) => outcome.sells_rejected += 1,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%symbol, position = %sell.id, error = %err, "sell resolution skipped")
                }
            }
        }

        outcome
    }

    /// Transition one pending buy to executed at `price`. Returns false when
    /// the order changed state or price out from under the snapshot.
    async fn resolve_buy(
        &self,
        snapshot: &BuyPosition,
        symbol: &str,
        price: Price,
    ) -> Result<bool, EngineError> {
        let user_id = snapshot.user_id;
        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, symbol).await?;
        let mut book = self.book.write().await;

        let Some(buy) = book.buy_mut(snapshot.id) else {
            return Ok(false); // cancelled or reset meanwhile
        };
        if buy.status != BuyStatus::Pending || buy.buy_price < price {
            return Ok(false);
        }
        let limit = buy.buy_price;
        let quantity = buy.quantity;
        // Reservation was limit * qty; the fill costs price * qty.
        let refund = notional(limit - price, quantity)?;
        buy.status = BuyStatus::Executed;
        buy.buy_price = price;
        ledger::apply_delta(&mut book, user_id, refund)?;
        let balance = ledger::balance(&book, user_id).ok();
        drop(book);

        self.emit(OrderEvent {
            user_id,
            symbol: symbol.to_string(),
            position_id: snapshot.id,
            transition: Transition::BuyExecuted,
            profit: None,
            balance,
        });
        Ok(true)
    }

    /// Execute one pending sell at `price`. `Some(true)` = executed (possibly
    /// partially), `Some(false)` = rejected because the source holding is
    /// empty, `None` = no longer applicable.
    async fn resolve_sell(
        &self,
        snapshot: &SellPosition,
        symbol: &str,
        price: Price,
    ) -> Result<Option<bool>, EngineError> {
        let user_id = snapshot.user_id;
        let _user = self.locks.user_shared(user_id).await;
        let _key = self.key_lock(user_id, symbol).await?;
        let mut book = self.book.write().await;

        let Some(Position::Sell(sell)) = book.position(snapshot.id).cloned() else {
            return Ok(None);
        };
        if sell.status != SellStatus::Pending || price < sell.sell_price {
            return Ok(None);
        }

        let Some(settled) = settle_sale(&mut book, user_id, sell.source_id, price, sell.quantity)?
        else {
            // Source holding was sold out by other sells while this one was
            // pending; nothing left to fill.
            book.remove_position(sell.id);
            drop(book);
            self.emit(OrderEvent {
                user_id,
                symbol: symbol.to_string(),
                position_id: snapshot.id,
                transition: Transition::SellRejected,
                profit: None,
                balance: None,
            });
            return Ok(Some(false));
        };

        let record = book.sell_mut(sell.id).ok_or(EngineError::PositionNotFound)?;
        record.status = SellStatus::Executed;
        record.sell_price = price;
        record.quantity = settled.filled; // partial fill when the source shrank
        let balance = settled.balance;
        let profit = settled.profit;
        drop(book);

        self.emit(OrderEvent {
            user_id,
            symbol: symbol.to_string(),
            position_id: snapshot.id,
            transition: Transition::SellExecuted,
            profit: Some(profit),
            balance: Some(balance),
        });
        Ok(Some(true))
    }

    fn emit(&self, event: OrderEvent) {
        // No subscribers is fine; delivery is best-effort.
        let _ = self.events.send(event);
    }

    async fn key_lock(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, EngineError> {
        let mut last = EngineError::ConcurrencyConflict;
        for _ in 0..LOCK_ATTEMPTS {
            match self.locks.key(user_id, symbol, self.lock_timeout).await {
                Ok(guard) => return Ok(guard),
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    /// Symbol of a position owned by `user_id`, for lock acquisition.
    async fn owned_symbol(
        &self,
        user_id: Uuid,
        position_id: PositionId,
    ) -> Result<String, EngineError> {
        let book = self.book.read().await;
        let position = book.position(position_id).ok_or(EngineError::PositionNotFound)?;
        if position.user_id() != user_id {
            return Err(EngineError::PositionNotFound);
        }
        Ok(position.symbol().to_string())
    }
}

struct SettledSale {
    filled: Qty,
    profit: Price,
    balance: Price,
}

/// Settle a sale against its source holding: decrement the remaining
/// quantity (closing the buy at exactly zero), append the history record,
/// and credit principal plus profit. Returns `None` when nothing remains to
/// fill. Runs entirely under one `Book` write guard.
fn settle_sale(
    book: &mut Book,
    user_id: Uuid,
    source_id: PositionId,
    exec_price: Price,
    quantity: Qty,
) -> Result<Option<SettledSale>, EngineError> {
    let Some(buy) = book.buy_mut(source_id) else {
        return Ok(None);
    };
    let filled = quantity.min(buy.remaining_quantity);
    if filled == 0 {
        return Ok(None);
    }
    let buy_price = buy.buy_price;
    let symbol = buy.symbol.clone();
    let principal = notional(buy_price, filled)?;
    let proceeds = notional(exec_price, filled)?;
    buy.remaining_quantity -= filled;
    if buy.remaining_quantity == 0 {
        buy.status = BuyStatus::Closed;
    }

    let profit = proceeds - principal;
    book.append_history(HistoryRecord {
        id: Uuid::new_v4(),
        user_id,
        symbol,
        buy_price,
        sell_price: exec_price,
        quantity: filled,
        profit,
        created_at: Utc::now(),
    });
    // Return of principal plus realized gain/loss; credits are unconditional.
    let balance = ledger::apply_delta(book, user_id, proceeds)?;
    Ok(Some(SettledSale {
        filled,
        profit,
        balance,
    }))
}

fn validate_order(symbol: &str, price: Price, quantity: Qty) -> Result<String, EngineError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(EngineError::Validation("symbol is required".to_string()));
    }
    if price <= 0 {
        return Err(EngineError::Validation("price must be positive".to_string()));
    }
    if quantity == 0 {
        return Err(EngineError::Validation(
            "quantity must be positive".to_string(),
        ));
    }
    if i64::try_from(quantity).is_err() {
        return Err(EngineError::Validation(
            "quantity is too large".to_string(),
        ));
    }
    Ok(symbol)
}

/// Checked `price * quantity` in minor units. A total that does not fit an
/// `i64` can never be applied to a balance, so the order is rejected.
fn notional(price: Price, quantity: Qty) -> Result<Price, EngineError> {
    i64::try_from(quantity)
        .ok()
        .and_then(|qty| price.checked_mul(qty))
        .ok_or_else(|| EngineError::Validation("order value is too large".to_string()))
}
