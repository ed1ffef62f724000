//! Account ledger: the single entry point for balance mutation.

use uuid::Uuid;

use crate::error::EngineError;
use crate::store::Book;
use crate::types::position::Price;

/// Apply a signed delta to a user's balance and return the new balance.
///
/// Debits that would drive the balance negative are rejected with
/// `InsufficientFunds`; credits are unconditional. Callers invoke this under
/// the same `Book` write guard as the position/history writes it accompanies,
/// which is the transactional boundary of one order resolution.
pub fn apply_delta(book: &mut Book, user_id: Uuid, delta: Price) -> Result<Price, EngineError> {
    let account = book
        .account_mut(user_id)
        .ok_or(EngineError::AccountNotFound)?;
    let new_balance = account.balance + delta;
    if delta < 0 && new_balance < 0 {
        return Err(EngineError::InsufficientFunds {
            required: -delta,
            available: account.balance,
        });
    }
    account.balance = new_balance;
    Ok(new_balance)
}

/// Read-only balance lookup.
pub fn balance(book: &Book, user_id: Uuid) -> Result<Price, EngineError> {
    book.account(user_id)
        .map(|a| a.balance)
        .ok_or(EngineError::AccountNotFound)
}
