use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::position::Price;

/// Cash account. `balance` is mutated only through the ledger and never
/// driven negative by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: Uuid,
    pub balance: Price,
}
