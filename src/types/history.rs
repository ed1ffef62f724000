use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::position::{Price, Qty};

/// Immutable record of one completed sale. Written exactly once per
/// executed SellPosition; removed only by account reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub buy_price: Price,
    pub sell_price: Price,
    pub quantity: Qty,
    pub profit: Price,
    pub created_at: DateTime<Utc>,
}
