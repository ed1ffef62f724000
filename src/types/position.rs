use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prices and balances in minor currency units (paise): 95.00 is stored as 9500.
pub type Price = i64;
pub type Qty = u64;
pub type PositionId = Uuid;

/// Minor units per whole currency unit.
pub const PRICE_SCALE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyStatus {
    Pending,
    Executed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellStatus {
    Pending,
    Executed,
}

/// A buy order that becomes a holding once executed. `remaining_quantity`
/// starts at `quantity` and only ever decreases, via executed sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyPosition {
    pub id: PositionId,
    pub user_id: Uuid,
    pub symbol: String,
    pub buy_price: Price,
    pub quantity: Qty,
    pub remaining_quantity: Qty,
    pub status: BuyStatus,
    pub created_at: DateTime<Utc>,
}

/// A sell order against one executed BuyPosition (`source_id`).
/// `buy_price` is copied from the source at creation for profit calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellPosition {
    pub id: PositionId,
    pub user_id: Uuid,
    pub symbol: String,
    pub source_id: PositionId,
    pub buy_price: Price,
    pub sell_price: Price,
    pub quantity: Qty,
    pub status: SellStatus,
    pub created_at: DateTime<Utc>,
}

/// Discriminated position record, tagged the way the original data model
/// stored it (`"type": "buy" | "sell"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Position {
    Buy(BuyPosition),
    Sell(SellPosition),
}

impl Position {
    pub fn id(&self) -> PositionId {
        match self {
            Position::Buy(b) => b.id,
            Position::Sell(s) => s.id,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Position::Buy(b) => b.user_id,
            Position::Sell(s) => s.user_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Position::Buy(b) => &b.symbol,
            Position::Sell(s) => &s.symbol,
        }
    }

    /// True for pending buys and pending sells: the states the
    /// reconciliation sweep still cares about.
    pub fn is_pending(&self) -> bool {
        match self {
            Position::Buy(b) => b.status == BuyStatus::Pending,
            Position::Sell(s) => s.status == SellStatus::Pending,
        }
    }
}
