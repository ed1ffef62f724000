//! Position persistence: upsert, delete, and list for hydration.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::position::{
    BuyPosition, BuyStatus, Position, PositionId, SellPosition, SellStatus,
};

#[derive(Debug, sqlx::FromRow)]
pub struct PositionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub kind: String,
    pub status: String,
    pub buy_price: i64,
    pub sell_price: Option<i64>,
    pub quantity: i64,
    pub remaining_quantity: Option<i64>,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

fn buy_status_to_str(s: BuyStatus) -> &'static str {
    match s {
        BuyStatus::Pending => "pending",
        BuyStatus::Executed => "executed",
        BuyStatus::Closed => "closed",
    }
}

fn sell_status_to_str(s: SellStatus) -> &'static str {
    match s {
        SellStatus::Pending => "pending",
        SellStatus::Executed => "executed",
    }
}

/// Upsert one position (the flush task rewrites current state).
pub async fn upsert_position(pool: &PgPool, position: &Position) -> Result<(), sqlx::Error> {
    let (id, user_id, symbol, kind, status, buy_price, sell_price, quantity, remaining, source, created_at) =
        match position {
            Position::Buy(b) => (
                b.id,
                b.user_id,
                b.symbol.as_str(),
                "buy",
                buy_status_to_str(b.status),
                b.buy_price,
                None,
                b.quantity as i64,
                Some(b.remaining_quantity as i64),
                None,
                b.created_at,
            ),
            Position::Sell(s) => (
                s.id,
                s.user_id,
                s.symbol.as_str(),
                "sell",
                sell_status_to_str(s.status),
                s.buy_price,
                Some(s.sell_price),
                s.quantity as i64,
                None,
                Some(s.source_id),
                s.created_at,
            ),
        };
    sqlx::query(
        "INSERT INTO positions \
         (id, user_id, symbol, kind, status, buy_price, sell_price, quantity, remaining_quantity, source_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (id) DO UPDATE SET \
         status = $5, buy_price = $6, sell_price = $7, quantity = $8, remaining_quantity = $9",
    )
    .bind(id)
    .bind(user_id)
    .bind(symbol)
    .bind(kind)
    .bind(status)
    .bind(buy_price)
    .bind(sell_price)
    .bind(quantity)
    .bind(remaining)
    .bind(source)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a position (cancelled or purged by reset).
pub async fn delete_position(pool: &PgPool, id: PositionId) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM positions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// List all positions for hydration.
pub async fn list_positions(pool: &PgPool) -> Result<Vec<PositionRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT id, user_id, symbol, kind, status, buy_price, sell_price, quantity, \
         remaining_quantity, source_id, created_at FROM positions",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Convert a row back into a Position. Rows with inconsistent kind/status
/// are skipped rather than trusted.
pub fn position_row_to_position(row: &PositionRow) -> Option<Position> {
    match row.kind.as_str() {
        "buy" => {
            let status = match row.status.as_str() {
                "pending" => BuyStatus::Pending,
                "executed" => BuyStatus::Executed,
                "closed" => BuyStatus::Closed,
                _ => return None,
            };
            Some(Position::Buy(BuyPosition {
                id: row.id,
                user_id: row.user_id,
                symbol: row.symbol.clone(),
                buy_price: row.buy_price,
                quantity: row.quantity.try_into().ok()?,
                remaining_quantity: row.remaining_quantity?.try_into().ok()?,
                status,
                created_at: row.created_at,
            }))
        }
        "sell" => {
            let status = match row.status.as_str() {
                "pending" => SellStatus::Pending,
                "executed" => SellStatus::Executed,
                _ => return None,
            };
            Some(Position::Sell(SellPosition {
                id: row.id,
                user_id: row.user_id,
                symbol: row.symbol.clone(),
                source_id: row.source_id?,
                buy_price: row.buy_price,
                sell_price: row.sell_price?,
                quantity: row.quantity.try_into().ok()?,
                status,
                created_at: row.created_at,
            }))
        }
        _ => None,
    }
}
