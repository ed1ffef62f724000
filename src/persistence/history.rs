//! History persistence. Rows are immutable: insert-on-conflict-nothing from
//! the flush task, deleted only when an account is reset.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::history::HistoryRecord;

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub buy_price: i64,
    pub sell_price: i64,
    pub quantity: i64,
    pub profit: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_history(pool: &PgPool, record: &HistoryRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO history (id, user_id, symbol, buy_price, sell_price, quantity, profit, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (id) DO NOTHING",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.symbol)
    .bind(record.buy_price)
    .bind(record.sell_price)
    .bind(record.quantity as i64)
    .bind(record.profit)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_history_for_user(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM history WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// List all history for hydration.
pub async fn list_history(pool: &PgPool) -> Result<Vec<HistoryRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, user_id, symbol, buy_price, sell_price, quantity, profit, created_at \
         FROM history ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub fn history_row_to_record(row: &HistoryRow) -> Option<HistoryRecord> {
    Some(HistoryRecord {
        id: row.id,
        user_id: row.user_id,
        symbol: row.symbol.clone(),
        buy_price: row.buy_price,
        sell_price: row.sell_price,
        quantity: row.quantity.try_into().ok()?,
        profit: row.profit,
        created_at: row.created_at,
    })
}
