//! Account persistence: upsert and list for hydration.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::types::account::Account;

#[derive(FromRow)]
pub struct AccountRow {
    pub user_id: Uuid,
    pub balance: i64,
}

pub async fn upsert_account(pool: &PgPool, account: &Account) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO accounts (user_id, balance) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET balance = $2",
    )
    .bind(account.user_id)
    .bind(account.balance)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_accounts(pool: &PgPool) -> Result<Vec<AccountRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AccountRow>("SELECT user_id, balance FROM accounts")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
