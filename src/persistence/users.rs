//! Credential persistence: list for hydration, upsert from the flush task.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::store::Credential;

/// Row returned from DB (username is stored lowercase).
#[derive(FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
}

/// List all users, for hydration.
pub async fn list_users(pool: &PgPool) -> Result<Vec<UserRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>("SELECT id, username, password_hash FROM users")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Upsert a credential. Username must already be lowercase.
pub async fn upsert_user(pool: &PgPool, cred: &Credential) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(cred.user_id)
    .bind(&cred.username)
    .bind(&cred.password_hash)
    .execute(pool)
    .await?;
    Ok(())
}
