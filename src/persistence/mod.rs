//! Database layer: pool, migrations, hydration, and write-behind flush for
//! accounts, positions, history, and credentials.

mod accounts;
pub mod flush;
mod history;
mod pool;
mod positions;
mod users;

pub use pool::{create_pool_and_migrate, run_migrations};
pub use sqlx::PgPool;

use crate::store::{Book, Credential};
use crate::types::account::Account;

/// Load all persisted state into a fresh book at startup.
pub async fn hydrate(pool: &PgPool) -> Result<Book, sqlx::Error> {
    let mut book = Book::default();
    for row in users::list_users(pool).await? {
        book.insert_credential(Credential {
            user_id: row.id,
            username: row.username,
            password_hash: row.password_hash,
        });
    }
    for row in accounts::list_accounts(pool).await? {
        book.insert_account(Account {
            user_id: row.user_id,
            balance: row.balance,
        });
    }
    for row in positions::list_positions(pool).await? {
        match positions::position_row_to_position(&row) {
            Some(position) => book.insert_position(position),
            None => tracing::warn!(id = %row.id, "skipping malformed position row"),
        }
    }
    for row in history::list_history(pool).await? {
        match history::history_row_to_record(&row) {
            Some(record) => book.append_history(record),
            None => tracing::warn!(id = %row.id, "skipping malformed history row"),
        }
    }
    Ok(book)
}
