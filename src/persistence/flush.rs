//! Write-behind flush: periodically snapshots the in-memory book into
//! Postgres. Durability is best-effort between flushes; failed statements
//! are logged, and upserts converge on the next interval.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;

use crate::store::{Credential, SharedBook};
use crate::types::account::Account;
use crate::types::history::HistoryRecord;
use crate::types::position::{Position, PositionId};

use super::{accounts, history, positions, users};

struct Snapshot {
    accounts: Vec<Account>,
    positions: Vec<Position>,
    history: Vec<HistoryRecord>,
    credentials: Vec<Credential>,
    tombstones: Vec<PositionId>,
    purged_users: Vec<uuid::Uuid>,
}

/// Run until `shutdown` flips to true, then flush one final time.
pub async fn run(book: SharedBook, pool: PgPool, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    flush_once(&book, &pool).await;
                    tracing::info!("flush task stopping");
                    return;
                }
            }
            _ = ticker.tick() => {
                flush_once(&book, &pool).await;
            }
        }
    }
}

pub async fn flush_once(book: &SharedBook, pool: &PgPool) {
    let snapshot = {
        let mut guard = book.write().await;
        Snapshot {
            accounts: guard.accounts().cloned().collect(),
            positions: guard.positions().cloned().collect(),
            history: guard.history().to_vec(),
            credentials: guard.credentials().cloned().collect(),
            tombstones: guard.take_tombstones(),
            purged_users: guard.take_purged_users(),
        }
    };

    for id in &snapshot.tombstones {
        if let Err(err) = positions::delete_position(pool, *id).await {
            tracing::warn!(position = %id, error = %err, "position delete not flushed");
        }
    }
    for user_id in &snapshot.purged_users {
        if let Err(err) = history::delete_history_for_user(pool, *user_id).await {
            tracing::warn!(user = %user_id, error = %err, "history purge not flushed");
        }
    }
    for cred in &snapshot.credentials {
        if let Err(err) = users::upsert_user(pool, cred).await {
            tracing::warn!(user = %cred.user_id, error = %err, "credential not flushed");
        }
    }
    for account in &snapshot.accounts {
        if let Err(err) = accounts::upsert_account(pool, account).await {
            tracing::warn!(user = %account.user_id, error = %err, "account not flushed");
        }
    }
    for position in &snapshot.positions {
        if let Err(err) = positions::upsert_position(pool, position).await {
            tracing::warn!(position = %position.id(), error = %err, "position not flushed");
        }
    }
    for record in &snapshot.history {
        if let Err(err) = history::insert_history(pool, record).await {
            tracing::warn!(record = %record.id, error = %err, "history not flushed");
        }
    }
}
