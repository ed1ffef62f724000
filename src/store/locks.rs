//! Per-user and per-(user, symbol) serialization.
//!
//! Every order transition holds the user's shared lock plus the
//! (user, symbol) mutex for the whole read-decide-write step, so the
//! manual paths and the reconciliation sweep can never interleave on the
//! same key. Account reset takes the user lock exclusively, which drains
//! all in-flight resolutions for that user first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Default)]
pub struct LockRegistry {
    users: StdMutex<HashMap<Uuid, Arc<RwLock<()>>>>,
    keys: StdMutex<HashMap<(Uuid, String), Arc<Mutex<()>>>>,
}

impl LockRegistry {
    fn user_entry(&self, user_id: Uuid) -> Arc<RwLock<()>> {
        let mut users = self.users.lock().expect("user lock registry poisoned");
        users.entry(user_id).or_default().clone()
    }

    fn key_entry(&self, user_id: Uuid, symbol: &str) -> Arc<Mutex<()>> {
        let mut keys = self.keys.lock().expect("key lock registry poisoned");
        keys.entry((user_id, symbol.to_string())).or_default().clone()
    }

    /// Shared user lock, taken by every normal order operation.
    pub async fn user_shared(&self, user_id: Uuid) -> OwnedRwLockReadGuard<()> {
        self.user_entry(user_id).read_owned().await
    }

    /// Exclusive user lock for account reset: waits out every in-flight
    /// resolution touching this user.
    pub async fn user_exclusive(&self, user_id: Uuid) -> OwnedRwLockWriteGuard<()> {
        self.user_entry(user_id).write_owned().await
    }

    /// The (user, symbol) mutex, bounded by `timeout`. Timing out means a
    /// conflicting transition is still running; nothing has been committed,
    /// so the caller may retry.
    pub async fn key(
        &self,
        user_id: Uuid,
        symbol: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, EngineError> {
        let entry = self.key_entry(user_id, symbol);
        tokio::time::timeout(timeout, entry.lock_owned())
            .await
            .map_err(|_| EngineError::ConcurrencyConflict)
    }
}
