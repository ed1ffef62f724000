use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::account::Account;
use crate::types::history::HistoryRecord;
use crate::types::position::{
    BuyPosition, BuyStatus, Position, PositionId, Price, SellPosition, SellStatus,
};

pub type SharedBook = Arc<RwLock<Book>>;

/// Login credential (username is stored lowercase).
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
}

/// All engine state. One write guard covers one order resolution, so the
/// position, history, and balance mutations of a transition commit together.
#[derive(Default)]
pub struct Book {
    accounts: HashMap<Uuid, Account>,
    positions: HashMap<PositionId, Position>,
    history: Vec<HistoryRecord>,
    credentials: HashMap<String, Credential>,
    // Position ids deleted since the last flush, for the write-behind task.
    tombstones: Vec<PositionId>,
    // Users reset since the last flush; their history rows need deleting.
    purged_users: Vec<Uuid>,
}

pub fn shared() -> SharedBook {
    Arc::new(RwLock::new(Book::default()))
}

impl Book {
    // --- accounts ---

    pub fn insert_account(&mut self, account: Account) {
        self.accounts.insert(account.user_id, account);
    }

    pub fn account(&self, user_id: Uuid) -> Option<&Account> {
        self.accounts.get(&user_id)
    }

    pub fn account_mut(&mut self, user_id: Uuid) -> Option<&mut Account> {
        self.accounts.get_mut(&user_id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    // --- credentials ---

    pub fn insert_credential(&mut self, cred: Credential) {
        self.credentials.insert(cred.username.clone(), cred);
    }

    /// Insert a credential and open its account in one step, so a flush can
    /// never observe a credential without an account. Returns `false` when
    /// the username is already taken.
    pub fn register(&mut self, cred: Credential, starting_balance: Price) -> bool {
        if self.credentials.contains_key(&cred.username) {
            return false;
        }
        self.accounts.insert(
            cred.user_id,
            Account {
                user_id: cred.user_id,
                balance: starting_balance,
            },
        );
        self.credentials.insert(cred.username.clone(), cred);
        true
    }

    pub fn credential(&self, username_lowercase: &str) -> Option<&Credential> {
        self.credentials.get(username_lowercase)
    }

    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.values()
    }

    // --- positions ---

    pub fn insert_position(&mut self, position: Position) {
        self.positions.insert(position.id(), position);
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn buy_mut(&mut self, id: PositionId) -> Option<&mut BuyPosition> {
        match self.positions.get_mut(&id) {
            Some(Position::Buy(b)) => Some(b),
            _ => None,
        }
    }

    pub fn sell_mut(&mut self, id: PositionId) -> Option<&mut SellPosition> {
        match self.positions.get_mut(&id) {
            Some(Position::Sell(s)) => Some(s),
            _ => None,
        }
    }

    pub fn remove_position(&mut self, id: PositionId) -> Option<Position> {
        let removed = self.positions.remove(&id);
        if removed.is_some() {
            self.tombstones.push(id);
        }
        removed
    }

    pub fn positions_for_user(&self, user_id: Uuid) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .positions
            .values()
            .filter(|p| p.user_id() == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| match p {
            Position::Buy(b) => b.created_at,
            Position::Sell(s) => s.created_at,
        });
        out
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// The user's open lot for a symbol: the executed, not yet closed buy.
    /// The model assumes at most one per (user, symbol).
    pub fn executed_buy_for(&self, user_id: Uuid, symbol: &str) -> Option<&BuyPosition> {
        self.positions.values().find_map(|p| match p {
            Position::Buy(b)
                if b.user_id == user_id
                    && b.symbol == symbol
                    && b.status == BuyStatus::Executed =>
            {
                Some(b)
            }
            _ => None,
        })
    }

    pub fn pending_buys_for_symbol(&self, symbol: &str) -> Vec<BuyPosition> {
        self.positions
            .values()
            .filter_map(|p| match p {
                Position::Buy(b) if b.symbol == symbol && b.status == BuyStatus::Pending => {
                    Some(b.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn pending_sells_for_symbol(&self, symbol: &str) -> Vec<SellPosition> {
        self.positions
            .values()
            .filter_map(|p| match p {
                Position::Sell(s) if s.symbol == symbol && s.status == SellStatus::Pending => {
                    Some(s.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Distinct symbols with at least one pending order, for the sweep.
    pub fn distinct_pending_symbols(&self) -> Vec<String> {
        let mut symbols: HashSet<String> = HashSet::new();
        for p in self.positions.values() {
            if p.is_pending() {
                symbols.insert(p.symbol().to_string());
            }
        }
        let mut out: Vec<String> = symbols.into_iter().collect();
        out.sort();
        out
    }

    /// Purge a user's positions and history and restore the given balance.
    pub fn reset_user(&mut self, user_id: Uuid, starting_balance: Price) {
        let doomed: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.user_id() == user_id)
            .map(|p| p.id())
            .collect();
        for id in doomed {
            self.positions.remove(&id);
            self.tombstones.push(id);
        }
        self.history.retain(|h| h.user_id != user_id);
        self.purged_users.push(user_id);
        if let Some(account) = self.accounts.get_mut(&user_id) {
            account.balance = starting_balance;
        }
    }

    // --- history ---

    pub fn append_history(&mut self, record: HistoryRecord) {
        self.history.push(record);
    }

    pub fn history_for_user(&self, user_id: Uuid) -> Vec<HistoryRecord> {
        self.history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Drain deleted position ids for the write-behind flush.
    pub fn take_tombstones(&mut self) -> Vec<PositionId> {
        std::mem::take(&mut self.tombstones)
    }

    /// Drain user ids reset since the last flush.
    pub fn take_purged_users(&mut self) -> Vec<Uuid> {
        std::mem::take(&mut self.purged_users)
    }
}
