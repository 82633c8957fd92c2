//! In-memory store for tests and DB-less runs. All state sits behind one
//! async mutex; `begin_trade` takes an owned guard and holds it for the
//! life of the unit, which is what serializes concurrent trades (coarser
//! than the per-row lock in Postgres, but the same guarantee).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::portfolio;
use crate::types::{NewTransaction, Transaction, User};

use super::{Store, StoreError, TradeUnit};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    ledger: Vec<Transaction>,
    next_seq: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == username) {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash: starting_cash,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn cash_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let state = self.state.lock().await;
        state
            .users
            .get(&user_id)
            .map(|u| u.cash)
            .ok_or(StoreError::AccountNotFound(user_id))
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        // Vec append order is seq order.
        Ok(state
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn ledger_for_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id && t.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn clear_ledger(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.ledger.len();
        state.ledger.retain(|t| t.user_id != user_id);
        Ok((before - state.ledger.len()) as u64)
    }

    async fn begin_trade(&self, user_id: Uuid) -> Result<Box<dyn TradeUnit>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let cash = guard
            .users
            .get(&user_id)
            .map(|u| u.cash)
            .ok_or(StoreError::AccountNotFound(user_id))?;
        Ok(Box::new(MemoryTradeUnit {
            guard,
            user_id,
            cash,
        }))
    }
}

struct MemoryTradeUnit {
    guard: OwnedMutexGuard<MemoryState>,
    user_id: Uuid,
    cash: Decimal,
}

#[async_trait]
impl TradeUnit for MemoryTradeUnit {
    fn cash(&self) -> Decimal {
        self.cash
    }

    async fn position(&mut self, symbol: &str) -> Result<i64, StoreError> {
        let rows: Vec<Transaction> = self
            .guard
            .ledger
            .iter()
            .filter(|t| t.user_id == self.user_id)
            .cloned()
            .collect();
        Ok(portfolio::net_position(&rows, symbol))
    }

    async fn commit(
        mut self: Box<Self>,
        row: NewTransaction,
        cash_delta: Decimal,
    ) -> Result<(Transaction, Decimal), StoreError> {
        let state = &mut *self.guard;
        let user = state
            .users
            .get_mut(&self.user_id)
            .ok_or(StoreError::AccountNotFound(self.user_id))?;
        user.cash += cash_delta;
        let new_cash = user.cash;

        state.next_seq += 1;
        let committed = Transaction {
            id: Uuid::new_v4(),
            seq: state.next_seq,
            user_id: self.user_id,
            symbol: row.symbol,
            shares: row.shares,
            price: row.price,
            side: row.side,
            executed_at: Utc::now(),
        };
        state.ledger.push(committed.clone());
        Ok((committed, new_cash))
    }
}
