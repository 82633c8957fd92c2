//! Storage boundary: accounts, the append-only ledger, and the trade unit
//! of work that ties a ledger append to its cash adjustment.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{NewTransaction, Transaction, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("username already taken: {0}")]
    UsernameTaken(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Account and ledger access behind one seam so the engine, valuation code
/// and API are identical over Postgres and memory.
///
/// Plain reads are point-in-time snapshots and may race with concurrent
/// commits; anything a trade validates against must be read through the
/// [`TradeUnit`] returned by [`Store::begin_trade`] instead.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates an account with its starting balance. Username must already
    /// be lowercase; a duplicate yields [`StoreError::UsernameTaken`].
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError>;

    /// Get a user by username (lowercase). For login.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn cash_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError>;

    /// All of the user's ledger rows in seq (append) order.
    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// The user's ledger rows for one symbol, in seq order.
    async fn ledger_for_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Irreversibly deletes the user's ledger rows and returns how many
    /// went. Cash is left where the deleted trades put it.
    async fn clear_ledger(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Opens the serialized check-then-commit window for one user. While
    /// the returned unit is alive, no other trade for the same user can
    /// interleave between its reads and its commit.
    async fn begin_trade(&self, user_id: Uuid) -> Result<Box<dyn TradeUnit>, StoreError>;
}

/// One in-flight trade for one user. Reads through the unit are stable for
/// its lifetime, and [`TradeUnit::commit`] applies the ledger append and the
/// cash adjustment as a single atomic step. Dropping the unit without
/// committing abandons the trade with no effect on stored state.
#[async_trait]
pub trait TradeUnit: Send {
    /// Cash balance captured when the unit was opened.
    fn cash(&self) -> Decimal;

    /// Net position for `symbol`, summed from the ledger inside the unit.
    async fn position(&mut self, symbol: &str) -> Result<i64, StoreError>;

    /// Appends the row and applies `cash_delta` atomically, then closes the
    /// unit. Returns the committed row and the balance after it.
    async fn commit(
        self: Box<Self>,
        row: NewTransaction,
        cash_delta: Decimal,
    ) -> Result<(Transaction, Decimal), StoreError>;
}
