//! Postgres store. The trade unit of work is a real transaction: the user
//! row is locked with `SELECT ... FOR UPDATE`, which serializes concurrent
//! trades for that user, and the paired ledger insert plus cash update
//! commit or roll back together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use crate::portfolio;
use crate::types::{NewTransaction, Side, Transaction, User};

use super::{Store, StoreError, TradeUnit};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects, runs the embedded migrations, and returns the store.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }
}

/// Row returned from DB (username is stored lowercase).
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    cash: Decimal,
    created_at: DateTime<Utc>,
}

fn user_row_to_user(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        password_hash: row.password_hash,
        cash: row.cash,
        created_at: row.created_at,
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    seq: i64,
    user_id: Uuid,
    symbol: String,
    shares: i64,
    price: Decimal,
    side: String,
    executed_at: DateTime<Utc>,
}

fn transaction_row_to_transaction(row: TransactionRow) -> Result<Transaction, StoreError> {
    let side = Side::parse(&row.side).ok_or_else(|| {
        StoreError::Database(sqlx::Error::Decode(
            format!("unknown side tag {:?} on transaction {}", row.side, row.id).into(),
        ))
    })?;
    Ok(Transaction {
        id: row.id,
        seq: row.seq,
        user_id: row.user_id,
        symbol: row.symbol,
        shares: row.shares,
        price: row.price,
        side,
        executed_at: row.executed_at,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash: starting_cash,
            created_at: Utc::now(),
        };
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, cash, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.cash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::UsernameTaken(username.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, cash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_row_to_user))
    }

    async fn cash_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let cash = sqlx::query_scalar::<_, Decimal>("SELECT cash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        cash.ok_or(StoreError::AccountNotFound(user_id))
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, seq, user_id, symbol, shares, price, side, executed_at \
             FROM transactions WHERE user_id = $1 ORDER BY seq",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(transaction_row_to_transaction).collect()
    }

    async fn ledger_for_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, seq, user_id, symbol, shares, price, side, executed_at \
             FROM transactions WHERE user_id = $1 AND symbol = $2 ORDER BY seq",
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(transaction_row_to_transaction).collect()
    }

    async fn clear_ledger(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM transactions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn begin_trade(&self, user_id: Uuid) -> Result<Box<dyn TradeUnit>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let cash =
            sqlx::query_scalar::<_, Decimal>("SELECT cash FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::AccountNotFound(user_id))?;
        Ok(Box::new(PgTradeUnit { tx, user_id, cash }))
    }
}

struct PgTradeUnit {
    tx: PgTransaction<'static, Postgres>,
    user_id: Uuid,
    cash: Decimal,
}

#[derive(Debug, FromRow)]
struct InsertedRow {
    seq: i64,
    executed_at: DateTime<Utc>,
}

#[async_trait]
impl TradeUnit for PgTradeUnit {
    fn cash(&self) -> Decimal {
        self.cash
    }

    async fn position(&mut self, symbol: &str) -> Result<i64, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, seq, user_id, symbol, shares, price, side, executed_at \
             FROM transactions WHERE user_id = $1 AND symbol = $2 ORDER BY seq",
        )
        .bind(self.user_id)
        .bind(symbol)
        .fetch_all(&mut *self.tx)
        .await?;
        let rows: Vec<Transaction> = rows
            .into_iter()
            .map(transaction_row_to_transaction)
            .collect::<Result<_, _>>()?;
        Ok(portfolio::net_position(&rows, symbol))
    }

    async fn commit(
        mut self: Box<Self>,
        row: NewTransaction,
        cash_delta: Decimal,
    ) -> Result<(Transaction, Decimal), StoreError> {
        let new_cash = sqlx::query_scalar::<_, Decimal>(
            "UPDATE users SET cash = cash + $1 WHERE id = $2 RETURNING cash",
        )
        .bind(cash_delta)
        .bind(self.user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        let id = Uuid::new_v4();
        let inserted = sqlx::query_as::<_, InsertedRow>(
            "INSERT INTO transactions (id, user_id, symbol, shares, price, side) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING seq, executed_at",
        )
        .bind(id)
        .bind(self.user_id)
        .bind(&row.symbol)
        .bind(row.shares)
        .bind(row.price)
        .bind(row.side.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        self.tx.commit().await?;
        Ok((
            Transaction {
                id,
                seq: inserted.seq,
                user_id: self.user_id,
                symbol: row.symbol,
                shares: row.shares,
                price: row.price,
                side: row.side,
                executed_at: inserted.executed_at,
            },
            new_cash,
        ))
    }
}
