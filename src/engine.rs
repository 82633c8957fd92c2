//! Trade execution: validate, price, then commit. Validation order is
//! fixed (input shape, then symbol existence, then funds or holdings) so
//! clients see deterministic errors, and the single quote fetched at the
//! start of an operation prices both the check and the committed row.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::quotes::{QuoteError, QuoteProvider};
use crate::store::{Store, StoreError};
use crate::types::{NewTransaction, Quote, Side, Transaction};

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("quote unavailable for {symbol}: {source}")]
    QuoteUnavailable { symbol: String, source: QuoteError },
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },
    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },
    #[error("account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for TradeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => TradeError::AccountNotFound(id),
            other => TradeError::Storage(other),
        }
    }
}

/// Committed trade plus the cash balance it left behind.
#[derive(Debug, Clone)]
pub struct TradeReceipt {
    pub transaction: Transaction,
    pub cash_after: Decimal,
}

/// Parses a share count from form-style text: ASCII digits only, value at
/// least 1. `"abc"`, `""`, `"-3"` and `"1.5"` all fail here rather than at
/// the quote or funds stage.
pub fn parse_shares(input: &str) -> Result<i64, TradeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(TradeError::InvalidInput(format!(
            "share count must be a positive whole number, got {input:?}"
        )));
    }
    let shares: i64 = trimmed
        .parse()
        .map_err(|_| TradeError::InvalidInput("share count out of range".to_string()))?;
    if shares < 1 {
        return Err(TradeError::InvalidInput(
            "share count must be at least 1".to_string(),
        ));
    }
    Ok(shares)
}

#[derive(Clone)]
pub struct TradeEngine {
    store: Arc<dyn Store>,
    quotes: Arc<dyn QuoteProvider>,
}

impl TradeEngine {
    pub fn new(store: Arc<dyn Store>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { store, quotes }
    }

    /// Buys `shares` of `symbol` at the current quote. Fails without
    /// touching storage unless the account can afford the full cost; on
    /// success the ledger row and the cash debit land atomically.
    pub async fn buy(
        &self,
        user_id: Uuid,
        symbol: &str,
        shares: i64,
    ) -> Result<TradeReceipt, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        validate_shares(shares)?;
        let quote = self.fetch_quote(&symbol).await?;
        let cost = trade_amount(quote.price, shares)?;

        let unit = self.store.begin_trade(user_id).await?;
        let available = unit.cash();
        if available < cost {
            return Err(TradeError::InsufficientFunds {
                required: cost,
                available,
            });
        }
        let (transaction, cash_after) = unit
            .commit(
                NewTransaction {
                    symbol: symbol.clone(),
                    shares,
                    price: quote.price,
                    side: Side::Buy,
                },
                -cost,
            )
            .await?;
        tracing::info!(
            user_id = %user_id,
            symbol = %symbol,
            shares,
            price = %quote.price,
            cash_after = %cash_after,
            "buy committed"
        );
        Ok(TradeReceipt {
            transaction,
            cash_after,
        })
    }

    /// Sells `shares` of `symbol` at the current quote. Fails without
    /// touching storage unless the account currently holds at least that
    /// many shares, derived from the ledger inside the trade unit.
    pub async fn sell(
        &self,
        user_id: Uuid,
        symbol: &str,
        shares: i64,
    ) -> Result<TradeReceipt, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        validate_shares(shares)?;
        let quote = self.fetch_quote(&symbol).await?;
        let proceeds = trade_amount(quote.price, shares)?;

        let mut unit = self.store.begin_trade(user_id).await?;
        let held = unit.position(&symbol).await?;
        if held < shares {
            return Err(TradeError::InsufficientShares {
                symbol,
                requested: shares,
                held,
            });
        }
        let (transaction, cash_after) = unit
            .commit(
                NewTransaction {
                    symbol: symbol.clone(),
                    shares: -shares,
                    price: quote.price,
                    side: Side::Sell,
                },
                proceeds,
            )
            .await?;
        tracing::info!(
            user_id = %user_id,
            symbol = %symbol,
            shares,
            price = %quote.price,
            cash_after = %cash_after,
            "sell committed"
        );
        Ok(TradeReceipt {
            transaction,
            cash_after,
        })
    }

    /// Symbol existence check and price fetch in one step. A provider
    /// failure aborts the trade; it is never treated as "unknown symbol".
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, TradeError> {
        match self.quotes.lookup(symbol).await {
            Ok(Some(quote)) => Ok(quote),
            Ok(None) => Err(TradeError::UnknownSymbol(symbol.to_string())),
            Err(source) => {
                tracing::warn!(symbol = %symbol, error = %source, "quote lookup failed, aborting trade");
                Err(TradeError::QuoteUnavailable {
                    symbol: symbol.to_string(),
                    source,
                })
            }
        }
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, TradeError> {
    let normalized = symbol.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(TradeError::InvalidInput("symbol is required".to_string()));
    }
    Ok(normalized)
}

fn validate_shares(shares: i64) -> Result<(), TradeError> {
    if shares < 1 {
        return Err(TradeError::InvalidInput(format!(
            "share count must be at least 1, got {shares}"
        )));
    }
    Ok(())
}

fn trade_amount(price: Decimal, shares: i64) -> Result<Decimal, TradeError> {
    price
        .checked_mul(Decimal::from(shares))
        .ok_or_else(|| TradeError::InvalidInput(format!("order of {shares} shares overflows")))
}
