//! Derived portfolio state: net positions, cash replay, valuation.
//! Holdings are never stored; every read sums the signed ledger rows.
//! Testable without HTTP.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::quotes::QuoteProvider;
use crate::store::{Store, StoreError};
use crate::types::{Holding, HoldingValuation, PortfolioReport, Transaction};

/// Net share count for one symbol: the sum of signed quantities over the
/// given rows. Zero when the symbol never traded or the position is closed.
pub fn net_position(rows: &[Transaction], symbol: &str) -> i64 {
    rows.iter()
        .filter(|t| t.symbol == symbol)
        .map(|t| t.shares)
        .sum()
}

/// Every symbol whose summed quantity is strictly positive, sorted by
/// symbol. Closed positions (sum == 0) drop out of the result entirely.
pub fn open_positions(rows: &[Transaction]) -> Vec<Holding> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.symbol.as_str()).or_insert(0) += row.shares;
    }
    totals
        .into_iter()
        .filter(|(_, shares)| *shares > 0)
        .map(|(symbol, shares)| Holding {
            symbol: symbol.to_string(),
            shares,
        })
        .collect()
}

/// Replays the ledger against a starting balance. BUY rows carry positive
/// shares and debit cash, SELL rows carry negative shares and credit it, so
/// each row contributes `-(shares * price)`. For a consistent store the
/// result equals the stored balance exactly.
pub fn replay_cash(starting_cash: Decimal, rows: &[Transaction]) -> Decimal {
    rows.iter()
        .fold(starting_cash, |cash, t| cash - Decimal::from(t.shares) * t.price)
}

/// Values a user's open positions with fresh quotes. A symbol that cannot
/// be priced right now is still listed, with `price`/`value` of `None`, and
/// is left out of the grand total; cash is always included.
pub async fn portfolio_value(
    store: &dyn Store,
    quotes: &dyn QuoteProvider,
    user_id: Uuid,
) -> Result<PortfolioReport, StoreError> {
    let cash = store.cash_balance(user_id).await?;
    let rows = store.ledger_for_user(user_id).await?;

    let mut holdings = Vec::new();
    let mut grand_total = cash;
    for holding in open_positions(&rows) {
        let quoted = match quotes.lookup(&holding.symbol).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(symbol = %holding.symbol, error = %err, "quote lookup failed during valuation");
                None
            }
        };
        let (name, price, value) = match quoted {
            Some(quote) => {
                let value = quote.price * Decimal::from(holding.shares);
                grand_total += value;
                (Some(quote.name), Some(quote.price), Some(value))
            }
            None => (None, None, None),
        };
        holdings.push(HoldingValuation {
            symbol: holding.symbol,
            shares: holding.shares,
            name,
            price,
            value,
        });
    }

    Ok(PortfolioReport {
        holdings,
        cash,
        grand_total,
    })
}
