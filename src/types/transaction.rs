use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializes as the same `"BUY"` / `"SELL"` tag the ledger stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// One immutable ledger row. `shares` is signed: BUY rows carry a positive
/// quantity, SELL rows a negative one, so a holding is just the sum over
/// rows for that symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Server-assigned append order, strictly increasing per store.
    pub seq: i64,
    pub user_id: Uuid,
    pub symbol: String,
    pub shares: i64,
    /// Unit price at execution time.
    pub price: Decimal,
    pub side: Side,
    pub executed_at: DateTime<Utc>,
}

/// Fields the caller supplies for an append. `id`, `seq` and `executed_at`
/// are assigned by the store at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub side: Side,
}
