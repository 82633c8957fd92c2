use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time price for a ticker. Quotes are fetched per request and
/// never stored; only the price that actually executed lands in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}
