use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net holding for one symbol, derived by summing signed ledger quantities.
/// Only strictly positive holdings are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
}

/// One valued row in a portfolio report. `name`, `price` and `value` are
/// `None` when the quote lookup failed at valuation time; such rows are
/// excluded from the numeric grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub shares: i64,
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub holdings: Vec<HoldingValuation>,
    pub cash: Decimal,
    /// Cash plus the value of every holding that could be priced.
    pub grand_total: Decimal,
}
