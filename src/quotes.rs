//! Quote lookups. The engine and valuation code only see [`QuoteProvider`];
//! production wires [`HttpQuoteProvider`] against a quote API, and DB-less
//! or offline runs wire [`StaticQuoteProvider`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Quote;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed quote response: {0}")]
    Malformed(String),
}

/// Symbol lookup contract. `Ok(None)` means the symbol does not exist;
/// `Err` means the lookup itself failed and callers must not trade on it.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError>;
}

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP-backed provider for an IEX-style quote endpoint:
/// `GET {base_url}?symbol=AAPL` answering
/// `{"symbol": ..., "companyName": ..., "latestPrice": ...}`.
pub struct HttpQuoteProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    symbol: String,
    company_name: String,
    latest_price: f64,
}

impl HttpQuoteProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        // The quote API answers 404 for symbols it does not know. Any other
        // non-success status (429, 401, 5xx) is a failed lookup, not a
        // missing symbol.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: QuoteResponse = response.error_for_status()?.json().await?;

        let price = Decimal::from_f64(body.latest_price).ok_or_else(|| {
            QuoteError::Malformed(format!("unrepresentable price {}", body.latest_price))
        })?;
        Ok(Some(Quote {
            symbol: body.symbol.to_uppercase(),
            name: body.company_name,
            price: price.round_dp(4),
        }))
    }
}

/// Fixed in-process quote table. Prices do not move between lookups, which
/// keeps DB-less demo runs and tests deterministic.
#[derive(Debug, Clone, Default)]
pub struct StaticQuoteProvider {
    quotes: HashMap<String, Quote>,
}

impl StaticQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small built-in table so the service is usable with no quote API
    /// configured.
    pub fn demo() -> Self {
        let mut provider = Self::new();
        for (symbol, name, price) in [
            ("AAPL", "Apple Inc", dec!(189.84)),
            ("AMZN", "Amazon.com Inc", dec!(178.22)),
            ("MSFT", "Microsoft Corp", dec!(415.50)),
            ("NFLX", "Netflix Inc", dec!(612.09)),
            ("TSLA", "Tesla Inc", dec!(248.42)),
        ] {
            provider.insert(symbol, name, price);
        }
        provider
    }

    pub fn insert(&mut self, symbol: &str, name: &str, price: Decimal) {
        let symbol = symbol.to_uppercase();
        self.quotes.insert(
            symbol.clone(),
            Quote {
                symbol,
                name: name.to_string(),
                price,
            },
        );
    }
}

#[async_trait]
impl QuoteProvider for StaticQuoteProvider {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError> {
        Ok(self.quotes.get(&symbol.to_uppercase()).cloned())
    }
}
