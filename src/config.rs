//! Environment-driven configuration. `dotenvy` loads `.env` before this
//! runs, so every knob is a plain environment variable.

use std::net::SocketAddr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub const DEFAULT_STARTING_CASH: Decimal = dec!(10000.00);

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Runtime settings. `database_url: None` selects the in-memory store and
/// `quote_api_url: None` selects the built-in static quote table.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub quote_api_url: Option<String>,
    pub jwt_secret: Vec<u8>,
    pub starting_cash: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw.parse().map_err(|err| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: format!("{err}"),
            })?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let quote_api_url = std::env::var("QUOTE_API_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                tracing::warn!("JWT_SECRET is not set, using the development default");
                DEV_JWT_SECRET.as_bytes().to_vec()
            }
        };

        let starting_cash = match std::env::var("STARTING_CASH") {
            Ok(raw) => {
                let cash: Decimal = raw.parse().map_err(|err| ConfigError::Invalid {
                    name: "STARTING_CASH",
                    reason: format!("{err}"),
                })?;
                if cash.is_sign_negative() {
                    return Err(ConfigError::Invalid {
                        name: "STARTING_CASH",
                        reason: "must not be negative".to_string(),
                    });
                }
                cash
            }
            Err(_) => DEFAULT_STARTING_CASH,
        };

        Ok(Self {
            bind_addr,
            database_url,
            quote_api_url,
            jwt_secret,
            starting_cash,
        })
    }
}
