use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Account row. `cash` only ever changes inside the same atomic unit that
/// appends a ledger row, or at account creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase; lookups expect the caller to normalize.
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub cash: Decimal,
    pub created_at: DateTime<Utc>,
}
