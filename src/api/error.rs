//! Maps domain errors onto HTTP responses. Every error body has the same
//! shape, `{"error": message}`, so clients render one thing.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::engine::TradeError;
use crate::quotes::QuoteError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("internal error")]
    Internal,
    #[error(transparent)]
    Trade(#[from] TradeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Quote(#[from] QuoteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "authentication required".to_string())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ApiError::Trade(err) => trade_status(err),
            ApiError::Store(err) => store_status(err),
            ApiError::Quote(err) => {
                tracing::error!(error = %err, "quote provider failure");
                (StatusCode::BAD_GATEWAY, "quote service unavailable".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn trade_status(err: &TradeError) -> (StatusCode, String) {
    match err {
        TradeError::InvalidInput(_)
        | TradeError::UnknownSymbol(_)
        | TradeError::InsufficientFunds { .. }
        | TradeError::InsufficientShares { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        TradeError::AccountNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        TradeError::QuoteUnavailable { .. } => (StatusCode::BAD_GATEWAY, err.to_string()),
        TradeError::Storage(source) => {
            tracing::error!(error = %source, "storage failure during trade");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal storage error".to_string(),
            )
        }
    }
}

fn store_status(err: &StoreError) -> (StatusCode, String) {
    match err {
        StoreError::UsernameTaken(username) => (
            StatusCode::BAD_REQUEST,
            format!("username {username:?} is already taken"),
        ),
        StoreError::AccountNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Database(source) => {
            tracing::error!(error = %source, "database failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal storage error".to_string(),
            )
        }
    }
}
