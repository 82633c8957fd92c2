//! Route wiring and request handlers. Handlers stay thin: decode input,
//! call the engine or store, map errors through `ApiError`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::auth::{self, AuthUser};
use crate::api::error::ApiError;
use crate::engine::{self, TradeEngine, TradeError, TradeReceipt};
use crate::portfolio;
use crate::quotes::QuoteProvider;
use crate::store::Store;
use crate::types::{PortfolioReport, Quote, Transaction};

/// Shared resources handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub engine: TradeEngine,
    pub jwt_secret: Vec<u8>,
    pub starting_cash: Decimal,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        quotes: Arc<dyn QuoteProvider>,
        jwt_secret: Vec<u8>,
        starting_cash: Decimal,
    ) -> Self {
        let engine = TradeEngine::new(Arc::clone(&store), Arc::clone(&quotes));
        Self {
            store,
            quotes,
            engine,
            jwt_secret,
            starting_cash,
        }
    }
}

async fn health() -> &'static str {
    "healthy"
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/quote/{symbol}", get(quote))
        .route("/trades/buy", post(buy))
        .route("/trades/sell", post(sell))
        .route("/portfolio", get(portfolio_report))
        .route("/history", get(history).delete(clear_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_lowercase();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }
    let password_hash = auth::hash_password(&req.password).map_err(|err| {
        tracing::error!(error = %err, "password hashing failed");
        ApiError::Internal
    })?;
    let user = state
        .store
        .create_user(&username, &password_hash, state.starting_cash)
        .await?;
    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user_id": user.id, "username": user.username })),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_lowercase();
    let user = state
        .store
        .user_by_username(&username)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !auth::verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    let token = auth::create_token(&state.jwt_secret, user.id).map_err(|err| {
        tracing::error!(error = %err, "token creation failed");
        ApiError::Internal
    })?;
    Ok(Json(json!({ "token": token, "user_id": user.id })))
}

async fn quote(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(symbol): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    let symbol = symbol.trim().to_uppercase();
    let quote = state
        .quotes
        .lookup(&symbol)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown symbol: {symbol}")))?;
    Ok(Json(quote))
}

/// Share counts arrive as JSON numbers from API clients and as digit
/// strings from form-style clients; both are accepted. Numbers are taken
/// as [`serde_json::Number`] so fractional counts like `1.5` fail in
/// [`ShareCount::resolve`] with the same error shape as bad strings
/// instead of bouncing off deserialization.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ShareCount {
    Count(serde_json::Number),
    Text(String),
}

impl ShareCount {
    fn resolve(&self) -> Result<i64, TradeError> {
        match self {
            ShareCount::Count(count) => count.as_i64().ok_or_else(|| {
                TradeError::InvalidInput(format!(
                    "share count must be a whole number, got {count}"
                ))
            }),
            ShareCount::Text(raw) => engine::parse_shares(raw),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    symbol: String,
    shares: ShareCount,
}

#[derive(Debug, Serialize)]
struct TradeResponse {
    transaction: Transaction,
    cash_after: Decimal,
}

impl From<TradeReceipt> for TradeResponse {
    fn from(receipt: TradeReceipt) -> Self {
        Self {
            transaction: receipt.transaction,
            cash_after: receipt.cash_after,
        }
    }
}

async fn buy(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let shares = req.shares.resolve().map_err(ApiError::Trade)?;
    let receipt = state.engine.buy(user.user_id, &req.symbol, shares).await?;
    Ok((StatusCode::CREATED, Json(TradeResponse::from(receipt))))
}

async fn sell(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let shares = req.shares.resolve().map_err(ApiError::Trade)?;
    let receipt = state.engine.sell(user.user_id, &req.symbol, shares).await?;
    Ok((StatusCode::CREATED, Json(TradeResponse::from(receipt))))
}

async fn portfolio_report(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PortfolioReport>, ApiError> {
    let report =
        portfolio::portfolio_value(state.store.as_ref(), state.quotes.as_ref(), user.user_id)
            .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    symbol: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let rows = match params.symbol.as_deref() {
        Some(symbol) => {
            let symbol = symbol.trim().to_uppercase();
            state.store.ledger_for_symbol(user.user_id, &symbol).await?
        }
        None => state.store.ledger_for_user(user.user_id).await?,
    };
    Ok(Json(rows))
}

async fn clear_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cleared = state.store.clear_ledger(user.user_id).await?;
    tracing::info!(user_id = %user.user_id, cleared, "transaction history cleared");
    Ok(Json(json!({ "cleared": cleared })))
}
