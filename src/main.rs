use std::sync::Arc;

use papertrade::api::routes::{AppState, app_router};
use papertrade::config::Config;
use papertrade::quotes::{HttpQuoteProvider, QuoteProvider, StaticQuoteProvider};
use papertrade::store::{MemoryStore, PgStore, Store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            tracing::info!("connected to Postgres, migrations applied");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, state lives in memory and is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let quotes: Arc<dyn QuoteProvider> = match &config.quote_api_url {
        Some(url) => Arc::new(HttpQuoteProvider::new(url.clone())?),
        None => {
            tracing::warn!("QUOTE_API_URL is not set, serving the built-in demo quote table");
            Arc::new(StaticQuoteProvider::demo())
        }
    };

    let state = AppState::new(
        store,
        quotes,
        config.jwt_secret.clone(),
        config.starting_cash,
    );
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
