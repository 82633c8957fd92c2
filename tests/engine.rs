//! Trade engine integration tests: validation order, affordability and
//! holdings checks, atomic aborts, and the concurrent-sell race.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use papertrade::engine::{TradeEngine, TradeError, parse_shares};
use papertrade::portfolio;
use papertrade::quotes::{QuoteError, QuoteProvider};
use papertrade::store::{MemoryStore, Store};
use papertrade::types::{Quote, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Quote double: fixed prices that tests can move, per-symbol failure
/// injection, and a lookup counter to assert no quote call happened.
#[derive(Default)]
struct ScriptedQuotes {
    prices: Mutex<HashMap<String, Decimal>>,
    failing: Mutex<HashSet<String>>,
    lookups: AtomicUsize,
}

impl ScriptedQuotes {
    fn new() -> Self {
        Self::default()
    }

    fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    fn fail_lookups_for(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for ScriptedQuotes {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(QuoteError::Malformed("scripted failure".to_string()));
        }
        Ok(self.prices.lock().unwrap().get(symbol).map(|price| Quote {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc"),
            price: *price,
        }))
    }
}

const STARTING_CASH: Decimal = dec!(10000.00);

async fn engine_with_user(quotes: Arc<ScriptedQuotes>) -> (TradeEngine, Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let user = store
        .create_user("alice", "not-a-real-hash", STARTING_CASH)
        .await
        .unwrap();
    let engine = TradeEngine::new(store.clone(), quotes);
    (engine, store, user.id)
}

#[tokio::test]
async fn buy_debits_cash_and_appends_positive_row() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let receipt = engine.buy(user, "AAPL", 10).await.unwrap();

    assert_eq!(receipt.cash_after, dec!(9000.00));
    assert_eq!(receipt.transaction.symbol, "AAPL");
    assert_eq!(receipt.transaction.shares, 10);
    assert_eq!(receipt.transaction.price, dec!(100.00));
    assert_eq!(receipt.transaction.side, Side::Buy);
    assert_eq!(receipt.transaction.seq, 1);

    assert_eq!(store.cash_balance(user).await.unwrap(), dec!(9000.00));
    let rows = store.ledger_for_user(user).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(portfolio::net_position(&rows, "AAPL"), 10);
}

#[tokio::test]
async fn oversell_fails_and_leaves_state_untouched() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;
    engine.buy(user, "AAPL", 10).await.unwrap();

    let err = engine.sell(user, "AAPL", 15).await.unwrap_err();

    assert!(matches!(
        err,
        TradeError::InsufficientShares {
            requested: 15,
            held: 10,
            ..
        }
    ));
    assert_eq!(store.cash_balance(user).await.unwrap(), dec!(9000.00));
    assert_eq!(store.ledger_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sell_all_at_higher_price_closes_position() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes.clone()).await;
    engine.buy(user, "AAPL", 10).await.unwrap();

    quotes.set_price("AAPL", dec!(120.00));
    let receipt = engine.sell(user, "AAPL", 10).await.unwrap();

    assert_eq!(receipt.cash_after, dec!(10200.00));
    assert_eq!(receipt.transaction.shares, -10);
    assert_eq!(receipt.transaction.side, Side::Sell);

    let rows = store.ledger_for_user(user).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(portfolio::net_position(&rows, "AAPL"), 0);
    assert!(portfolio::open_positions(&rows).is_empty());
}

#[tokio::test]
async fn non_positive_share_counts_fail_before_any_quote_call() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes.clone()).await;

    let err = engine.buy(user, "AAPL", 0).await.unwrap_err();
    assert!(matches!(err, TradeError::InvalidInput(_)));

    let err = engine.buy(user, "AAPL", -3).await.unwrap_err();
    assert!(matches!(err, TradeError::InvalidInput(_)));

    assert_eq!(quotes.lookup_count(), 0);
    assert!(store.ledger_for_user(user).await.unwrap().is_empty());
}

#[test]
fn parse_shares_accepts_digit_strings_only() {
    assert_eq!(parse_shares("10").unwrap(), 10);
    assert_eq!(parse_shares(" 42 ").unwrap(), 42);
    assert!(matches!(parse_shares("abc"), Err(TradeError::InvalidInput(_))));
    assert!(matches!(parse_shares(""), Err(TradeError::InvalidInput(_))));
    assert!(matches!(parse_shares("-3"), Err(TradeError::InvalidInput(_))));
    assert!(matches!(parse_shares("1.5"), Err(TradeError::InvalidInput(_))));
    assert!(matches!(parse_shares("0"), Err(TradeError::InvalidInput(_))));
}

#[tokio::test]
async fn unknown_symbol_fails_before_funds_check() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let err = engine.buy(user, "ZZZZ", 5).await.unwrap_err();
    assert!(matches!(err, TradeError::UnknownSymbol(ref s) if s == "ZZZZ"));

    let err = engine.sell(user, "ZZZZ", 5).await.unwrap_err();
    assert!(matches!(err, TradeError::UnknownSymbol(_)));

    assert!(store.ledger_for_user(user).await.unwrap().is_empty());
    assert_eq!(store.cash_balance(user).await.unwrap(), STARTING_CASH);
}

#[tokio::test]
async fn symbol_is_trimmed_and_uppercased() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let receipt = engine.buy(user, "  aapl ", 1).await.unwrap();
    assert_eq!(receipt.transaction.symbol, "AAPL");

    let rows = store.ledger_for_user(user).await.unwrap();
    assert_eq!(portfolio::net_position(&rows, "AAPL"), 1);
}

#[tokio::test]
async fn empty_symbol_is_invalid_input() {
    let quotes = Arc::new(ScriptedQuotes::new());
    let (engine, _store, user) = engine_with_user(quotes.clone()).await;

    let err = engine.buy(user, "   ", 1).await.unwrap_err();
    assert!(matches!(err, TradeError::InvalidInput(_)));
    assert_eq!(quotes.lookup_count(), 0);
}

#[tokio::test]
async fn quote_failure_aborts_trade_without_touching_state() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes.clone()).await;
    engine.buy(user, "AAPL", 5).await.unwrap();

    quotes.fail_lookups_for("AAPL");

    let err = engine.buy(user, "AAPL", 1).await.unwrap_err();
    assert!(matches!(err, TradeError::QuoteUnavailable { .. }));
    let err = engine.sell(user, "AAPL", 1).await.unwrap_err();
    assert!(matches!(err, TradeError::QuoteUnavailable { .. }));

    assert_eq!(store.cash_balance(user).await.unwrap(), dec!(9500.00));
    assert_eq!(store.ledger_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn buy_beyond_cash_fails_with_both_amounts() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("BRK.A", dec!(5000.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let err = engine.buy(user, "BRK.A", 3).await.unwrap_err();

    match err {
        TradeError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(required, dec!(15000.00));
            assert_eq!(available, dec!(10000.00));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
    assert!(store.ledger_for_user(user).await.unwrap().is_empty());
    assert_eq!(store.cash_balance(user).await.unwrap(), STARTING_CASH);
}

#[tokio::test]
async fn exact_cash_buy_succeeds_down_to_zero() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let receipt = engine.buy(user, "AAPL", 100).await.unwrap();

    assert_eq!(receipt.cash_after, dec!(0.00));
    assert_eq!(store.cash_balance(user).await.unwrap(), dec!(0.00));
}

#[tokio::test]
async fn trades_for_unknown_account_fail() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let store = Arc::new(MemoryStore::new());
    let engine = TradeEngine::new(store.clone(), quotes);

    let err = engine.buy(Uuid::new_v4(), "AAPL", 1).await.unwrap_err();
    assert!(matches!(err, TradeError::AccountNotFound(_)));
}

#[tokio::test]
async fn ledger_replay_matches_stored_cash() {
    let quotes = Arc::new(
        ScriptedQuotes::new()
            .with_price("AAPL", dec!(100.00))
            .with_price("NFLX", dec!(250.50)),
    );
    let (engine, store, user) = engine_with_user(quotes.clone()).await;

    engine.buy(user, "AAPL", 10).await.unwrap();
    engine.buy(user, "NFLX", 4).await.unwrap();
    quotes.set_price("AAPL", dec!(110.00));
    engine.sell(user, "AAPL", 6).await.unwrap();
    engine.buy(user, "AAPL", 2).await.unwrap();

    let rows = store.ledger_for_user(user).await.unwrap();
    let replayed = portfolio::replay_cash(STARTING_CASH, &rows);
    assert_eq!(replayed, store.cash_balance(user).await.unwrap());

    // seq strictly increasing in read order
    for pair in rows.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }
}

#[tokio::test]
async fn concurrent_sells_cannot_both_drain_the_position() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes).await;
    engine.buy(user, "AAPL", 10).await.unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sell(user, "AAPL", 10).await })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sell(user, "AAPL", 10).await })
    };
    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.unwrap(), second.unwrap()];

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(TradeError::InsufficientShares { held: 0, .. })
    )));

    let rows = store.ledger_for_user(user).await.unwrap();
    assert_eq!(portfolio::net_position(&rows, "AAPL"), 0);
    assert_eq!(store.cash_balance(user).await.unwrap(), STARTING_CASH);
    assert_eq!(
        portfolio::replay_cash(STARTING_CASH, &rows),
        STARTING_CASH
    );
}

#[tokio::test]
async fn selling_unheld_symbol_reports_zero_held() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("MSFT", dec!(400.00)));
    let (engine, _store, user) = engine_with_user(quotes).await;

    let err = engine.sell(user, "MSFT", 1).await.unwrap_err();
    assert!(matches!(
        err,
        TradeError::InsufficientShares {
            requested: 1,
            held: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn absurd_order_size_is_rejected_as_invalid() {
    // Price chosen so cost does not fit a Decimal at all.
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(10000000000.00)));
    let (engine, store, user) = engine_with_user(quotes).await;

    let err = engine.buy(user, "AAPL", i64::MAX).await.unwrap_err();
    assert!(matches!(err, TradeError::InvalidInput(_)));
    assert!(store.ledger_for_user(user).await.unwrap().is_empty());
    assert_eq!(store.cash_balance(user).await.unwrap(), STARTING_CASH);
}

#[tokio::test]
async fn repurchase_after_close_starts_a_fresh_position() {
    let quotes = Arc::new(ScriptedQuotes::new().with_price("AAPL", dec!(100.00)));
    let (engine, store, user) = engine_with_user(quotes.clone()).await;

    engine.buy(user, "AAPL", 5).await.unwrap();
    engine.sell(user, "AAPL", 5).await.unwrap();
    quotes.set_price("AAPL", dec!(90.00));
    engine.buy(user, "AAPL", 3).await.unwrap();

    let rows = store.ledger_for_user(user).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(portfolio::net_position(&rows, "AAPL"), 3);
    assert_eq!(
        portfolio::replay_cash(STARTING_CASH, &rows),
        store.cash_balance(user).await.unwrap()
    );
}
