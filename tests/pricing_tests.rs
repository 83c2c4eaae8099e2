/// Integration tests for price reconciliation and portfolio valuation.
#[path = "../src/models.rs"]
mod models;

#[path = "../src/pricing.rs"]
mod pricing;

#[path = "../src/analytics.rs"]
mod analytics;

use analytics::{aggregate_metrics, portfolio_metrics, value_holdings};
use models::{Holding, Portfolio, TickerSnapshot};
use pricing::{live_prices_unavailable, merge_prices, reconcile, unpriced_symbols, PriceMap};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ticker(symbol: &str, price: f64) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.into(),
        price,
        volume_24h: 1_000.0,
        change_24h: 0.0,
        high_24h: price,
        low_24h: price,
        timestamp: "2024-01-01T00:00:00Z".into(),
    }
}

fn stream_of(tickers: &[TickerSnapshot]) -> HashMap<String, TickerSnapshot> {
    tickers
        .iter()
        .map(|t| (t.symbol.clone(), t.clone()))
        .collect()
}

fn holding(symbol: &str, amount: f64, avg_buy_price: f64) -> Holding {
    Holding {
        id: 1,
        portfolio_id: 1,
        symbol: symbol.into(),
        amount,
        avg_buy_price,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

fn portfolio(id: i64, holdings: Vec<Holding>) -> Portfolio {
    Portfolio {
        id,
        name: format!("Portfolio {id}"),
        exchange_id: "binance".into(),
        description: String::new(),
        holdings,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

fn prices(pairs: &[(&str, f64)]) -> PriceMap {
    pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[test]
fn stream_overrides_http_on_overlap() {
    let http = [ticker("A", 10.0), ticker("B", 20.0)];
    let stream = stream_of(&[ticker("B", 21.0), ticker("C", 30.0)]);

    let merged = reconcile(&http, &stream);
    assert_eq!(merged, prices(&[("A", 10.0), ("B", 21.0), ("C", 30.0)]));
}

#[test]
fn stream_wins_even_with_older_timestamp() {
    let mut http = ticker("BTC", 50_500.0);
    http.timestamp = "2024-01-01T00:01:00Z".into();
    let mut streamed = ticker("BTC", 50_000.0);
    streamed.timestamp = "2024-01-01T00:00:00Z".into();

    let merged = reconcile(&[http], &stream_of(&[streamed]));
    assert_eq!(merged["BTC"], 50_000.0);
}

#[test]
fn merged_keys_are_the_union() {
    let http = prices(&[("A", 1.0), ("B", 2.0)]);
    let stream = prices(&[("C", 3.0)]);
    let merged = merge_prices(&http, &stream);
    let mut keys: Vec<_> = merged.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["A", "B", "C"]);
}

#[test]
fn reconciliation_is_idempotent() {
    let http = [ticker("A", 10.0), ticker("B", 20.0)];
    let stream = stream_of(&[ticker("B", 21.0)]);
    assert_eq!(reconcile(&http, &stream), reconcile(&http, &stream));

    let once = merge_prices(&prices(&[("A", 1.0)]), &prices(&[("A", 2.0)]));
    let twice = merge_prices(&once, &prices(&[("A", 2.0)]));
    assert_eq!(once, twice);
}

#[test]
fn only_http_or_only_stream() {
    let http = [ticker("A", 10.0)];
    assert_eq!(reconcile(&http, &HashMap::new()), prices(&[("A", 10.0)]));

    let stream = stream_of(&[ticker("B", 5.0)]);
    assert_eq!(reconcile(&[], &stream), prices(&[("B", 5.0)]));
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[test]
fn btc_position_in_profit() {
    let holdings = vec![holding("BTC/USDT", 0.5, 40_000.0)];
    let m = portfolio_metrics(&holdings, &prices(&[("BTC/USDT", 50_000.0)]));

    assert_eq!(m.total_cost, 20_000.0);
    assert_eq!(m.total_value, 25_000.0);
    assert_eq!(m.unrealized_pnl, 5_000.0);
    assert!((m.pnl_pct - 25.0).abs() < 1e-9);
}

#[test]
fn no_prices_means_value_equals_cost() {
    let holdings = vec![holding("BTC/USDT", 0.5, 40_000.0), holding("ETH/USDT", 2.0, 2_000.0)];
    let m = portfolio_metrics(&holdings, &PriceMap::new());

    assert_eq!(m.total_value, m.total_cost);
    assert_eq!(m.unrealized_pnl, 0.0);
    assert_eq!(m.pnl_pct, 0.0);
    assert!(live_prices_unavailable(&holdings, &PriceMap::new()));
}

#[test]
fn pnl_is_value_minus_cost() {
    let holdings = vec![
        holding("BTC/USDT", 0.25, 30_000.0),
        holding("ETH/USDT", 3.0, 2_500.0),
        holding("SOL/USDT", 10.0, 0.0),
    ];
    let p = prices(&[("BTC/USDT", 28_000.0), ("ETH/USDT", 3_100.0)]);
    let m = portfolio_metrics(&holdings, &p);

    assert!((m.unrealized_pnl - (m.total_value - m.total_cost)).abs() < 1e-9);
    assert!((m.pnl_pct - m.unrealized_pnl / m.total_cost * 100.0).abs() < 1e-9);
    assert_eq!(unpriced_symbols(&holdings, &p), vec!["SOL/USDT"]);
}

#[test]
fn holding_rows_follow_reconciled_prices() {
    let holdings = vec![holding("BTC/USDT", 1.0, 100.0), holding("ETH/USDT", 1.0, 10.0)];
    let http = [ticker("BTC/USDT", 90.0), ticker("ETH/USDT", 12.0)];
    let stream = stream_of(&[ticker("BTC/USDT", 110.0)]);

    let rows = value_holdings(&holdings, &reconcile(&http, &stream));
    assert_eq!(rows[0].price, Some(110.0));
    assert_eq!(rows[0].pnl, 10.0);
    assert_eq!(rows[1].price, Some(12.0));
    assert!((rows[1].pnl_pct - 20.0).abs() < 1e-9);
}

#[test]
fn aggregate_sums_every_portfolio() {
    let list = vec![
        portfolio(1, vec![holding("BTC/USDT", 0.5, 40_000.0)]),
        portfolio(2, vec![holding("ETH/USDT", 10.0, 2_000.0)]),
        portfolio(3, Vec::new()),
    ];
    let p = prices(&[("BTC/USDT", 50_000.0), ("ETH/USDT", 1_500.0)]);
    let total = aggregate_metrics(&list, &p);

    assert_eq!(total.total_cost, 40_000.0);
    assert_eq!(total.total_value, 40_000.0);
    assert_eq!(total.unrealized_pnl, 0.0);
    assert_eq!(total.pnl_pct, 0.0);
}
