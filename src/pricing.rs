/// pricing.rs – Merge polled and streamed tickers into one price-by-symbol map.
///
/// The streamed price always wins for a symbol present in both sources,
/// whatever the observation timestamps say. A reconnecting stream may
/// replay an older tick than the last poll; that tick still wins.
use std::collections::HashMap;

use crate::models::{Holding, TickerSnapshot};

pub type PriceMap = HashMap<String, f64>;

/// Prices from a ticker list. A symbol listed twice keeps its last price.
pub fn ticker_prices<'a, I>(tickers: I) -> PriceMap
where
    I: IntoIterator<Item = &'a TickerSnapshot>,
{
    tickers
        .into_iter()
        .map(|t| (t.symbol.clone(), t.price))
        .collect()
}

/// Union of both maps; *stream* overwrites *http* on overlap.
pub fn merge_prices(http: &PriceMap, stream: &PriceMap) -> PriceMap {
    let mut prices = PriceMap::with_capacity(http.len() + stream.len());
    for (symbol, price) in http {
        prices.insert(symbol.clone(), *price);
    }
    for (symbol, price) in stream {
        prices.insert(symbol.clone(), *price);
    }
    prices
}

/// Build the price map from the latest HTTP poll and the streamed tickers.
pub fn reconcile(http: &[TickerSnapshot], stream: &HashMap<String, TickerSnapshot>) -> PriceMap {
    merge_prices(&ticker_prices(http), &ticker_prices(stream.values()))
}

/// Symbols held but missing from *prices*, in holding order.
pub fn unpriced_symbols<'a>(holdings: &'a [Holding], prices: &PriceMap) -> Vec<&'a str> {
    holdings
        .iter()
        .filter(|h| !prices.contains_key(&h.symbol))
        .map(|h| h.symbol.as_str())
        .collect()
}

/// True when there are holdings and at least one of them has no price, i.e.
/// part of the valuation fell back to cost basis.
pub fn live_prices_unavailable(holdings: &[Holding], prices: &PriceMap) -> bool {
    holdings.iter().any(|h| !prices.contains_key(&h.symbol))
}
