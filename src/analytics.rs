/// analytics.rs – Portfolio valuation derived from holdings and a price map.
///
/// Everything here is a pure function of its inputs; results are recomputed
/// on every redraw and never stored.
use crate::models::{Holding, Portfolio};
use crate::pricing::PriceMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedPortfolioMetrics {
    pub total_cost: f64,
    pub total_value: f64,
    /// Signed; `total_value - total_cost`.
    pub unrealized_pnl: f64,
    /// Signed percentage of cost; zero when the cost is zero.
    pub pnl_pct: f64,
}

impl DerivedPortfolioMetrics {
    fn from_totals(total_cost: f64, total_value: f64) -> Self {
        let unrealized_pnl = total_value - total_cost;
        Self {
            total_cost,
            total_value,
            unrealized_pnl,
            pnl_pct: pct_of(unrealized_pnl, total_cost),
        }
    }
}

/// One holding valued at the reconciled price, or at cost basis when no
/// price is known (`priced == false`).
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingValuation {
    pub symbol: String,
    pub amount: f64,
    pub avg_buy_price: f64,
    pub price: Option<f64>,
    pub cost: f64,
    pub value: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
}

impl HoldingValuation {
    pub fn priced(&self) -> bool {
        self.price.is_some()
    }
}

fn pct_of(pnl: f64, cost: f64) -> f64 {
    if cost == 0.0 {
        0.0
    } else {
        pnl / cost * 100.0
    }
}

fn mark_price(holding: &Holding, prices: &PriceMap) -> f64 {
    prices
        .get(&holding.symbol)
        .copied()
        .unwrap_or(holding.avg_buy_price)
}

pub fn portfolio_metrics(holdings: &[Holding], prices: &PriceMap) -> DerivedPortfolioMetrics {
    let total_cost: f64 = holdings.iter().map(Holding::cost).sum();
    let total_value: f64 = holdings
        .iter()
        .map(|h| h.amount * mark_price(h, prices))
        .sum();
    DerivedPortfolioMetrics::from_totals(total_cost, total_value)
}

pub fn value_holdings(holdings: &[Holding], prices: &PriceMap) -> Vec<HoldingValuation> {
    holdings
        .iter()
        .map(|h| {
            let price = prices.get(&h.symbol).copied();
            let cost = h.cost();
            let value = h.amount * price.unwrap_or(h.avg_buy_price);
            let pnl = value - cost;
            HoldingValuation {
                symbol: h.symbol.clone(),
                amount: h.amount,
                avg_buy_price: h.avg_buy_price,
                price,
                cost,
                value,
                pnl,
                pnl_pct: pct_of(pnl, cost),
            }
        })
        .collect()
}

/// Totals across every portfolio, for the dashboard header.
pub fn aggregate_metrics(portfolios: &[Portfolio], prices: &PriceMap) -> DerivedPortfolioMetrics {
    let (cost, value) = portfolios
        .iter()
        .map(|p| portfolio_metrics(&p.holdings, prices))
        .fold((0.0, 0.0), |(c, v), m| (c + m.total_cost, v + m.total_value));
    DerivedPortfolioMetrics::from_totals(cost, value)
}
