/// models.rs – Payload shapes exchanged with the backend and small UI enums.
///
/// Timestamps are kept as the backend's ISO strings; they are only ever
/// displayed, never compared.
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err(anyhow::anyhow!("Unknown side: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    #[default]
    Crypto,
    Equity,
    Forex,
}

impl AssetClass {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetClass::Crypto => "crypto",
            AssetClass::Equity => "equity",
            AssetClass::Forex => "forex",
        }
    }

    /// Next class in selector order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            AssetClass::Crypto => AssetClass::Equity,
            AssetClass::Equity => AssetClass::Forex,
            AssetClass::Forex => AssetClass::Crypto,
        }
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for AssetClass {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crypto" => Ok(AssetClass::Crypto),
            "equity" => Ok(AssetClass::Equity),
            "forex" => Ok(AssetClass::Forex),
            _ => Err(anyhow::anyhow!("Unknown asset class: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub portfolio_id: i64,
    pub symbol: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub avg_buy_price: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Holding {
    /// Cost basis of the whole position.
    pub fn cost(&self) -> f64 {
        self.amount * self.avg_buy_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub exchange_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPortfolio {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub volume_24h: f64,
    #[serde(default)]
    pub change_24h: f64,
    #[serde(default)]
    pub high_24h: f64,
    #[serde(default)]
    pub low_24h: f64,
    #[serde(default)]
    pub timestamp: String,
}

/// One candle of market history; `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub has_fetch_tickers: bool,
    #[serde(default)]
    pub has_fetch_ohlcv: bool,
}

/// Aggregate KPI object. Its shape varies with the asset class, so it is
/// kept as raw JSON with accessors for the headline numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardKpis(pub Value);

impl DashboardKpis {
    /// Look up a numeric value by a dotted path such as `portfolio.total_value`.
    pub fn number(&self, path: &str) -> Option<f64> {
        let mut cur = &self.0;
        for part in path.split('.') {
            cur = cur.get(part)?;
        }
        cur.as_f64()
    }
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub exchange_id: String,
    #[serde(default)]
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    pub amount: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub filled: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_order_type() -> String {
    "market".into()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
    pub daily_pnl: f64,
    pub total_pnl: f64,
    pub open_positions: u32,
    pub is_halted: bool,
    #[serde(default)]
    pub halt_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_portfolio_drawdown: f64,
    pub max_single_trade_risk: f64,
    pub max_daily_loss: f64,
    pub max_open_positions: u32,
    pub max_position_size_pct: f64,
    pub max_correlation: f64,
    pub min_risk_reward: f64,
    pub max_leverage: f64,
}

/// Editable subset of [`RiskLimits`]; only fields that changed are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLimitsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_portfolio_drawdown: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_single_trade_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_daily_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_positions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_position_size_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_correlation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_risk_reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_leverage: Option<f64>,
}

impl RiskLimitsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == RiskLimitsUpdate::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarData {
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    pub method: String,
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatCheck {
    pub healthy: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    pub drawdown: f64,
    pub daily_pnl: f64,
    pub open_positions: u32,
    #[serde(default)]
    pub max_correlation: f64,
    #[serde(default)]
    pub max_concentration: f64,
    #[serde(default)]
    pub var_95: f64,
    #[serde(default)]
    pub var_99: f64,
    #[serde(default)]
    pub cvar_95: f64,
    #[serde(default)]
    pub cvar_99: f64,
    #[serde(default)]
    pub is_halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionSizeRequest {
    pub entry_price: f64,
    pub stop_loss_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_trade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionSizeResponse {
    pub size: f64,
    pub risk_amount: f64,
    pub position_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeCheckRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub entry_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeCheckResponse {
    pub approved: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowListItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub asset_class: Option<AssetClass>,
    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub schedule_interval_seconds: Option<u64>,
    #[serde(default)]
    pub step_count: u32,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub last_run_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunListItem {
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    pub status: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub order: u32,
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub summary: WorkflowListItem,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDetail {
    pub fn ordered_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepRun {
    pub order: u32,
    pub step_name: String,
    #[serde(default)]
    pub step_type: String,
    pub status: String,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub error: String,
    /// False when the step's condition skipped it.
    #[serde(default = "condition_met_default")]
    pub condition_met: bool,
}

fn condition_met_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunDetail {
    #[serde(flatten)]
    pub summary: WorkflowRunListItem,
    #[serde(default)]
    pub step_runs: Vec<WorkflowStepRun>,
}

impl WorkflowRunDetail {
    pub fn ordered_step_runs(&self) -> Vec<&WorkflowStepRun> {
        let mut runs: Vec<&WorkflowStepRun> = self.step_runs.iter().collect();
        runs.sort_by_key(|r| r.order);
        runs
    }
}

/// A step kind the workflow engine can run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepType {
    pub step_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowTrigger {
    pub workflow_run_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_tolerates_missing_fields() {
        let h: Holding = serde_json::from_str(r#"{"symbol":"BTC/USDT","amount":0.5}"#).unwrap();
        assert_eq!(h.avg_buy_price, 0.0);
        assert_eq!(h.cost(), 0.0);
    }

    #[test]
    fn run_detail_orders_steps_and_defaults_condition() {
        let run: WorkflowRunDetail = serde_json::from_str(
            r#"{"id":"r1","status":"completed","current_step":2,"total_steps":2,
                "step_runs":[
                  {"order":1,"step_name":"Score","status":"completed","condition_met":false},
                  {"order":0,"step_name":"Refresh","status":"completed","duration_seconds":1.5}
                ]}"#,
        )
        .unwrap();
        assert_eq!(run.summary.id, "r1");
        let names: Vec<&str> = run
            .ordered_step_runs()
            .iter()
            .map(|s| s.step_name.as_str())
            .collect();
        assert_eq!(names, ["Refresh", "Score"]);
        assert!(run.step_runs[1].condition_met);
        assert!(!run.step_runs[0].condition_met);
    }

    #[test]
    fn ticker_defaults_to_zero_stats() {
        let t: TickerSnapshot =
            serde_json::from_str(r#"{"symbol":"ETH/USDT","price":3000}"#).unwrap();
        assert_eq!(t.price, 3000.0);
        assert_eq!(t.volume_24h, 0.0);
    }

    #[test]
    fn new_order_omits_empty_optionals() {
        let order = NewOrder {
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            order_type: Some(OrderType::Market),
            amount: 0.1,
            price: None,
            exchange_id: None,
        };
        let v = serde_json::to_value(&order).unwrap();
        assert_eq!(v["side"], "buy");
        assert_eq!(v["order_type"], "market");
        assert!(v.get("price").is_none());
    }

    #[test]
    fn asset_class_cycles() {
        assert_eq!(AssetClass::Crypto.next(), AssetClass::Equity);
        assert_eq!(AssetClass::Forex.next(), AssetClass::Crypto);
        assert_eq!("FOREX".parse::<AssetClass>().unwrap(), AssetClass::Forex);
    }

    #[test]
    fn kpis_number_lookup() {
        let kpis = DashboardKpis(serde_json::json!({"portfolio": {"total_value": 1200.5}}));
        assert_eq!(kpis.number("portfolio.total_value"), Some(1200.5));
        assert_eq!(kpis.number("trading.win_rate"), None);
    }
}
