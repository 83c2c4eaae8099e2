/// api.rs – Async client for the trading platform's REST API.
///
/// Responsibilities:
///  - Portfolios, tickers, OHLCV history, dashboard KPIs and exchange metadata
///  - Risk status / limits / VaR / heat check and the risk calculators
///  - Workflow listing, detail, triggering, scheduling and run history
///  - Order history, lookup and placement
///
/// Every call returns [`ApiResult`], splitting transport failures,
/// non-success statuses and undecodable payloads.
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::{ApiError, ApiResult};
use crate::models::{
    AssetClass, DashboardKpis, ExchangeInfo, HeatCheck, NewOrder, NewPortfolio, OhlcvBar, Order,
    Portfolio, PositionSizeRequest, PositionSizeResponse, RiskLimits, RiskLimitsUpdate,
    RiskStatus, StatusResponse, StepType, TickerSnapshot, TradeCheckRequest, TradeCheckResponse,
    VarData, WorkflowDetail, WorkflowListItem, WorkflowRunDetail, WorkflowRunListItem,
    WorkflowTrigger,
};

const ORDER_HISTORY_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Portfolios
    // ------------------------------------------------------------------

    pub async fn list_portfolios(&self) -> ApiResult<Vec<Portfolio>> {
        self.get("/portfolios/", &[]).await
    }

    pub async fn get_portfolio(&self, id: i64) -> ApiResult<Portfolio> {
        self.get(&format!("/portfolios/{id}"), &[]).await
    }

    pub async fn create_portfolio(&self, portfolio: &NewPortfolio) -> ApiResult<Portfolio> {
        self.send(Method::POST, "/portfolios/", Some(portfolio)).await
    }

    pub async fn delete_portfolio(&self, id: i64) -> ApiResult<()> {
        self.send_empty(Method::DELETE, &format!("/portfolios/{id}"), None::<&()>)
            .await
    }

    // ------------------------------------------------------------------
    // Market data
    // ------------------------------------------------------------------

    /// Ticker snapshots for *symbols*. No request is made for an empty list.
    pub async fn market_tickers(&self, symbols: &[String]) -> ApiResult<Vec<TickerSnapshot>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        self.get("/market/tickers", &[("symbols", symbols.join(","))])
            .await
    }

    /// Candles for *symbol*, oldest first. The symbol goes into the path
    /// as is (`BTC/USDT` included).
    pub async fn market_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> ApiResult<Vec<OhlcvBar>> {
        self.get(
            &format!("/market/ohlcv/{symbol}"),
            &[("timeframe", timeframe.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    pub async fn dashboard_kpis(&self, asset_class: Option<AssetClass>) -> ApiResult<DashboardKpis> {
        let query: Vec<(&str, String)> = asset_class
            .map(|ac| vec![("asset_class", ac.to_string())])
            .unwrap_or_default();
        self.get("/dashboard/kpis/", &query).await
    }

    pub async fn list_exchanges(&self) -> ApiResult<Vec<ExchangeInfo>> {
        self.get("/exchanges/", &[]).await
    }

    // ------------------------------------------------------------------
    // Risk
    // ------------------------------------------------------------------

    pub async fn risk_status(&self, portfolio_id: i64) -> ApiResult<RiskStatus> {
        self.get(&format!("/risk/{portfolio_id}/status/"), &[]).await
    }

    pub async fn risk_limits(&self, portfolio_id: i64) -> ApiResult<RiskLimits> {
        self.get(&format!("/risk/{portfolio_id}/limits/"), &[]).await
    }

    pub async fn update_risk_limits(
        &self,
        portfolio_id: i64,
        update: &RiskLimitsUpdate,
    ) -> ApiResult<RiskLimits> {
        self.send(
            Method::PUT,
            &format!("/risk/{portfolio_id}/limits/"),
            Some(update),
        )
        .await
    }

    pub async fn value_at_risk(&self, portfolio_id: i64, method: &str) -> ApiResult<VarData> {
        self.get(
            &format!("/risk/{portfolio_id}/var/"),
            &[("method", method.to_string())],
        )
        .await
    }

    pub async fn heat_check(&self, portfolio_id: i64) -> ApiResult<HeatCheck> {
        self.get(&format!("/risk/{portfolio_id}/heat-check/"), &[])
            .await
    }

    pub async fn position_size(
        &self,
        portfolio_id: i64,
        request: &PositionSizeRequest,
    ) -> ApiResult<PositionSizeResponse> {
        self.send(
            Method::POST,
            &format!("/risk/{portfolio_id}/position-size/"),
            Some(request),
        )
        .await
    }

    pub async fn check_trade(
        &self,
        portfolio_id: i64,
        request: &TradeCheckRequest,
    ) -> ApiResult<TradeCheckResponse> {
        self.send(
            Method::POST,
            &format!("/risk/{portfolio_id}/check-trade/"),
            Some(request),
        )
        .await
    }

    pub async fn reset_daily(&self, portfolio_id: i64) -> ApiResult<RiskStatus> {
        self.send(
            Method::POST,
            &format!("/risk/{portfolio_id}/reset-daily/"),
            None::<&()>,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    pub async fn list_workflows(
        &self,
        asset_class: Option<AssetClass>,
    ) -> ApiResult<Vec<WorkflowListItem>> {
        let query: Vec<(&str, String)> = asset_class
            .map(|ac| vec![("asset_class", ac.to_string())])
            .unwrap_or_default();
        self.get("/workflows/", &query).await
    }

    pub async fn get_workflow(&self, id: &str) -> ApiResult<WorkflowDetail> {
        self.get(&format!("/workflows/{id}/"), &[]).await
    }

    pub async fn workflow_step_types(&self) -> ApiResult<Vec<StepType>> {
        self.get("/workflow-steps/", &[]).await
    }

    pub async fn trigger_workflow(&self, id: &str) -> ApiResult<WorkflowTrigger> {
        self.send(Method::POST, &format!("/workflows/{id}/trigger/"), None::<&()>)
            .await
    }

    pub async fn enable_workflow(&self, id: &str) -> ApiResult<StatusResponse> {
        self.send(Method::POST, &format!("/workflows/{id}/enable/"), None::<&()>)
            .await
    }

    pub async fn disable_workflow(&self, id: &str) -> ApiResult<StatusResponse> {
        self.send(Method::POST, &format!("/workflows/{id}/disable/"), None::<&()>)
            .await
    }

    pub async fn workflow_runs(
        &self,
        id: &str,
        limit: Option<u32>,
    ) -> ApiResult<Vec<WorkflowRunListItem>> {
        let query: Vec<(&str, String)> = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        self.get(&format!("/workflows/{id}/runs/"), &query).await
    }

    pub async fn get_workflow_run(&self, run_id: &str) -> ApiResult<WorkflowRunDetail> {
        self.get(&format!("/workflow-runs/{run_id}/"), &[]).await
    }

    pub async fn cancel_workflow_run(&self, run_id: &str) -> ApiResult<StatusResponse> {
        self.send(
            Method::POST,
            &format!("/workflow-runs/{run_id}/cancel/"),
            None::<&()>,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Trading
    // ------------------------------------------------------------------

    pub async fn list_orders(&self) -> ApiResult<Vec<Order>> {
        self.get(
            "/trading/orders",
            &[("limit", ORDER_HISTORY_LIMIT.to_string())],
        )
        .await
    }

    pub async fn get_order(&self, id: i64) -> ApiResult<Order> {
        self.get(&format!("/trading/orders/{id}"), &[]).await
    }

    pub async fn create_order(&self, order: &NewOrder) -> ApiResult<Order> {
        self.send(Method::POST, "/trading/orders", Some(order)).await
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
        let resp = self.request(Method::GET, path).query(query).send().await?;
        decode(resp).await
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<T> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(req.send().await?).await
    }

    async fn send_empty<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<()> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = check_status(req.send().await?).await?;
        drop(resp);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

async fn check_status(resp: Response) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Reading {status} error body failed: {e}");
            String::new()
        }
    };
    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ApiError::from)
}

/// Message carried by an error body: `{"detail": ..}` or `{"error": ..}`,
/// else the raw text when it is short enough to show.
fn error_detail(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return Some(msg.to_string());
            }
        }
    }
    let trimmed = body.trim();
    (!trimmed.is_empty() && trimmed.len() <= 200).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_prefers_json_fields() {
        assert_eq!(
            error_detail(r#"{"detail":"Portfolio not found"}"#).as_deref(),
            Some("Portfolio not found")
        );
        assert_eq!(
            error_detail(r#"{"error":"Trading halted"}"#).as_deref(),
            Some("Trading halted")
        );
        assert_eq!(error_detail("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_detail("   "), None);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            ApiClient::new("http://localhost:8000/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[tokio::test]
    async fn empty_symbol_list_skips_request() {
        // Port 9 (discard) would fail if a request were attempted.
        let client = ApiClient::new("http://127.0.0.1:9", None, Duration::from_millis(200)).unwrap();
        let tickers = client.market_tickers(&[]).await.unwrap();
        assert!(tickers.is_empty());
    }
}
